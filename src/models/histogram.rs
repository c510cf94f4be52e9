// Mergeable duration histogram over nanoseconds, backed by HdrHistogram.
//
// Two significant digits: a recorded value is reported within 1% of itself.
// Merging adds counts per bucket, so rollups stay exact for counts and keep
// the same percentile accuracy at every level.

use base64::{Engine as _, engine::general_purpose};
use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{CollectorError, Result};

const SIGNIFICANT_DIGITS: u8 = 2;

/// Agent-side histogram: raw values for small samples, or an HdrHistogram V2
/// encoding (base64) once the agent has switched to a histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramMessage {
    #[serde(default)]
    pub ordered_raw_values: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_bytes: Option<String>,
}

impl HistogramMessage {
    pub fn is_empty(&self) -> bool {
        self.ordered_raw_values.is_empty() && self.encoded_bytes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurationHistogram {
    inner: Histogram<u64>,
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationHistogram {
    pub fn new() -> Self {
        // auto-resizing; two significant digits is always a valid precision
        let inner = Histogram::new(SIGNIFICANT_DIGITS).expect("valid histogram precision");
        Self { inner }
    }

    pub fn from_values(values_nanos: &[u64]) -> Self {
        let mut h = Self::new();
        for &v in values_nanos {
            h.record(v);
        }
        h
    }

    /// Decodes an agent histogram. A bad encoding is a malformed request.
    pub fn from_message(msg: &HistogramMessage) -> Result<Self> {
        let mut h = match &msg.encoded_bytes {
            Some(encoded) => {
                let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                    CollectorError::InvalidRequest(format!("histogram base64: {}", e))
                })?;
                Self::decode(&bytes)
                    .map_err(|e| CollectorError::InvalidRequest(format!("histogram: {}", e)))?
            }
            None => Self::new(),
        };
        for &v in &msg.ordered_raw_values {
            h.record(v);
        }
        Ok(h)
    }

    pub fn record(&mut self, value_nanos: u64) {
        self.record_n(value_nanos, 1);
    }

    /// Values beyond the trackable range are clamped to it.
    pub fn record_n(&mut self, value_nanos: u64, count: u64) {
        if count == 0 {
            return;
        }
        if self.inner.record_n(value_nanos, count).is_err() {
            self.inner.saturating_record_n(value_nanos, count);
        }
    }

    pub fn merge(&mut self, other: &DurationHistogram) {
        if other.is_empty() {
            return;
        }
        if self.inner.add(&other.inner).is_err() {
            for v in other.inner.iter_recorded() {
                self.record_n(v.value_iterated_to(), v.count_at_value());
            }
        }
    }

    pub fn total_count(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Highest value (nanoseconds) equivalent to the given percentile
    /// (0..=100). `None` when empty.
    pub fn value_at_percentile(&self, percentile: f64) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        let q = percentile.clamp(0.0, 100.0) / 100.0;
        Some(self.inner.value_at_quantile(q))
    }

    /// HdrHistogram V2 encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        V2Serializer::new()
            .serialize(&self.inner, &mut buf)
            .map_err(|e| CollectorError::Codec(format!("histogram encode: {:?}", e)))?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let mut inner: Histogram<u64> = Deserializer::new()
            .deserialize(&mut reader)
            .map_err(|e| CollectorError::Codec(format!("histogram decode: {:?}", e)))?;
        inner.auto(true);
        Ok(Self { inner })
    }

    /// Base64 of the V2 encoding, as agents send it.
    pub fn to_message(&self) -> Result<HistogramMessage> {
        Ok(HistogramMessage {
            ordered_raw_values: Vec::new(),
            encoded_bytes: Some(general_purpose::STANDARD.encode(self.encode()?)),
        })
    }
}
