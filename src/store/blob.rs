// BLOB version prefix helpers. [version: u8][payload].
// Timer trees and query stats are wincode-encoded; histograms use the
// HdrHistogram V2 encoding.

use crate::error::{CollectorError, Result};
use crate::models::{DurationHistogram, QueryStat, TimerTree};

pub(super) const BLOB_VERSION: u8 = 1;

pub(super) fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte; errors on an unknown version.
pub(super) fn blob_payload(bytes: &[u8], expected_version: u8) -> Result<&[u8]> {
    match bytes.first() {
        Some(&v) if v == expected_version => Ok(&bytes[1..]),
        Some(&v) => Err(CollectorError::Codec(format!(
            "unsupported blob version {} (expected {})",
            v, expected_version
        ))),
        None => Err(CollectorError::Codec("empty blob".into())),
    }
}

pub(super) fn encode_timers(timers: &TimerTree) -> Result<Vec<u8>> {
    let payload = wincode::serialize(timers)
        .map_err(|e| CollectorError::Codec(format!("wincode timers: {}", e)))?;
    Ok(with_version_prefix(BLOB_VERSION, payload))
}

pub(super) fn decode_timers(bytes: &[u8]) -> Result<TimerTree> {
    let timers: TimerTree = wincode::deserialize(blob_payload(bytes, BLOB_VERSION)?)
        .map_err(|e| CollectorError::Codec(format!("wincode timers: {}", e)))?;
    if !timers.is_well_formed() {
        return Err(CollectorError::Codec("malformed timer tree".into()));
    }
    Ok(timers)
}

pub(super) fn encode_histogram(histogram: &DurationHistogram) -> Result<Vec<u8>> {
    Ok(with_version_prefix(BLOB_VERSION, histogram.encode()?))
}

pub(super) fn decode_histogram(bytes: &[u8]) -> Result<DurationHistogram> {
    DurationHistogram::decode(blob_payload(bytes, BLOB_VERSION)?)
}

#[allow(clippy::ptr_arg)]
pub(super) fn encode_queries(queries: &Vec<QueryStat>) -> Result<Vec<u8>> {
    let payload = wincode::serialize(queries)
        .map_err(|e| CollectorError::Codec(format!("wincode queries: {}", e)))?;
    Ok(with_version_prefix(BLOB_VERSION, payload))
}

pub(super) fn decode_queries(bytes: &[u8]) -> Result<Vec<QueryStat>> {
    wincode::deserialize(blob_payload(bytes, BLOB_VERSION)?)
        .map_err(|e| CollectorError::Codec(format!("wincode queries: {}", e)))
}
