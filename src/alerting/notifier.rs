// Notification sink for alert transitions.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::Notification;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the collector log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        if n.breached {
            warn!(agent_id = %n.agent_id, alert_id = %n.alert_id, details = %n.details, "alert triggered");
        } else {
            info!(agent_id = %n.agent_id, alert_id = %n.alert_id, details = %n.details, "alert recovered");
        }
        Ok(())
    }
}
