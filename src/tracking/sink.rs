use async_trait::async_trait;

use super::Notification;
use crate::db::types::ChannelId;

/// Per-channel outcome of one delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub succeeded: Vec<ChannelId>,
    pub failed: Vec<ChannelId>,
}

impl DeliveryReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_complete_failure(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Where notifications go
///
/// Delivery failures are reported, never raised: the caller logs them and
/// moves on without touching tracking state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification, channels: &[ChannelId]) -> DeliveryReport;
}
