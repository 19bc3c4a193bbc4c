//! Quota threshold notifications
//!
//! Sinks are called inline by the quota manager and must not block: they
//! hand the notification off (to a log line, a channel) and return. A sink
//! error is logged by the caller and never changes an admission decision.

use crate::core::quota::QuotaSnapshot;
use crate::utils::error::{AdmissionError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Usage crossed the warning threshold; sent once per period
    Warning,
    /// Usage is at or above the alert threshold; sent on every check
    Alert,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Warning => f.write_str("warning"),
            NotificationLevel::Alert => f.write_str("alert"),
        }
    }
}

/// A quota crossing one of its thresholds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaNotification {
    pub level: NotificationLevel,
    /// Threshold that was crossed, in percent
    pub threshold: f64,
    pub quota: QuotaSnapshot,
    pub sent_at: DateTime<Utc>,
}

/// Receiver of quota notifications
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Hand off a notification without blocking
    fn notify_quota_warning(&self, notification: QuotaNotification) -> Result<()>;
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn notify_quota_warning(&self, notification: QuotaNotification) -> Result<()> {
        let quota = &notification.quota;
        match notification.level {
            NotificationLevel::Warning => warn!(
                "Quota warning for {}:{} ({}/{}): {:.1}% used of {} (threshold {}%)",
                quota.scope,
                quota.scope_id,
                quota.quota_type,
                quota.period,
                quota.usage_percent,
                quota.limit,
                notification.threshold
            ),
            NotificationLevel::Alert => error!(
                "Quota alert for {}:{} ({}/{}): {:.1}% used of {} (threshold {}%)",
                quota.scope,
                quota.scope_id,
                quota.quota_type,
                quota.period,
                quota.usage_percent,
                quota.limit,
                notification.threshold
            ),
        }
        Ok(())
    }
}

/// Forwards notifications to a delivery task over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<QuotaNotification>,
}

impl ChannelNotificationSink {
    /// Create a sink and the receiver a delivery task should drain
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QuotaNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify_quota_warning(&self, notification: QuotaNotification) -> Result<()> {
        self.sender
            .send(notification)
            .map_err(|_| AdmissionError::internal("notification receiver dropped"))
    }
}

/// Discards notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn notify_quota_warning(&self, _notification: QuotaNotification) -> Result<()> {
        Ok(())
    }
}
