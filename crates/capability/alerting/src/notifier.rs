//! 告警通知出口。

use crate::error::AlertError;
use async_trait::async_trait;
use solar_storage::AlertRecord;
use tracing::warn;

/// 新告警创建后的通知出口（邮件、Webhook 等由实现决定）。
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), AlertError>;
}

/// 仅输出结构化日志的通知实现。
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), AlertError> {
        let device = alert
            .device
            .as_ref()
            .map(|device| device.to_string())
            .unwrap_or_default();
        warn!(
            target: "solar.alert",
            alert_id = alert.id,
            alert_type = %alert.rule_type,
            severity = %alert.severity,
            device = %device,
            value = ?alert.value,
            message = %alert.message,
            "alert_raised"
        );
        Ok(())
    }
}
