//! 光伏采集领域模型：所有模块共享的设备、测量值与告警规则类型。

pub mod alert;
pub mod data;
pub mod device;

pub use alert::{AlertRule, AlertRuleSet, RuleType, Severity};
pub use data::{InverterReading, LoggerReading, Measurement, Reading};
pub use device::{DeviceClass, DeviceRef, InverterNameplate, LoggerNameplate, Nameplate};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
