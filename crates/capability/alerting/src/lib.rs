//! # 告警能力模块
//!
//! 按启动时加载的规则集评估设备状态：
//!
//! ```text
//! DeviceSnapshot ──► rules::violations ──► AlertStore::create_if_absent ──► AlertNotifier
//! ```
//!
//! - 同一 (设备序列号, 规则类型, 判别值) 最多一条未解决告警
//! - 不自动解决，确认与解决由人工操作，二者互相独立

mod engine;
mod error;
mod notifier;
mod rules;

pub use engine::{AlertEngine, ManualAlert};
pub use error::AlertError;
pub use notifier::{AlertNotifier, TracingNotifier};
pub use rules::{DeviceSnapshot, Violation, violations};
