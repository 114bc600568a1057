//! 内存存储实现模块
//!
//! 未配置数据库时使用，也用于测试。
//!
//! 包含以下实现：
//! - DeviceStore: InMemoryDeviceStore
//! - MeasurementStore: InMemoryMeasurementStore
//! - AlertStore: InMemoryAlertStore

pub mod alert;
pub mod device;
pub mod measurement;

pub use alert::*;
pub use device::*;
pub use measurement::*;
