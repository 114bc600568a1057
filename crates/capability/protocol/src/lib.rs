//! # 协议通信能力模块
//!
//! 面向单个 Modbus TCP 端点的寄存器读写：
//! - **RegisterClient**：会话抽象，采集调度器只依赖该 trait
//! - **ModbusSession**：基于 tokio-modbus 的实现，每次调用都带超时
//! - **RegisterMap**：设备类别 → 寄存器地址 / 数据类型 / 缩放
//!
//! ```text
//! Collector ──► RegisterClient (ModbusSession) ──► 设备
//!     │
//!     └── RegisterMap::decode ──► domain::Reading
//! ```

mod client;
mod error;
mod modbus_session;
mod register_map;
mod types;

pub use client::RegisterClient;
pub use error::ProtocolError;
pub use modbus_session::ModbusSession;
pub use register_map::{RegisterMap, RegisterSpec};
pub use types::*;
