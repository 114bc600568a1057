//! # 采集调度能力模块
//!
//! 单个长生命周期任务顺序轮询逆变器与数据记录器：
//!
//! ```text
//! DevicePoller ──► RegisterClient ──► Reading
//!      │
//!      ▼
//! MeasurementStore ──► AlertEngine::evaluate ──► CollectorState（状态报告）
//! ```
//!
//! - 每台设备独占一个会话，读取失败不关闭会话，下一轮按需重连
//! - 单个寄存器失败记为缺失值；连接失败或落库失败只中止本设备本轮
//! - `stop()` 取消轮间休眠，等待进行中的一轮结束后断开全部会话

mod error;
mod poller;
mod scheduler;
mod state;

pub use error::CollectorError;
pub use poller::{DevicePoller, DeviceTarget, PollResult};
pub use scheduler::{Collector, CollectorSettings};
pub use state::{CollectorHandle, CollectorPhase, CollectorState, CollectorStatus, DeviceConnectivity};
