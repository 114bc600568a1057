use solar_protocol::ProtocolError;
use solar_storage::StorageError;

/// 采集调度错误。
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 设备配置缺失或非法（启动时致命）
    #[error("configuration error: {0}")]
    Configuration(String),
    /// 轮询任务异常退出，会话已丢失，调度器不能再次启动
    #[error("poll task failed: {0}")]
    TaskFailed(String),
    /// 存储写入失败
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
    /// 连接失败或全部寄存器读取失败
    #[error("transport error: {0}")]
    Transport(#[from] ProtocolError),
}
