use solar_storage::StorageError;

/// 告警引擎错误。
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(i64),
    #[error("invalid alert update: {0}")]
    InvalidUpdate(String),
    /// 同一去重键已有未解决告警
    #[error("alert conflict: {0}")]
    Conflict(String),
    #[error("notification failed: {0}")]
    Notification(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
