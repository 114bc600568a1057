//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 传输层失败（连接被拒绝、连接断开等）
    #[error("transport error: {0}")]
    Transport(String),

    /// 网络调用超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 设备返回 Modbus 异常响应
    #[error("modbus exception: {0}")]
    Exception(String),

    /// 会话未建立
    #[error("session not connected")]
    NotConnected,

    /// 端点地址无法解析
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// 寄存器映射配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

impl ProtocolError {
    /// 是否为链路层问题（相对于设备级异常响应）。
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_)
                | ProtocolError::Timeout(_)
                | ProtocolError::NotConnected
                | ProtocolError::InvalidEndpoint(_)
        )
    }
}
