//! 寄存器读写客户端抽象。

use crate::error::ProtocolError;
use crate::types::Endpoint;
use async_trait::async_trait;
use std::time::Duration;

/// 单端点寄存器客户端。
///
/// 每个实现只维护一个会话；本层不做重试，重试策略由调用方决定。
#[async_trait]
pub trait RegisterClient: Send {
    /// 建立会话。已连接到同一端点时直接返回；连接到其他端点时先关闭旧会话。
    /// `timeout` 同时作为后续每次读写的超时。
    async fn connect(&mut self, endpoint: &Endpoint, timeout: Duration)
    -> Result<(), ProtocolError>;

    /// 关闭会话，未连接时无操作。
    async fn disconnect(&mut self);

    /// 会话是否可用（不产生 I/O）。
    fn is_connected(&self) -> bool;

    /// 读取单个保持寄存器。
    async fn read_register(&mut self, address: u16, unit_id: u8) -> Result<u16, ProtocolError>;

    /// 写单个保持寄存器，仅用于人工操作。
    async fn write_register(
        &mut self,
        address: u16,
        value: u16,
        unit_id: u8,
    ) -> Result<(), ProtocolError>;
}
