//! Modbus TCP 会话实现
//!
//! 一个 `ModbusSession` 只对应一个端点，连接惰性建立并跨采集周期复用。
//! 每次网络调用都受会话超时约束。
//!
//! ```rust,ignore
//! let mut session = ModbusSession::new();
//! session.connect(&Endpoint::new("192.168.1.100", 502), Duration::from_secs(5)).await?;
//! let power = session.read_register(0x0001, 1).await?;
//! ```

use crate::client::RegisterClient;
use crate::error::ProtocolError;
use crate::types::Endpoint;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Modbus TCP 会话
pub struct ModbusSession {
    ctx: Option<Context>,
    endpoint: Option<Endpoint>,
    timeout: Duration,
    /// 读写过程中发现链路已断开
    broken: bool,
}

impl ModbusSession {
    pub fn new() -> Self {
        Self {
            ctx: None,
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            broken: false,
        }
    }

    /// 当前连接的端点。
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// 连续读取多个保持寄存器。
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit_id: u8,
    ) -> Result<Vec<u16>, ProtocolError> {
        let timeout = self.timeout;
        let ctx = self.ready_context()?;
        ctx.set_slave(Slave(unit_id));
        let result = with_timeout(timeout, ctx.read_holding_registers(address, count)).await;
        let registers = self.settle(result)?;

        debug!(
            target: "solar.protocol",
            unit_id,
            address,
            count,
            values = ?registers,
            "modbus_registers_read"
        );
        Ok(registers)
    }

    fn ready_context(&mut self) -> Result<&mut Context, ProtocolError> {
        if self.broken {
            return Err(ProtocolError::NotConnected);
        }
        self.ctx.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// 展开 tokio-modbus 的双层结果；链路错误或超时会把会话标记为不可用，但不主动关闭。
    /// 超时的请求可能仍有迟到的响应留在流上，会话不能继续复用。
    fn settle<T>(
        &mut self,
        result: Result<Result<Result<T, tokio_modbus::ExceptionCode>, tokio_modbus::Error>, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => Err(ProtocolError::Exception(format!("{:?}", code))),
            Ok(Err(err)) => {
                self.broken = true;
                Err(ProtocolError::Transport(err.to_string()))
            }
            Err(err) => {
                if matches!(err, ProtocolError::Timeout(_)) {
                    self.broken = true;
                }
                Err(err)
            }
        }
    }
}

impl Default for ModbusSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegisterClient for ModbusSession {
    async fn connect(
        &mut self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<(), ProtocolError> {
        if self.is_connected() && self.endpoint.as_ref() == Some(endpoint) {
            return Ok(());
        }
        if self.ctx.is_some() {
            self.disconnect().await;
        }

        let addr = resolve(endpoint, timeout).await?;
        let ctx = tokio::time::timeout(timeout, tcp::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect {} after {:?}", endpoint, timeout)))?
            .map_err(|e| ProtocolError::Transport(format!("connect {}: {}", endpoint, e)))?;

        self.ctx = Some(ctx);
        self.endpoint = Some(endpoint.clone());
        self.timeout = timeout;
        self.broken = false;
        info!(target: "solar.protocol", endpoint = %endpoint, "modbus_connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(mut ctx) = self.ctx.take() else {
            return;
        };
        let endpoint = self.endpoint.take();
        self.broken = false;
        let endpoint = endpoint.map(|item| item.to_string()).unwrap_or_default();
        match tokio::time::timeout(self.timeout, ctx.disconnect()).await {
            Ok(Ok(_)) => {
                info!(target: "solar.protocol", endpoint = %endpoint, "modbus_disconnected");
            }
            Ok(Err(err)) => {
                warn!(target: "solar.protocol", endpoint = %endpoint, error = %err, "modbus_disconnect_failed");
            }
            Err(_) => {
                warn!(target: "solar.protocol", endpoint = %endpoint, "modbus_disconnect_timeout");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some() && !self.broken
    }

    async fn read_register(&mut self, address: u16, unit_id: u8) -> Result<u16, ProtocolError> {
        let registers = self.read_holding_registers(address, 1, unit_id).await?;
        registers.first().copied().ok_or_else(|| {
            ProtocolError::Exception(format!("empty response for register {:#06x}", address))
        })
    }

    async fn write_register(
        &mut self,
        address: u16,
        value: u16,
        unit_id: u8,
    ) -> Result<(), ProtocolError> {
        let timeout = self.timeout;
        let ctx = self.ready_context()?;
        ctx.set_slave(Slave(unit_id));
        let result = with_timeout(timeout, ctx.write_single_register(address, value)).await;
        self.settle(result)?;
        info!(
            target: "solar.protocol",
            unit_id,
            address,
            value,
            "modbus_register_written"
        );
        Ok(())
    }
}

async fn with_timeout<F, T>(timeout: Duration, future: F) -> Result<T, ProtocolError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ProtocolError::Timeout(format!("no response after {:?}", timeout)))
}

async fn resolve(endpoint: &Endpoint, timeout: Duration) -> Result<SocketAddr, ProtocolError> {
    if endpoint.host.trim().is_empty() {
        return Err(ProtocolError::InvalidEndpoint(endpoint.to_string()));
    }
    let mut addrs = tokio::time::timeout(
        timeout,
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| ProtocolError::Timeout(format!("resolve {}", endpoint)))?
    .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    addrs
        .next()
        .ok_or_else(|| ProtocolError::InvalidEndpoint(endpoint.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_without_session_is_not_connected() {
        let mut session = ModbusSession::new();
        assert!(!session.is_connected());
        let err = session.read_register(0x0001, 1).await.expect_err("read");
        assert!(matches!(err, ProtocolError::NotConnected));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn disconnect_when_closed_is_noop() {
        let mut session = ModbusSession::new();
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
        assert!(session.endpoint().is_none());
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        // 先占用再释放端口，确保没有监听者。
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let mut session = ModbusSession::new();
        let err = session
            .connect(&Endpoint::new("127.0.0.1", port), Duration::from_secs(1))
            .await
            .expect_err("refused");
        assert!(err.is_transport());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn empty_host_is_invalid_endpoint() {
        let mut session = ModbusSession::new();
        let err = session
            .connect(&Endpoint::new("", 502), Duration::from_secs(1))
            .await
            .expect_err("invalid");
        assert!(matches!(err, ProtocolError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_same_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            // 保持连接直到测试结束
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let endpoint = Endpoint::new("127.0.0.1", port);
        let mut session = ModbusSession::new();
        session
            .connect(&endpoint, Duration::from_secs(1))
            .await
            .expect("connect");
        assert!(session.is_connected());
        // 第二次连接不会再次握手（监听端只 accept 一次）。
        session
            .connect(&endpoint, Duration::from_secs(1))
            .await
            .expect("reconnect");
        assert_eq!(session.endpoint(), Some(&endpoint));

        session.disconnect().await;
        assert!(!session.is_connected());
        accept.abort();
    }

    #[tokio::test]
    async fn read_timeout_marks_session_unusable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        // 接受连接但从不应答
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let endpoint = Endpoint::new("127.0.0.1", port);
        let mut session = ModbusSession::new();
        session
            .connect(&endpoint, Duration::from_millis(200))
            .await
            .expect("connect");
        let err = session.read_register(0x0001, 1).await.expect_err("timeout");
        assert!(matches!(err, ProtocolError::Timeout(_)));
        assert!(!session.is_connected());
        // 会话只被标记，端点仍保留，下一次 connect 会重建
        assert_eq!(session.endpoint(), Some(&endpoint));

        session.disconnect().await;
        accept.abort();
    }
}
