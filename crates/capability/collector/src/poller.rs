//! 单台设备的读取：连接复用、逐寄存器隔离、规范化。

use crate::error::CollectorError;
use domain::{DeviceRef, Nameplate, Reading};
use solar_protocol::{Endpoint, ProtocolError, RegisterClient, RegisterMap};
use std::time::Duration;
use tracing::{debug, warn};

/// 设备身份与连接参数。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTarget {
    pub device: DeviceRef,
    pub nameplate: Nameplate,
    pub endpoint: Endpoint,
    pub unit_id: u8,
    pub timeout: Duration,
}

/// 一次读取的结果。
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub reading: Reading,
    /// 读取失败、以缺失值记录的寄存器数量
    pub failed_registers: usize,
}

/// 绑定到单台设备的读取器，独占一个会话。
pub struct DevicePoller {
    target: DeviceTarget,
    register_map: RegisterMap,
    client: Box<dyn RegisterClient>,
}

impl DevicePoller {
    pub fn new(
        target: DeviceTarget,
        register_map: RegisterMap,
        client: Box<dyn RegisterClient>,
    ) -> Self {
        Self {
            target,
            register_map,
            client,
        }
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn device(&self) -> &DeviceRef {
        &self.target.device
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// 启动前校验配置。
    pub fn validate(&self) -> Result<(), CollectorError> {
        let target = &self.target;
        let device = &target.device;
        if device.serial_number.trim().is_empty() {
            return Err(CollectorError::Configuration(format!(
                "{} serial number is empty",
                device.class
            )));
        }
        if target.unit_id == 0 {
            return Err(CollectorError::Configuration(format!(
                "{device} unit id must be 1-247"
            )));
        }
        if target.timeout.is_zero() {
            return Err(CollectorError::Configuration(format!(
                "{device} timeout must be positive"
            )));
        }
        if target.endpoint.host.trim().is_empty() {
            return Err(CollectorError::Configuration(format!(
                "{device} host is empty"
            )));
        }
        if target.nameplate.class() != device.class {
            return Err(CollectorError::Configuration(format!(
                "{device} nameplate is for {}",
                target.nameplate.class()
            )));
        }
        if self.register_map.class != device.class || self.register_map.is_empty() {
            return Err(CollectorError::Configuration(format!(
                "{device} register map is empty or for another device class"
            )));
        }
        Ok(())
    }

    /// 复用或建立会话后读取全部寄存器。
    ///
    /// 单个寄存器失败记为缺失值；全部失败时整次读取视为失败。
    pub async fn poll(&mut self) -> Result<PollResult, CollectorError> {
        if !self.client.is_connected() {
            self.client
                .connect(&self.target.endpoint, self.target.timeout)
                .await?;
        }

        let mut reading = Reading::empty(self.target.device.class);
        let mut failed_registers = 0;
        let mut last_error: Option<ProtocolError> = None;
        for register in self.register_map.iter() {
            match self
                .client
                .read_register(register.address, self.target.unit_id)
                .await
            {
                Ok(word) => {
                    let value = register.decode(word);
                    if !reading.apply(&register.field, value) {
                        debug!(
                            target: "solar.collector",
                            device = %self.target.device,
                            field = %register.field,
                            "unmapped_register_field"
                        );
                    }
                }
                Err(err) => {
                    failed_registers += 1;
                    solar_telemetry::record_register_read_failure();
                    warn!(
                        target: "solar.collector",
                        device = %self.target.device,
                        field = %register.field,
                        address = register.address,
                        error = %err,
                        "register_read_failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        if failed_registers == self.register_map.len() {
            let err = last_error.unwrap_or(ProtocolError::NotConnected);
            return Err(CollectorError::Transport(err));
        }
        Ok(PollResult {
            reading,
            failed_registers,
        })
    }

    /// 关闭会话，未连接时无操作。
    pub async fn disconnect(&mut self) {
        self.client.disconnect().await;
    }
}
