//! 协议相关类型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// Modbus 寄存器数据类型（单寄存器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    #[default]
    Uint16,
}

impl ModbusDataType {
    /// 将原始寄存器字解释为数值。
    pub fn decode(&self, word: u16) -> f64 {
        match self {
            ModbusDataType::Int16 => word as i16 as f64,
            ModbusDataType::Uint16 => word as f64,
        }
    }
}

/// Modbus TCP 端点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
}

fn default_modbus_port() -> u16 {
    502
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
