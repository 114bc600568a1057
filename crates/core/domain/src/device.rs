//! 设备类型与铭牌属性。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 设备类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// 组串式逆变器
    Inverter,
    /// 数据采集器（WiFi logger）
    Logger,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Inverter, DeviceClass::Logger];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Inverter => "inverter",
            DeviceClass::Logger => "logger",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inverter" => Some(DeviceClass::Inverter),
            "logger" => Some(DeviceClass::Logger),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备引用：类别 + 序列号（序列号是设备的稳定身份）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef {
    pub class: DeviceClass,
    pub serial_number: String,
}

impl DeviceRef {
    pub fn new(class: DeviceClass, serial_number: impl Into<String>) -> Self {
        Self {
            class,
            serial_number: serial_number.into(),
        }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.serial_number)
    }
}

/// 逆变器铭牌。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterNameplate {
    pub model: String,
    /// 额定功率（W）
    pub rated_power_w: f64,
    pub mppt_count: i32,
    pub protocol_version: Option<String>,
    pub firmware_version: Option<String>,
}

/// 数据采集器铭牌。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerNameplate {
    pub model: String,
    pub firmware_version: Option<String>,
    pub system_version: Option<String>,
    pub mac_address: Option<String>,
    pub router_ssid: Option<String>,
    pub signal_strength: Option<i32>,
    /// 上送间隔（分钟）
    pub data_send_interval_min: Option<i32>,
    /// 记录间隔（秒）
    pub data_log_interval_s: Option<i32>,
    pub max_devices: Option<i32>,
}

/// 设备静态属性，注册后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Nameplate {
    Inverter(InverterNameplate),
    Logger(LoggerNameplate),
}

impl Nameplate {
    pub fn class(&self) -> DeviceClass {
        match self {
            Nameplate::Inverter(_) => DeviceClass::Inverter,
            Nameplate::Logger(_) => DeviceClass::Logger,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Nameplate::Inverter(item) => &item.model,
            Nameplate::Logger(item) => &item.model,
        }
    }
}
