//! 寄存器映射：字段名 → 地址 / 数据类型 / 缩放。
//!
//! 映射在启动时构建一次，运行期只读。默认地址来自现场设备手册：
//!
//! ```text
//! 逆变器   0x0001 power_output … 0x000C uptime
//! 采集器   0x0100 connection_status … 0x0103 signal_quality
//! ```

use crate::error::ProtocolError;
use crate::types::ModbusDataType;
use domain::{DeviceClass, Reading};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 单个寄存器定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// 规范化后的字段名
    pub field: String,
    /// 寄存器地址
    pub address: u16,
    /// 数据类型
    #[serde(default)]
    pub data_type: ModbusDataType,
    /// 缩放系数
    #[serde(default)]
    pub scale: Option<f64>,
    /// 偏移量
    #[serde(default)]
    pub offset: Option<f64>,
}

impl RegisterSpec {
    pub fn new(field: impl Into<String>, address: u16) -> Self {
        Self {
            field: field.into(),
            address,
            data_type: ModbusDataType::Uint16,
            scale: None,
            offset: None,
        }
    }

    pub fn with_type(mut self, data_type: ModbusDataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// 原始寄存器字 → 工程值（先按类型解释，再应用缩放和偏移）。
    pub fn decode(&self, word: u16) -> f64 {
        let raw_value = self.data_type.decode(word);
        match (self.scale, self.offset) {
            (Some(scale), Some(offset)) => raw_value * scale + offset,
            (Some(scale), None) => raw_value * scale,
            (None, Some(offset)) => raw_value + offset,
            (None, None) => raw_value,
        }
    }
}

/// 某一设备类别的寄存器映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMap {
    pub class: DeviceClass,
    pub registers: Vec<RegisterSpec>,
}

impl RegisterMap {
    /// 逆变器默认映射。
    pub fn inverter() -> Self {
        Self {
            class: DeviceClass::Inverter,
            registers: vec![
                RegisterSpec::new("power_output", 0x0001),
                RegisterSpec::new("energy_daily", 0x0002),
                RegisterSpec::new("voltage_dc", 0x0003),
                RegisterSpec::new("current_dc", 0x0004),
                RegisterSpec::new("voltage_ac", 0x0005),
                RegisterSpec::new("current_ac", 0x0006),
                RegisterSpec::new("frequency", 0x0007),
                RegisterSpec::new("temperature", 0x0008).with_type(ModbusDataType::Int16),
                RegisterSpec::new("efficiency", 0x0009),
                RegisterSpec::new("status", 0x000A),
                RegisterSpec::new("fault_code", 0x000B),
                RegisterSpec::new("uptime", 0x000C),
            ],
        }
    }

    /// 数据采集器默认映射。
    pub fn logger() -> Self {
        Self {
            class: DeviceClass::Logger,
            registers: vec![
                RegisterSpec::new("connection_status", 0x0100),
                RegisterSpec::new("last_data_sync", 0x0101),
                RegisterSpec::new("error_count", 0x0102),
                RegisterSpec::new("signal_quality", 0x0103),
            ],
        }
    }

    pub fn for_class(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Inverter => Self::inverter(),
            DeviceClass::Logger => Self::logger(),
        }
    }

    /// 从 JSON 配置解析。字段为空、字段或地址重复、字段不属于该设备类别都视为配置错误。
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let map: RegisterMap =
            serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let mut fields = HashSet::new();
        let mut addresses = HashSet::new();
        let mut scratch = Reading::empty(self.class);
        for register in &self.registers {
            if register.field.trim().is_empty() {
                return Err(ProtocolError::ConfigParse(format!(
                    "empty field name at address {:#06x}",
                    register.address
                )));
            }
            if !fields.insert(register.field.as_str()) {
                return Err(ProtocolError::ConfigParse(format!(
                    "duplicate field: {}",
                    register.field
                )));
            }
            if !addresses.insert(register.address) {
                return Err(ProtocolError::ConfigParse(format!(
                    "duplicate address: {:#06x}",
                    register.address
                )));
            }
            if !scratch.apply(&register.field, 0.0) {
                return Err(ProtocolError::ConfigParse(format!(
                    "unknown {} field: {}",
                    self.class, register.field
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterSpec> {
        self.registers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_maps_cover_equipment_registers() {
        let inverter = RegisterMap::inverter();
        assert_eq!(inverter.len(), 12);
        assert_eq!(inverter.registers[0].address, 0x0001);
        assert_eq!(inverter.registers[11].field, "uptime");
        assert_eq!(inverter.registers[11].address, 0x000C);

        let logger = RegisterMap::logger();
        let addresses: Vec<u16> = logger.iter().map(|register| register.address).collect();
        assert_eq!(addresses, vec![0x0100, 0x0101, 0x0102, 0x0103]);
    }

    #[test]
    fn decode_applies_type_and_scale() {
        let temperature = RegisterSpec::new("temperature", 8).with_type(ModbusDataType::Int16);
        assert_eq!(temperature.decode((-5i16) as u16), -5.0);

        let voltage = RegisterSpec::new("voltage_ac", 5).with_scale(0.1);
        assert!((voltage.decode(2301) - 230.1).abs() < 1e-9);

        let raw = RegisterSpec::new("power_output", 1);
        assert_eq!(raw.decode(65535), 65535.0);
    }

    #[test]
    fn parse_map_from_json() {
        let json = r#"{
            "class": "inverter",
            "registers": [
                {"field": "power_output", "address": 1},
                {"field": "temperature", "address": 8, "data_type": "int16", "scale": 0.1}
            ]
        }"#;
        let map = RegisterMap::from_json(json).expect("map");
        assert_eq!(map.class, DeviceClass::Inverter);
        assert_eq!(map.registers[0].data_type, ModbusDataType::Uint16);
        assert_eq!(map.registers[1].scale, Some(0.1));
    }

    #[test]
    fn reject_duplicate_fields() {
        let json = r#"{
            "class": "logger",
            "registers": [
                {"field": "error_count", "address": 258},
                {"field": "error_count", "address": 259}
            ]
        }"#;
        let err = RegisterMap::from_json(json).expect_err("duplicate");
        assert!(matches!(err, ProtocolError::ConfigParse(_)));
    }

    #[test]
    fn reject_duplicate_addresses() {
        let json = r#"{
            "class": "logger",
            "registers": [
                {"field": "error_count", "address": 258},
                {"field": "signal_quality", "address": 258}
            ]
        }"#;
        let err = RegisterMap::from_json(json).expect_err("duplicate address");
        assert!(matches!(err, ProtocolError::ConfigParse(message) if message.contains("address")));
    }

    #[test]
    fn reject_fields_of_another_device_class() {
        let json = r#"{
            "class": "logger",
            "registers": [
                {"field": "power_output", "address": 1}
            ]
        }"#;
        let err = RegisterMap::from_json(json).expect_err("unknown field");
        assert!(matches!(err, ProtocolError::ConfigParse(message) if message.contains("power_output")));
    }
}
