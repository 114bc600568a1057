/// 逆变器单次读数（寄存器读取失败的字段为 None）。
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InverterReading {
    /// 输出功率（W）
    pub power_output: Option<f64>,
    /// 当日发电量（kWh）
    pub energy_daily: Option<f64>,
    pub voltage_dc: Option<f64>,
    pub current_dc: Option<f64>,
    pub voltage_ac: Option<f64>,
    pub current_ac: Option<f64>,
    pub frequency: Option<f64>,
    /// 机内温度（°C）
    pub temperature: Option<f64>,
    /// 转换效率（%）
    pub efficiency: Option<f64>,
    pub status_code: Option<i64>,
    pub fault_code: Option<i64>,
    /// 运行时长（小时）
    pub uptime: Option<i64>,
}

impl InverterReading {
    /// 按寄存器字段名写入一个规范化值，未知字段返回 false。
    pub fn apply(&mut self, field: &str, value: f64) -> bool {
        match field {
            "power_output" => self.power_output = Some(value),
            "energy_daily" => self.energy_daily = Some(value),
            "voltage_dc" => self.voltage_dc = Some(value),
            "current_dc" => self.current_dc = Some(value),
            "voltage_ac" => self.voltage_ac = Some(value),
            "current_ac" => self.current_ac = Some(value),
            "frequency" => self.frequency = Some(value),
            "temperature" => self.temperature = Some(value),
            "efficiency" => self.efficiency = Some(value),
            "status" | "status_code" => self.status_code = Some(value as i64),
            "fault_code" => self.fault_code = Some(value as i64),
            "uptime" => self.uptime = Some(value as i64),
            _ => return false,
        }
        true
    }
}

/// 数据采集器单次读数。
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoggerReading {
    pub connection_status: Option<bool>,
    pub last_data_sync: Option<i64>,
    pub error_count: Option<i64>,
    pub signal_quality: Option<i64>,
}

impl LoggerReading {
    pub fn apply(&mut self, field: &str, value: f64) -> bool {
        match field {
            "connection_status" => self.connection_status = Some(value != 0.0),
            "last_data_sync" => self.last_data_sync = Some(value as i64),
            "error_count" => self.error_count = Some(value as i64),
            "signal_quality" => self.signal_quality = Some(value as i64),
            _ => return false,
        }
        true
    }
}

/// 规范化后的读数。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Reading {
    Inverter(InverterReading),
    Logger(LoggerReading),
}

impl Reading {
    pub fn empty(class: crate::DeviceClass) -> Self {
        match class {
            crate::DeviceClass::Inverter => Reading::Inverter(InverterReading::default()),
            crate::DeviceClass::Logger => Reading::Logger(LoggerReading::default()),
        }
    }

    pub fn class(&self) -> crate::DeviceClass {
        match self {
            Reading::Inverter(_) => crate::DeviceClass::Inverter,
            Reading::Logger(_) => crate::DeviceClass::Logger,
        }
    }

    pub fn apply(&mut self, field: &str, value: f64) -> bool {
        match self {
            Reading::Inverter(reading) => reading.apply(field, value),
            Reading::Logger(reading) => reading.apply(field, value),
        }
    }
}

/// 某一设备在某一采集周期的测量快照（不可变）。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Measurement {
    pub device: crate::DeviceRef,
    pub ts_ms: i64,
    pub reading: Reading,
}

impl Measurement {
    pub fn inverter(&self) -> Option<&InverterReading> {
        match &self.reading {
            Reading::Inverter(reading) => Some(reading),
            Reading::Logger(_) => None,
        }
    }

    pub fn logger(&self) -> Option<&LoggerReading> {
        match &self.reading {
            Reading::Logger(reading) => Some(reading),
            Reading::Inverter(_) => None,
        }
    }
}
