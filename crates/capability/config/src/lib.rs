//! 采集守护进程运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 单台设备的 Modbus TCP 连接参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpointConfig {
    pub host: String,
    pub port: u16,
    /// Modbus 单元标识（从站 ID）
    pub unit_id: u8,
    /// 单次网络调用超时（秒）
    pub timeout_seconds: u64,
}

/// 逆变器铭牌配置。
#[derive(Debug, Clone)]
pub struct InverterConfig {
    pub endpoint: DeviceEndpointConfig,
    pub serial_number: String,
    pub model: String,
    pub rated_power_w: f64,
    pub mppt_count: i32,
    pub protocol_version: Option<String>,
}

/// 数据采集器铭牌配置。
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub endpoint: DeviceEndpointConfig,
    pub serial_number: String,
    pub model: String,
    pub firmware_version: Option<String>,
    pub system_version: Option<String>,
    pub mac_address: Option<String>,
    pub router_ssid: Option<String>,
}

/// 告警规则开关与阈值。
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub low_production_enabled: bool,
    pub low_production_threshold_w: f64,
    pub high_temperature_enabled: bool,
    pub high_temperature_threshold_c: f64,
    pub communication_error_enabled: bool,
    pub communication_timeout_seconds: u64,
    pub fault_detected_enabled: bool,
    pub status_warning_enabled: bool,
    pub status_nominal: i64,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 未配置时使用内存存储
    pub database_url: Option<String>,
    pub inverter: InverterConfig,
    pub logger: LoggerConfig,
    pub poll_interval_seconds: u64,
    pub retry_backoff_seconds: u64,
    pub liveness_window_seconds: u64,
    pub alerts: AlertConfig,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = read_optional("SOLAR_DATABASE_URL");

        let inverter = InverterConfig {
            endpoint: read_endpoint("SOLAR_INVERTER", "192.168.1.100", 1)?,
            serial_number: read_string_with_default("SOLAR_INVERTER_SERIAL", "2106027230"),
            model: read_string_with_default("SOLAR_INVERTER_MODEL", "String Single Inverter"),
            rated_power_w: read_f64_with_default("SOLAR_INVERTER_RATED_POWER_W", 3000.0)?,
            mppt_count: read_u8_with_default("SOLAR_INVERTER_MPPT_COUNT", 1)? as i32,
            protocol_version: Some(read_string_with_default(
                "SOLAR_INVERTER_PROTOCOL_VERSION",
                "V0.2.0.1",
            )),
        };

        let logger = LoggerConfig {
            endpoint: read_endpoint("SOLAR_LOGGER", "192.168.0.101", 2)?,
            serial_number: read_string_with_default("SOLAR_LOGGER_SERIAL", "1782433145"),
            model: read_string_with_default("SOLAR_LOGGER_MODEL", "LSW3_15_FFFF"),
            firmware_version: Some(read_string_with_default(
                "SOLAR_LOGGER_FIRMWARE_VERSION",
                "1.0.9E",
            )),
            system_version: Some(read_string_with_default(
                "SOLAR_LOGGER_SYSTEM_VERSION",
                "V1.1.00.10",
            )),
            mac_address: read_optional("SOLAR_LOGGER_MAC_ADDRESS"),
            router_ssid: read_optional("SOLAR_LOGGER_ROUTER_SSID"),
        };

        let poll_interval_seconds = read_u64_with_default("SOLAR_POLL_INTERVAL_SECONDS", 60)?;
        let retry_backoff_seconds = read_u64_with_default("SOLAR_RETRY_BACKOFF_SECONDS", 30)?;
        let liveness_window_seconds =
            read_u64_with_default("SOLAR_LIVENESS_WINDOW_SECONDS", 300)?;
        if poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "SOLAR_POLL_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }

        let alerts = AlertConfig {
            low_production_enabled: read_bool_with_default("SOLAR_ALERT_LOW_PRODUCTION_ENABLED", true),
            low_production_threshold_w: read_f64_with_default(
                "SOLAR_LOW_PRODUCTION_THRESHOLD_W",
                300.0,
            )?,
            high_temperature_enabled: read_bool_with_default(
                "SOLAR_ALERT_HIGH_TEMPERATURE_ENABLED",
                true,
            ),
            high_temperature_threshold_c: read_f64_with_default(
                "SOLAR_HIGH_TEMPERATURE_THRESHOLD_C",
                70.0,
            )?,
            communication_error_enabled: read_bool_with_default(
                "SOLAR_ALERT_COMMUNICATION_ERROR_ENABLED",
                true,
            ),
            communication_timeout_seconds: read_u64_with_default(
                "SOLAR_COMMUNICATION_TIMEOUT_SECONDS",
                liveness_window_seconds,
            )?,
            fault_detected_enabled: read_bool_with_default("SOLAR_ALERT_FAULT_DETECTED_ENABLED", true),
            status_warning_enabled: read_bool_with_default("SOLAR_ALERT_STATUS_WARNING_ENABLED", true),
            status_nominal: read_i64_with_default("SOLAR_STATUS_NOMINAL", 1)?,
        };

        Ok(Self {
            database_url,
            inverter,
            logger,
            poll_interval_seconds,
            retry_backoff_seconds,
            liveness_window_seconds,
            alerts,
        })
    }
}

/// 读取 `{prefix}_HOST/_PORT/_UNIT_ID/_TIMEOUT_SECONDS`。
fn read_endpoint(
    prefix: &str,
    default_host: &str,
    default_unit_id: u8,
) -> Result<DeviceEndpointConfig, ConfigError> {
    Ok(DeviceEndpointConfig {
        host: read_string_with_default(&format!("{prefix}_HOST"), default_host),
        port: read_u16_with_default(&format!("{prefix}_PORT"), 502)?,
        unit_id: read_u8_with_default(&format!("{prefix}_UNIT_ID"), default_unit_id)?,
        timeout_seconds: read_u64_with_default(&format!("{prefix}_TIMEOUT_SECONDS"), 5)?,
    })
}

fn read_string_with_default(key: &str, default: &str) -> String {
    read_optional(key).unwrap_or_else(|| default.to_string())
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_i64_with_default(key: &str, default: i64) -> Result<i64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<i64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f64_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
