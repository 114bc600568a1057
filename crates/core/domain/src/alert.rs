//! 告警规则与级别。

use crate::DeviceClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 告警规则类型（各类型互不相交）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// 功率低于阈值
    LowProduction,
    /// 温度高于阈值
    HighTemperature,
    /// 超过存活窗口未成功读取
    CommunicationError,
    /// 故障码非 0（故障码参与去重）
    FaultDetected,
    /// 状态码偏离正常值（状态码参与去重）
    StatusWarning,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::LowProduction,
        RuleType::HighTemperature,
        RuleType::CommunicationError,
        RuleType::FaultDetected,
        RuleType::StatusWarning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::LowProduction => "low_production",
            RuleType::HighTemperature => "high_temperature",
            RuleType::CommunicationError => "communication_error",
            RuleType::FaultDetected => "fault_detected",
            RuleType::StatusWarning => "status_warning",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == value)
    }

    /// 规则产生的告警级别。
    pub fn severity_for(&self, class: DeviceClass) -> Severity {
        match (self, class) {
            (RuleType::LowProduction, _) => Severity::Medium,
            (RuleType::HighTemperature, _) => Severity::High,
            (RuleType::CommunicationError, DeviceClass::Inverter) => Severity::High,
            (RuleType::CommunicationError, DeviceClass::Logger) => Severity::Medium,
            (RuleType::FaultDetected, _) => Severity::Critical,
            (RuleType::StatusWarning, _) => Severity::Medium,
        }
    }

    /// 去重键是否包含观测值（故障码 / 状态码）。
    pub fn has_discriminant(&self) -> bool {
        matches!(self, RuleType::FaultDetected | RuleType::StatusWarning)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 告警级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == value)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条告警规则配置。
///
/// `threshold` 的含义随规则类型变化：
/// - low_production：功率下限（W）
/// - high_temperature：温度上限（°C）
/// - communication_error：存活窗口（秒）
/// - status_warning：正常状态码
/// - fault_detected：不使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_type: RuleType,
    pub enabled: bool,
    pub threshold: Option<f64>,
    pub message: String,
}

impl AlertRule {
    pub fn new(rule_type: RuleType, threshold: Option<f64>, message: impl Into<String>) -> Self {
        Self {
            rule_type,
            enabled: true,
            threshold,
            message: message.into(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 启动时加载一次的规则集，运行期不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleSet {
    pub low_production: AlertRule,
    pub high_temperature: AlertRule,
    pub communication_error: AlertRule,
    pub fault_detected: AlertRule,
    pub status_warning: AlertRule,
}

impl AlertRuleSet {
    pub fn get(&self, rule_type: RuleType) -> &AlertRule {
        match rule_type {
            RuleType::LowProduction => &self.low_production,
            RuleType::HighTemperature => &self.high_temperature,
            RuleType::CommunicationError => &self.communication_error,
            RuleType::FaultDetected => &self.fault_detected,
            RuleType::StatusWarning => &self.status_warning,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRule> {
        RuleType::ALL.into_iter().map(|rule_type| self.get(rule_type))
    }
}

impl Default for AlertRuleSet {
    fn default() -> Self {
        Self {
            low_production: AlertRule::new(
                RuleType::LowProduction,
                Some(300.0),
                "Low energy production detected",
            ),
            high_temperature: AlertRule::new(
                RuleType::HighTemperature,
                Some(70.0),
                "High inverter temperature",
            ),
            communication_error: AlertRule::new(
                RuleType::CommunicationError,
                Some(300.0),
                "Communication error with equipment",
            ),
            fault_detected: AlertRule::new(
                RuleType::FaultDetected,
                None,
                "Fault detected in the system",
            ),
            status_warning: AlertRule::new(
                RuleType::StatusWarning,
                Some(1.0),
                "Abnormal inverter status",
            ),
        }
    }
}
