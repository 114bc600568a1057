//! 数据模型
//!
//! 定义存储相关的数据模型和更新结构：
//! - 设备模型：DeviceRecord, DeviceRegistration
//! - 告警模型：AlertRecord, NewAlert, AlertUpdate, AlertQuery
//! - 统计视图：AlertStatistics（由告警列表派生，不落库）

use domain::{DeviceRef, Nameplate, RuleType, Severity};
use std::collections::BTreeMap;

/// 设备记录（序列号为身份，铭牌注册后不变）。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device: DeviceRef,
    pub nameplate: Nameplate,
    pub created_at_ms: i64,
}

/// 注册结果：`created == false` 表示设备已存在，返回的是原记录。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    pub record: DeviceRecord,
    pub created: bool,
}

/// 告警记录。
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: i64,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub message: String,
    /// 触发时的观测值
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    /// 去重键的一部分（故障码 / 状态码）
    pub discriminant: Option<i64>,
    /// 人工创建的告警可以不关联设备
    pub device: Option<DeviceRef>,
    pub created_at_ms: i64,
    pub acknowledged: bool,
    pub acknowledged_at_ms: Option<i64>,
    pub resolved: bool,
    pub resolved_at_ms: Option<i64>,
}

impl AlertRecord {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    /// 是否与给定去重键相同。
    pub fn matches_key(
        &self,
        device_serial: &str,
        rule_type: RuleType,
        discriminant: Option<i64>,
    ) -> bool {
        self.rule_type == rule_type
            && self.discriminant == discriminant
            && self
                .device
                .as_ref()
                .is_some_and(|device| device.serial_number == device_serial)
    }
}

/// 新建告警输入。
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub rule_type: RuleType,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub discriminant: Option<i64>,
    pub device: Option<DeviceRef>,
    pub created_at_ms: i64,
}

impl NewAlert {
    pub(crate) fn into_record(self, id: i64) -> AlertRecord {
        AlertRecord {
            id,
            rule_type: self.rule_type,
            severity: self.severity,
            message: self.message,
            value: self.value,
            threshold: self.threshold,
            discriminant: self.discriminant,
            device: self.device,
            created_at_ms: self.created_at_ms,
            acknowledged: false,
            acknowledged_at_ms: None,
            resolved: false,
            resolved_at_ms: None,
        }
    }
}

/// 告警部分更新（`None` 表示不修改）。
///
/// 置为 true 时记录时间戳（已置位的保留首次时间），置为 false 时清空时间戳。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertUpdate {
    pub acknowledged: Option<bool>,
    pub resolved: Option<bool>,
    pub message: Option<String>,
}

impl AlertUpdate {
    pub fn acknowledge() -> Self {
        Self {
            acknowledged: Some(true),
            ..Self::default()
        }
    }

    pub fn resolve() -> Self {
        Self {
            resolved: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledged.is_none() && self.resolved.is_none() && self.message.is_none()
    }

    /// 在内存记录上应用更新。
    pub fn apply_to(&self, record: &mut AlertRecord, at_ms: i64) {
        if let Some(acknowledged) = self.acknowledged {
            if acknowledged && !record.acknowledged {
                record.acknowledged_at_ms = Some(at_ms);
            } else if !acknowledged {
                record.acknowledged_at_ms = None;
            }
            record.acknowledged = acknowledged;
        }
        if let Some(resolved) = self.resolved {
            if resolved && !record.resolved {
                record.resolved_at_ms = Some(at_ms);
            } else if !resolved {
                record.resolved_at_ms = None;
            }
            record.resolved = resolved;
        }
        if let Some(message) = &self.message {
            record.message = message.clone();
        }
    }
}

/// 告警列表查询条件，结果按创建时间倒序。
#[derive(Debug, Clone, PartialEq)]
pub struct AlertQuery {
    pub active_only: bool,
    pub severity: Option<Severity>,
    pub rule_type: Option<RuleType>,
    pub limit: i64,
}

/// 单次查询的最大条数。
pub const MAX_ALERT_QUERY_LIMIT: i64 = 1000;

impl AlertQuery {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// 限制在 1..=1000 之间。
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_ALERT_QUERY_LIMIT)
    }

    pub fn matches(&self, record: &AlertRecord) -> bool {
        if self.active_only && record.resolved {
            return false;
        }
        if self.severity.is_some_and(|severity| severity != record.severity) {
            return false;
        }
        if self
            .rule_type
            .is_some_and(|rule_type| rule_type != record.rule_type)
        {
            return false;
        }
        true
    }
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            active_only: false,
            severity: None,
            rule_type: None,
            limit: 100,
        }
    }
}

/// 告警统计视图。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertStatistics {
    pub total: u64,
    pub active: u64,
    pub last_24h: u64,
    pub last_7d: u64,
    pub last_30d: u64,
    pub active_by_severity: BTreeMap<Severity, u64>,
    pub active_by_type: BTreeMap<RuleType, u64>,
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

impl AlertStatistics {
    pub fn from_alerts(alerts: &[AlertRecord], now_ms: i64) -> Self {
        let mut stats = Self::default();
        for alert in alerts {
            stats.total += 1;
            let age_ms = now_ms - alert.created_at_ms;
            if age_ms <= DAY_MS {
                stats.last_24h += 1;
            }
            if age_ms <= 7 * DAY_MS {
                stats.last_7d += 1;
            }
            if age_ms <= 30 * DAY_MS {
                stats.last_30d += 1;
            }
            if alert.is_active() {
                stats.active += 1;
                *stats.active_by_severity.entry(alert.severity).or_default() += 1;
                *stats.active_by_type.entry(alert.rule_type).or_default() += 1;
            }
        }
        stats
    }
}

/// 时间排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    #[default]
    Asc,
    Desc,
}

/// 测量值查询参数（闭区间，limit <= 0 表示不限制）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasurementsQueryOptions {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: i64,
    pub order: TimeOrder,
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceClass;

    fn alert(id: i64, rule_type: RuleType, severity: Severity, created_at_ms: i64) -> AlertRecord {
        NewAlert {
            rule_type,
            severity,
            message: "test".to_string(),
            value: None,
            threshold: None,
            discriminant: None,
            device: Some(DeviceRef::new(DeviceClass::Inverter, "INV-1")),
            created_at_ms,
        }
        .into_record(id)
    }

    #[test]
    fn statistics_count_windows_and_active_groups() {
        let now = 40 * DAY_MS;
        let mut resolved = alert(1, RuleType::LowProduction, Severity::Medium, now - 2 * DAY_MS);
        resolved.resolved = true;
        let alerts = vec![
            resolved,
            alert(2, RuleType::FaultDetected, Severity::Critical, now - 1000),
            alert(3, RuleType::HighTemperature, Severity::High, now - 10 * DAY_MS),
            alert(4, RuleType::FaultDetected, Severity::Critical, now - 35 * DAY_MS),
        ];

        let stats = AlertStatistics::from_alerts(&alerts, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.last_24h, 1);
        assert_eq!(stats.last_7d, 2);
        assert_eq!(stats.last_30d, 3);
        assert_eq!(stats.active_by_severity.get(&Severity::Critical), Some(&2));
        assert_eq!(stats.active_by_type.get(&RuleType::LowProduction), None);
    }

    #[test]
    fn update_keeps_first_acknowledge_time() {
        let mut record = alert(1, RuleType::LowProduction, Severity::Medium, 0);
        AlertUpdate::acknowledge().apply_to(&mut record, 100);
        AlertUpdate::acknowledge().apply_to(&mut record, 200);
        assert_eq!(record.acknowledged_at_ms, Some(100));
        assert!(!record.resolved);

        AlertUpdate::resolve().apply_to(&mut record, 300);
        assert!(record.resolved);
        assert_eq!(record.resolved_at_ms, Some(300));
    }

    #[test]
    fn query_limit_is_clamped() {
        let mut query = AlertQuery::default();
        query.limit = 5000;
        assert_eq!(query.effective_limit(), 1000);
        query.limit = 0;
        assert_eq!(query.effective_limit(), 1);
    }
}
