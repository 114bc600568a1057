//! 规则判定（纯函数，不访问存储）。

use domain::{AlertRule, AlertRuleSet, DeviceClass, DeviceRef, Measurement, RuleType};

/// 设备在某一时刻的已知状态。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub device: DeviceRef,
    /// 最新一条测量值
    pub latest: Option<Measurement>,
    /// 最近一次成功读取时间；从未成功时由调用方给出基准时间
    pub last_seen_ms: Option<i64>,
}

/// 一次规则命中。
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule_type: RuleType,
    pub value: f64,
    pub threshold: Option<f64>,
    pub discriminant: Option<i64>,
    pub message: String,
}

/// 计算设备当前命中的全部规则。缺失的字段不会触发规则。
pub fn violations(rules: &AlertRuleSet, snapshot: &DeviceSnapshot, now_ms: i64) -> Vec<Violation> {
    let mut items = Vec::new();

    if let Some(violation) = communication(&rules.communication_error, snapshot, now_ms) {
        items.push(violation);
    }

    if snapshot.device.class != DeviceClass::Inverter {
        return items;
    }
    let Some(reading) = snapshot.latest.as_ref().and_then(|m| m.inverter()) else {
        return items;
    };

    let low = &rules.low_production;
    if let (true, Some(power), Some(threshold)) = (low.enabled, reading.power_output, low.threshold)
    {
        if power < threshold {
            items.push(Violation {
                rule_type: RuleType::LowProduction,
                value: power,
                threshold: Some(threshold),
                discriminant: None,
                message: low.message.clone(),
            });
        }
    }

    let high = &rules.high_temperature;
    if let (true, Some(temperature), Some(threshold)) =
        (high.enabled, reading.temperature, high.threshold)
    {
        if temperature > threshold {
            items.push(Violation {
                rule_type: RuleType::HighTemperature,
                value: temperature,
                threshold: Some(threshold),
                discriminant: None,
                message: high.message.clone(),
            });
        }
    }

    let fault = &rules.fault_detected;
    if let (true, Some(code)) = (fault.enabled, reading.fault_code) {
        if code != 0 {
            items.push(Violation {
                rule_type: RuleType::FaultDetected,
                value: code as f64,
                threshold: None,
                discriminant: Some(code),
                message: format!("{} - code: {}", fault.message, code),
            });
        }
    }

    let status = &rules.status_warning;
    if let (true, Some(code)) = (status.enabled, reading.status_code) {
        let nominal = status.threshold.unwrap_or(1.0) as i64;
        if code != nominal {
            items.push(Violation {
                rule_type: RuleType::StatusWarning,
                value: code as f64,
                threshold: Some(nominal as f64),
                discriminant: Some(code),
                message: format!("{} - code: {}", status.message, code),
            });
        }
    }

    items
}

fn communication(rule: &AlertRule, snapshot: &DeviceSnapshot, now_ms: i64) -> Option<Violation> {
    if !rule.enabled {
        return None;
    }
    let window_secs = rule.threshold?;
    let last_seen_ms = snapshot.last_seen_ms?;
    let elapsed_secs = (now_ms - last_seen_ms) as f64 / 1000.0;
    if elapsed_secs <= window_secs {
        return None;
    }
    Some(Violation {
        rule_type: RuleType::CommunicationError,
        value: elapsed_secs,
        threshold: Some(window_secs),
        discriminant: None,
        message: format!(
            "{} ({}) - last update {:.0}s ago",
            rule.message, snapshot.device.class, elapsed_secs
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{InverterReading, Reading};

    fn inverter_snapshot(reading: InverterReading, last_seen_ms: i64) -> DeviceSnapshot {
        let device = DeviceRef::new(DeviceClass::Inverter, "INV-1");
        DeviceSnapshot {
            device: device.clone(),
            latest: Some(Measurement {
                device,
                ts_ms: last_seen_ms,
                reading: Reading::Inverter(reading),
            }),
            last_seen_ms: Some(last_seen_ms),
        }
    }

    #[test]
    fn absent_values_never_violate() {
        let rules = AlertRuleSet::default();
        let snapshot = inverter_snapshot(InverterReading::default(), 1_000);
        assert!(violations(&rules, &snapshot, 1_000).is_empty());
    }

    #[test]
    fn zero_power_is_low_production() {
        let rules = AlertRuleSet::default();
        let snapshot = inverter_snapshot(
            InverterReading {
                power_output: Some(0.0),
                ..InverterReading::default()
            },
            1_000,
        );
        let found = violations(&rules, &snapshot, 1_000);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_type, RuleType::LowProduction);
    }

    #[test]
    fn thresholds_are_strict() {
        let rules = AlertRuleSet::default();
        let snapshot = inverter_snapshot(
            InverterReading {
                power_output: Some(300.0),
                temperature: Some(70.0),
                status_code: Some(1),
                fault_code: Some(0),
                ..InverterReading::default()
            },
            1_000,
        );
        assert!(violations(&rules, &snapshot, 1_000).is_empty());
    }

    #[test]
    fn communication_window_boundary() {
        let rules = AlertRuleSet::default();
        let snapshot = DeviceSnapshot {
            device: DeviceRef::new(DeviceClass::Logger, "LOG-1"),
            latest: None,
            last_seen_ms: Some(0),
        };
        assert!(violations(&rules, &snapshot, 300_000).is_empty());
        let found = violations(&rules, &snapshot, 301_000);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_type, RuleType::CommunicationError);
        assert_eq!(found[0].value, 301.0);
    }

    #[test]
    fn status_and_fault_carry_code() {
        let rules = AlertRuleSet::default();
        let snapshot = inverter_snapshot(
            InverterReading {
                status_code: Some(3),
                fault_code: Some(7),
                ..InverterReading::default()
            },
            1_000,
        );
        let found = violations(&rules, &snapshot, 1_000);
        let codes: Vec<(RuleType, Option<i64>)> = found
            .iter()
            .map(|item| (item.rule_type, item.discriminant))
            .collect();
        assert!(codes.contains(&(RuleType::FaultDetected, Some(7))));
        assert!(codes.contains(&(RuleType::StatusWarning, Some(3))));
    }
}
