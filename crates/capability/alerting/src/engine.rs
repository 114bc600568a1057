//! 告警引擎：规则评估、去重创建、确认 / 解决生命周期。

use crate::error::AlertError;
use crate::notifier::AlertNotifier;
use crate::rules::{DeviceSnapshot, Violation, violations};
use domain::{AlertRuleSet, DeviceRef, RuleType, Severity};
use solar_storage::{AlertQuery, AlertRecord, AlertStatistics, AlertStore, AlertUpdate, NewAlert};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 人工创建告警的输入。
#[derive(Debug, Clone, PartialEq)]
pub struct ManualAlert {
    pub rule_type: RuleType,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub device: Option<DeviceRef>,
}

pub struct AlertEngine {
    rules: AlertRuleSet,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn AlertNotifier>,
}

impl AlertEngine {
    pub fn new(
        rules: AlertRuleSet,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            rules,
            store,
            notifier,
        }
    }

    pub fn rules(&self) -> &AlertRuleSet {
        &self.rules
    }

    /// 对全部设备评估一次规则，返回本次新建的告警。
    ///
    /// 单条规则的存储失败只记录日志，不影响其他规则和设备。
    pub async fn evaluate(&self, snapshots: &[DeviceSnapshot], now_ms: i64) -> Vec<AlertRecord> {
        let mut created = Vec::new();
        for snapshot in snapshots {
            for violation in violations(&self.rules, snapshot, now_ms) {
                let rule_type = violation.rule_type;
                match self.raise(&snapshot.device, violation, now_ms).await {
                    Ok(Some(alert)) => created.push(alert),
                    Ok(None) => {
                        debug!(
                            target: "solar.alert",
                            device = %snapshot.device,
                            alert_type = %rule_type,
                            "alert_already_open"
                        );
                    }
                    Err(err) => {
                        warn!(
                            target: "solar.alert",
                            device = %snapshot.device,
                            alert_type = %rule_type,
                            error = %err,
                            "alert_rule_failed"
                        );
                    }
                }
            }
        }
        created
    }

    async fn raise(
        &self,
        device: &DeviceRef,
        violation: Violation,
        now_ms: i64,
    ) -> Result<Option<AlertRecord>, AlertError> {
        let alert = NewAlert {
            rule_type: violation.rule_type,
            severity: violation.rule_type.severity_for(device.class),
            message: violation.message,
            value: Some(violation.value),
            threshold: violation.threshold,
            discriminant: violation.discriminant,
            device: Some(device.clone()),
            created_at_ms: now_ms,
        };
        let Some(record) = self.store.create_if_absent(alert).await? else {
            return Ok(None);
        };
        solar_telemetry::record_alert_created();
        info!(
            target: "solar.alert",
            alert_id = record.id,
            device = %device,
            alert_type = %record.rule_type,
            severity = %record.severity,
            "alert_created"
        );
        self.dispatch(&record).await;
        Ok(Some(record))
    }

    /// 通知失败不回滚告警。
    async fn dispatch(&self, record: &AlertRecord) {
        if let Err(err) = self.notifier.notify(record).await {
            solar_telemetry::record_notification_failure();
            warn!(
                target: "solar.alert",
                alert_id = record.id,
                error = %err,
                "alert_notification_failed"
            );
        }
    }

    /// 人工创建告警。
    ///
    /// 关联设备时与自动告警共用去重键，已有未解决告警返回 `Conflict`；
    /// 不关联设备的告警不做去重。
    pub async fn create_manual(
        &self,
        input: ManualAlert,
        now_ms: i64,
    ) -> Result<AlertRecord, AlertError> {
        if input.message.trim().is_empty() {
            return Err(AlertError::InvalidUpdate("message is empty".to_string()));
        }
        let alert = NewAlert {
            rule_type: input.rule_type,
            severity: input.severity,
            message: input.message,
            value: input.value,
            threshold: input.threshold,
            discriminant: None,
            device: input.device,
            created_at_ms: now_ms,
        };
        let record = match alert.device.clone() {
            Some(device) => {
                let rule_type = alert.rule_type;
                match self.store.create_if_absent(alert).await? {
                    Some(record) => record,
                    None => return Err(self.conflict(&device, rule_type).await),
                }
            }
            None => self.store.create_alert(alert).await?,
        };
        solar_telemetry::record_alert_created();
        info!(
            target: "solar.alert",
            alert_id = record.id,
            alert_type = %record.rule_type,
            "manual_alert_created"
        );
        self.dispatch(&record).await;
        Ok(record)
    }

    async fn conflict(&self, device: &DeviceRef, rule_type: RuleType) -> AlertError {
        let existing = self
            .store
            .find_unresolved(&device.serial_number, rule_type, None)
            .await
            .ok()
            .flatten();
        let message = match existing {
            Some(alert) => format!("unresolved {rule_type} alert {} exists for {device}", alert.id),
            None => format!("unresolved {rule_type} alert exists for {device}"),
        };
        warn!(
            target: "solar.alert",
            device = %device,
            alert_type = %rule_type,
            "manual_alert_conflict"
        );
        AlertError::Conflict(message)
    }

    /// 确认告警，记录服务端时间。
    pub async fn acknowledge(&self, id: i64, now_ms: i64) -> Result<AlertRecord, AlertError> {
        let record = self.update(id, AlertUpdate::acknowledge(), now_ms).await?;
        info!(target: "solar.alert", alert_id = id, "alert_acknowledged");
        Ok(record)
    }

    /// 解决告警，无需先确认。
    pub async fn resolve(&self, id: i64, now_ms: i64) -> Result<AlertRecord, AlertError> {
        let record = self.update(id, AlertUpdate::resolve(), now_ms).await?;
        info!(target: "solar.alert", alert_id = id, "alert_resolved");
        Ok(record)
    }

    /// 部分更新（确认 / 解决 / 消息）。
    pub async fn update(
        &self,
        id: i64,
        update: AlertUpdate,
        now_ms: i64,
    ) -> Result<AlertRecord, AlertError> {
        if update.is_empty() {
            return Err(AlertError::InvalidUpdate("no fields to update".to_string()));
        }
        if update
            .message
            .as_ref()
            .is_some_and(|message| message.trim().is_empty())
        {
            return Err(AlertError::InvalidUpdate("message is empty".to_string()));
        }
        self.store
            .update_alert(id, update, now_ms)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    pub async fn find(&self, id: i64) -> Result<AlertRecord, AlertError> {
        self.store
            .find_alert(id)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    pub async fn list(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, AlertError> {
        Ok(self.store.list_alerts(query).await?)
    }

    /// 未解决告警，按创建时间倒序。
    pub async fn active(&self) -> Result<Vec<AlertRecord>, AlertError> {
        self.list(AlertQuery {
            limit: solar_storage::MAX_ALERT_QUERY_LIMIT,
            ..AlertQuery::active()
        })
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), AlertError> {
        if !self.store.delete_alert(id).await? {
            return Err(AlertError::NotFound(id));
        }
        info!(target: "solar.alert", alert_id = id, "alert_deleted");
        Ok(())
    }

    pub async fn statistics(&self, now_ms: i64) -> Result<AlertStatistics, AlertError> {
        Ok(self.store.alert_statistics(now_ms).await?)
    }
}
