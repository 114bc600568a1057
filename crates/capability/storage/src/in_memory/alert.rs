//! 告警内存存储实现
//!
//! 去重检查与插入在同一把写锁内完成。

use crate::error::StorageError;
use crate::models::{AlertQuery, AlertRecord, AlertStatistics, AlertUpdate, NewAlert};
use crate::traits::AlertStore;
use domain::RuleType;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

/// 告警内存存储
pub struct InMemoryAlertStore {
    alerts: RwLock<BTreeMap<i64, AlertRecord>>,
    next_id: AtomicI64,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_open<'a>(
    alerts: &'a BTreeMap<i64, AlertRecord>,
    device_serial: &str,
    rule_type: RuleType,
    discriminant: Option<i64>,
) -> Option<&'a AlertRecord> {
    alerts
        .values()
        .find(|item| !item.resolved && item.matches_key(device_serial, rule_type, discriminant))
}

#[async_trait::async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create_if_absent(&self, alert: NewAlert) -> Result<Option<AlertRecord>, StorageError> {
        let Some(serial) = alert.device.as_ref().map(|d| d.serial_number.clone()) else {
            return self.create_alert(alert).await.map(Some);
        };
        let mut alerts = self
            .alerts
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if find_open(&alerts, &serial, alert.rule_type, alert.discriminant).is_some() {
            return Ok(None);
        }
        let record = alert.into_record(self.allocate_id());
        alerts.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<AlertRecord, StorageError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(device) = alert.device.as_ref()
            && let Some(open) = find_open(
                &alerts,
                &device.serial_number,
                alert.rule_type,
                alert.discriminant,
            )
        {
            return Err(StorageError::new(format!(
                "unresolved alert {} already exists for {device}",
                open.id
            )));
        }
        let record = alert.into_record(self.allocate_id());
        alerts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_alert(&self, id: i64) -> Result<Option<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(alerts.get(&id).cloned())
    }

    async fn find_unresolved(
        &self,
        device_serial: &str,
        rule_type: RuleType,
        discriminant: Option<i64>,
    ) -> Result<Option<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(find_open(&alerts, device_serial, rule_type, discriminant).cloned())
    }

    async fn list_alerts(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<AlertRecord> = alerts
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        items.truncate(query.effective_limit() as usize);
        Ok(items)
    }

    async fn update_alert(
        &self,
        id: i64,
        update: AlertUpdate,
        at_ms: i64,
    ) -> Result<Option<AlertRecord>, StorageError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(current) = alerts.get(&id) else {
            return Ok(None);
        };

        // 重新打开告警不能破坏“同一去重键最多一条未解决”的约束
        if update.resolved == Some(false) && current.resolved {
            if let Some(device) = &current.device {
                let conflict = alerts.values().any(|item| {
                    item.id != id
                        && !item.resolved
                        && item.matches_key(
                            &device.serial_number,
                            current.rule_type,
                            current.discriminant,
                        )
                });
                if conflict {
                    return Err(StorageError::new("unresolved alert already exists"));
                }
            }
        }

        let Some(record) = alerts.get_mut(&id) else {
            return Ok(None);
        };
        update.apply_to(record, at_ms);
        Ok(Some(record.clone()))
    }

    async fn delete_alert(&self, id: i64) -> Result<bool, StorageError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(alerts.remove(&id).is_some())
    }

    async fn alert_statistics(&self, now_ms: i64) -> Result<AlertStatistics, StorageError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let items: Vec<AlertRecord> = alerts.values().cloned().collect();
        Ok(AlertStatistics::from_alerts(&items, now_ms))
    }
}
