//! Postgres 告警存储实现
//!
//! 去重依赖部分唯一索引 `uq_alerts_unresolved`：
//! (device_serial, alert_type, coalesce(discriminant, -1)) where not resolved，
//! 插入使用 `on conflict do nothing`，检查与创建在一条语句内完成。

use crate::error::StorageError;
use crate::models::{AlertQuery, AlertRecord, AlertStatistics, AlertUpdate, NewAlert};
use crate::traits::AlertStore;
use domain::{DeviceClass, DeviceRef, RuleType, Severity};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgAlertStore {
    pub pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const ALERT_COLUMNS: &str = "id, alert_type, severity, message, value, threshold, discriminant, \
     device_class, device_serial, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
     acknowledged, (extract(epoch from acknowledged_at) * 1000)::bigint as acknowledged_at_ms, \
     resolved, (extract(epoch from resolved_at) * 1000)::bigint as resolved_at_ms";

const INSERT_ALERT: &str = "insert into alerts (alert_type, severity, message, value, threshold, \
     discriminant, device_class, device_serial, created_at) \
     values ($1, $2, $3, $4, $5, $6, $7, $8, to_timestamp($9 / 1000.0))";

fn alert_from_row(row: &PgRow) -> Result<AlertRecord, StorageError> {
    let alert_type: String = row.try_get("alert_type")?;
    let rule_type = RuleType::parse(&alert_type)
        .ok_or_else(|| StorageError::new(format!("unknown alert type: {alert_type}")))?;
    let severity: String = row.try_get("severity")?;
    let severity = Severity::parse(&severity)
        .ok_or_else(|| StorageError::new(format!("unknown severity: {severity}")))?;
    let device_class: Option<String> = row.try_get("device_class")?;
    let device_serial: Option<String> = row.try_get("device_serial")?;
    let device = match (device_class, device_serial) {
        (Some(class), Some(serial)) => {
            let class = DeviceClass::parse(&class)
                .ok_or_else(|| StorageError::new(format!("unknown device class: {class}")))?;
            Some(DeviceRef::new(class, serial))
        }
        _ => None,
    };
    Ok(AlertRecord {
        id: row.try_get("id")?,
        rule_type,
        severity,
        message: row.try_get("message")?,
        value: row.try_get("value")?,
        threshold: row.try_get("threshold")?,
        discriminant: row.try_get("discriminant")?,
        device,
        created_at_ms: row.try_get("created_at_ms")?,
        acknowledged: row.try_get("acknowledged")?,
        acknowledged_at_ms: row.try_get("acknowledged_at_ms")?,
        resolved: row.try_get("resolved")?,
        resolved_at_ms: row.try_get("resolved_at_ms")?,
    })
}

fn bind_new_alert<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    alert: &'q NewAlert,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(alert.rule_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(alert.discriminant)
        .bind(alert.device.as_ref().map(|device| device.class.as_str()))
        .bind(alert.device.as_ref().map(|device| device.serial_number.as_str()))
        .bind(alert.created_at_ms as f64)
}

#[async_trait::async_trait]
impl AlertStore for PgAlertStore {
    async fn create_if_absent(&self, alert: NewAlert) -> Result<Option<AlertRecord>, StorageError> {
        if alert.device.is_none() {
            return self.create_alert(alert).await.map(Some);
        }
        let sql = format!(
            "{INSERT_ALERT} \
             on conflict (device_serial, alert_type, (coalesce(discriminant, -1))) \
             where not resolved and device_serial is not null \
             do nothing \
             returning {ALERT_COLUMNS}"
        );
        let row = bind_new_alert(sqlx::query(&sql), &alert)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(alert_from_row(&row)?))
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<AlertRecord, StorageError> {
        let sql = format!("{INSERT_ALERT} returning {ALERT_COLUMNS}");
        let row = bind_new_alert(sqlx::query(&sql), &alert)
            .fetch_one(&self.pool)
            .await?;
        alert_from_row(&row)
    }

    async fn find_alert(&self, id: i64) -> Result<Option<AlertRecord>, StorageError> {
        let sql = format!("select {ALERT_COLUMNS} from alerts where id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(alert_from_row(&row)?))
    }

    async fn find_unresolved(
        &self,
        device_serial: &str,
        rule_type: RuleType,
        discriminant: Option<i64>,
    ) -> Result<Option<AlertRecord>, StorageError> {
        let sql = format!(
            "select {ALERT_COLUMNS} from alerts \
             where device_serial = $1 and alert_type = $2 \
             and discriminant is not distinct from $3 \
             and not resolved \
             limit 1"
        );
        let row = sqlx::query(&sql)
            .bind(device_serial)
            .bind(rule_type.as_str())
            .bind(discriminant)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(alert_from_row(&row)?))
    }

    async fn list_alerts(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, StorageError> {
        let sql = format!(
            "select {ALERT_COLUMNS} from alerts \
             where ($1 = false or not resolved) \
             and ($2::text is null or severity = $2) \
             and ($3::text is null or alert_type = $3) \
             order by created_at desc, id desc \
             limit $4"
        );
        let rows = sqlx::query(&sql)
            .bind(query.active_only)
            .bind(query.severity.map(|severity| severity.as_str()))
            .bind(query.rule_type.map(|rule_type| rule_type.as_str()))
            .bind(query.effective_limit())
            .fetch_all(&self.pool)
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(alert_from_row(&row)?);
        }
        Ok(items)
    }

    async fn update_alert(
        &self,
        id: i64,
        update: AlertUpdate,
        at_ms: i64,
    ) -> Result<Option<AlertRecord>, StorageError> {
        // 置为 true 时保留首次时间戳，置为 false 时清空
        let sql = format!(
            "update alerts set \
             acknowledged_at = case \
               when $1::boolean is null then acknowledged_at \
               when $1 and not acknowledged then to_timestamp($4 / 1000.0) \
               when $1 then acknowledged_at \
               else null end, \
             acknowledged = coalesce($1, acknowledged), \
             resolved_at = case \
               when $2::boolean is null then resolved_at \
               when $2 and not resolved then to_timestamp($4 / 1000.0) \
               when $2 then resolved_at \
               else null end, \
             resolved = coalesce($2, resolved), \
             message = coalesce($3, message) \
             where id = $5 \
             returning {ALERT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(update.acknowledged)
            .bind(update.resolved)
            .bind(update.message)
            .bind(at_ms as f64)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(alert_from_row(&row)?))
    }

    async fn delete_alert(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from alerts where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn alert_statistics(&self, now_ms: i64) -> Result<AlertStatistics, StorageError> {
        let totals = sqlx::query(
            "select count(*) as total, \
             count(*) filter (where not resolved) as active, \
             count(*) filter (where created_at >= to_timestamp($1 / 1000.0) - interval '24 hours') as last_24h, \
             count(*) filter (where created_at >= to_timestamp($1 / 1000.0) - interval '7 days') as last_7d, \
             count(*) filter (where created_at >= to_timestamp($1 / 1000.0) - interval '30 days') as last_30d \
             from alerts",
        )
        .bind(now_ms as f64)
        .fetch_one(&self.pool)
        .await?;

        let mut stats = AlertStatistics {
            total: totals.try_get::<i64, _>("total")? as u64,
            active: totals.try_get::<i64, _>("active")? as u64,
            last_24h: totals.try_get::<i64, _>("last_24h")? as u64,
            last_7d: totals.try_get::<i64, _>("last_7d")? as u64,
            last_30d: totals.try_get::<i64, _>("last_30d")? as u64,
            ..AlertStatistics::default()
        };

        let rows = sqlx::query(
            "select alert_type, severity, count(*) as count from alerts \
             where not resolved group by alert_type, severity",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let count = row.try_get::<i64, _>("count")? as u64;
            let alert_type: String = row.try_get("alert_type")?;
            let severity: String = row.try_get("severity")?;
            if let Some(rule_type) = RuleType::parse(&alert_type) {
                *stats.active_by_type.entry(rule_type).or_default() += count;
            }
            if let Some(severity) = Severity::parse(&severity) {
                *stats.active_by_severity.entry(severity).or_default() += count;
            }
        }
        Ok(stats)
    }
}
