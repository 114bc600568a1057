//! Postgres 设备存储实现
//!
//! 设计要点：
//! - 序列号为主键，注册使用 `on conflict do nothing`，重复注册不修改旧记录
//! - 铭牌以 jsonb 保存

use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceRegistration};
use crate::traits::DeviceStore;
use domain::{DeviceClass, DeviceRef, Nameplate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const DEVICE_COLUMNS: &str = "serial_number, class, nameplate::text as nameplate, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let class: String = row.try_get("class")?;
    let class = DeviceClass::parse(&class)
        .ok_or_else(|| StorageError::new(format!("unknown device class: {class}")))?;
    let nameplate: String = row.try_get("nameplate")?;
    let nameplate: Nameplate = serde_json::from_str(&nameplate)
        .map_err(|e| StorageError::new(format!("invalid nameplate: {e}")))?;
    Ok(DeviceRecord {
        device: DeviceRef::new(class, row.try_get::<String, _>("serial_number")?),
        nameplate,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn register_device(
        &self,
        record: DeviceRecord,
    ) -> Result<DeviceRegistration, StorageError> {
        if record.nameplate.class() != record.device.class {
            return Err(StorageError::new("nameplate class mismatch"));
        }
        let nameplate = serde_json::to_string(&record.nameplate)
            .map_err(|e| StorageError::new(format!("invalid nameplate: {e}")))?;
        let sql = format!(
            "insert into devices (serial_number, class, nameplate, created_at) \
             values ($1, $2, $3::jsonb, to_timestamp($4 / 1000.0)) \
             on conflict (serial_number) do nothing \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&record.device.serial_number)
            .bind(record.device.class.as_str())
            .bind(nameplate)
            .bind(record.created_at_ms as f64)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(DeviceRegistration {
                record: device_from_row(&row)?,
                created: true,
            });
        }

        let existing = self
            .find_device(&record.device.serial_number)
            .await?
            .ok_or_else(|| StorageError::new("device vanished during registration"))?;
        Ok(DeviceRegistration {
            record: existing,
            created: false,
        })
    }

    async fn find_device(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from devices where serial_number = $1");
        let row = sqlx::query(&sql)
            .bind(serial_number)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(device_from_row(&row)?))
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from devices order by serial_number");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut devices = Vec::with_capacity(rows.len());
        for row in rows {
            devices.push(device_from_row(&row)?);
        }
        Ok(devices)
    }
}
