//! Postgres 测量值写入实现
//!
//! 逆变器与采集器分别落在 `inverter_measurements` / `logger_measurements`，
//! 读取失败的字段写为 null。

use crate::error::StorageError;
use crate::models::{MeasurementsQueryOptions, TimeOrder};
use crate::traits::MeasurementStore;
use domain::{DeviceClass, DeviceRef, InverterReading, LoggerReading, Measurement, Reading};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgMeasurementStore {
    pub pool: PgPool,
}

impl PgMeasurementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const INVERTER_COLUMNS: &str = "serial_number, \
     (extract(epoch from ts) * 1000)::bigint as ts_ms, \
     power_output, energy_daily, voltage_dc, current_dc, voltage_ac, current_ac, \
     frequency, temperature, efficiency, status_code, fault_code, uptime";

const LOGGER_COLUMNS: &str = "serial_number, \
     (extract(epoch from ts) * 1000)::bigint as ts_ms, \
     connection_status, last_data_sync, error_count, signal_quality";

fn table_and_columns(class: DeviceClass) -> (&'static str, &'static str) {
    match class {
        DeviceClass::Inverter => ("inverter_measurements", INVERTER_COLUMNS),
        DeviceClass::Logger => ("logger_measurements", LOGGER_COLUMNS),
    }
}

fn measurement_from_row(device: &DeviceRef, row: &PgRow) -> Result<Measurement, StorageError> {
    let reading = match device.class {
        DeviceClass::Inverter => Reading::Inverter(InverterReading {
            power_output: row.try_get("power_output")?,
            energy_daily: row.try_get("energy_daily")?,
            voltage_dc: row.try_get("voltage_dc")?,
            current_dc: row.try_get("current_dc")?,
            voltage_ac: row.try_get("voltage_ac")?,
            current_ac: row.try_get("current_ac")?,
            frequency: row.try_get("frequency")?,
            temperature: row.try_get("temperature")?,
            efficiency: row.try_get("efficiency")?,
            status_code: row.try_get("status_code")?,
            fault_code: row.try_get("fault_code")?,
            uptime: row.try_get("uptime")?,
        }),
        DeviceClass::Logger => Reading::Logger(LoggerReading {
            connection_status: row.try_get("connection_status")?,
            last_data_sync: row.try_get("last_data_sync")?,
            error_count: row.try_get("error_count")?,
            signal_quality: row.try_get("signal_quality")?,
        }),
    };
    Ok(Measurement {
        device: device.clone(),
        ts_ms: row.try_get("ts_ms")?,
        reading,
    })
}

#[async_trait::async_trait]
impl MeasurementStore for PgMeasurementStore {
    async fn write_measurement(&self, measurement: &Measurement) -> Result<(), StorageError> {
        let serial = &measurement.device.serial_number;
        let ts = measurement.ts_ms as f64;
        match (&measurement.reading, measurement.device.class) {
            (Reading::Inverter(reading), DeviceClass::Inverter) => {
                sqlx::query(
                    "insert into inverter_measurements (serial_number, ts, power_output, \
                     energy_daily, voltage_dc, current_dc, voltage_ac, current_ac, frequency, \
                     temperature, efficiency, status_code, fault_code, uptime) \
                     values ($1, to_timestamp($2 / 1000.0), $3, $4, $5, $6, $7, $8, $9, $10, \
                     $11, $12, $13, $14)",
                )
                .bind(serial)
                .bind(ts)
                .bind(reading.power_output)
                .bind(reading.energy_daily)
                .bind(reading.voltage_dc)
                .bind(reading.current_dc)
                .bind(reading.voltage_ac)
                .bind(reading.current_ac)
                .bind(reading.frequency)
                .bind(reading.temperature)
                .bind(reading.efficiency)
                .bind(reading.status_code)
                .bind(reading.fault_code)
                .bind(reading.uptime)
                .execute(&self.pool)
                .await?;
            }
            (Reading::Logger(reading), DeviceClass::Logger) => {
                sqlx::query(
                    "insert into logger_measurements (serial_number, ts, connection_status, \
                     last_data_sync, error_count, signal_quality) \
                     values ($1, to_timestamp($2 / 1000.0), $3, $4, $5, $6)",
                )
                .bind(serial)
                .bind(ts)
                .bind(reading.connection_status)
                .bind(reading.last_data_sync)
                .bind(reading.error_count)
                .bind(reading.signal_quality)
                .execute(&self.pool)
                .await?;
            }
            _ => return Err(StorageError::new("reading class mismatch")),
        }
        Ok(())
    }

    async fn latest_measurement(
        &self,
        device: &DeviceRef,
    ) -> Result<Option<Measurement>, StorageError> {
        let (table, columns) = table_and_columns(device.class);
        let sql = format!(
            "select {columns} from {table} where serial_number = $1 \
             order by ts desc, id desc limit 1"
        );
        let row = sqlx::query(&sql)
            .bind(&device.serial_number)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(measurement_from_row(device, &row)?))
    }

    async fn query_measurements(
        &self,
        device: &DeviceRef,
        options: MeasurementsQueryOptions,
    ) -> Result<Vec<Measurement>, StorageError> {
        let (table, columns) = table_and_columns(device.class);
        let order_by = match options.order {
            TimeOrder::Asc => "asc",
            TimeOrder::Desc => "desc",
        };
        let limit = if options.limit > 0 {
            Some(options.limit)
        } else {
            None
        };
        let sql = format!(
            "select {columns} from {table} \
             where serial_number = $1 \
             and ($2::bigint is null or ts >= to_timestamp($2 / 1000.0)) \
             and ($3::bigint is null or ts <= to_timestamp($3 / 1000.0)) \
             order by ts {order_by}, id {order_by} \
             limit $4"
        );
        let rows = sqlx::query(&sql)
            .bind(&device.serial_number)
            .bind(options.from_ms)
            .bind(options.to_ms)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(measurement_from_row(device, &row)?);
        }
        Ok(items)
    }
}
