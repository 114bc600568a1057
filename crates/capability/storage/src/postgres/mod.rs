//! # PostgreSQL 存储实现模块
//!
//! 配置 `SOLAR_DATABASE_URL` 时使用。
//!
//! ## 包含的实现
//!
//! - **DeviceStore** (`device.rs`)：设备注册，序列号主键
//! - **MeasurementStore** (`measurement.rs`)：逆变器 / 采集器测量值，按类别分表
//! - **AlertStore** (`alert.rs`)：告警生命周期，部分唯一索引保证去重
//!
//! ## 数据库模式
//!
//! [`SCHEMA`] 中的语句均为 `if not exists`，可在启动时重复执行：
//!
//! - `devices`：设备表（serial_number, class, nameplate, created_at）
//! - `inverter_measurements`：逆变器测量值（serial_number, ts, 12 个可空字段）
//! - `logger_measurements`：采集器测量值（serial_number, ts, 4 个可空字段）
//! - `alerts`：告警表（alert_type, severity, discriminant, device_serial, 确认 / 解决标记）
//!
//! ### 索引
//! - `idx_inverter_measurements_serial_ts` / `idx_logger_measurements_serial_ts`：(serial_number, ts)
//! - `uq_alerts_unresolved`：未解决告警的去重键唯一约束
//! - `idx_alerts_created_at`：列表按创建时间倒序
//!
//! ## 错误处理
//!
//! 所有存储操作返回 `Result<T, StorageError>`，sqlx 错误通过 `From` 转换。

pub mod alert;
pub mod device;
pub mod measurement;

pub use alert::*;
pub use device::*;
pub use measurement::*;

use crate::error::StorageError;
use sqlx::PgPool;

/// 建表语句
pub const SCHEMA: &str = r#"
create table if not exists devices (
    serial_number text primary key,
    class text not null,
    nameplate jsonb not null,
    created_at timestamptz not null default now()
);

create table if not exists inverter_measurements (
    id bigserial primary key,
    serial_number text not null references devices (serial_number),
    ts timestamptz not null,
    power_output double precision,
    energy_daily double precision,
    voltage_dc double precision,
    current_dc double precision,
    voltage_ac double precision,
    current_ac double precision,
    frequency double precision,
    temperature double precision,
    efficiency double precision,
    status_code bigint,
    fault_code bigint,
    uptime bigint
);
create index if not exists idx_inverter_measurements_serial_ts
    on inverter_measurements (serial_number, ts);

create table if not exists logger_measurements (
    id bigserial primary key,
    serial_number text not null references devices (serial_number),
    ts timestamptz not null,
    connection_status boolean,
    last_data_sync bigint,
    error_count bigint,
    signal_quality bigint
);
create index if not exists idx_logger_measurements_serial_ts
    on logger_measurements (serial_number, ts);

create table if not exists alerts (
    id bigserial primary key,
    alert_type text not null,
    severity text not null,
    message text not null,
    value double precision,
    threshold double precision,
    discriminant bigint,
    device_class text,
    device_serial text,
    created_at timestamptz not null default now(),
    acknowledged boolean not null default false,
    acknowledged_at timestamptz,
    resolved boolean not null default false,
    resolved_at timestamptz
);
create unique index if not exists uq_alerts_unresolved
    on alerts (device_serial, alert_type, (coalesce(discriminant, -1)))
    where not resolved and device_serial is not null;
create index if not exists idx_alerts_created_at on alerts (created_at desc);
"#;

/// 执行建表语句
pub async fn apply_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
