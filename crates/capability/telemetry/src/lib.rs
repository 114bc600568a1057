//! 追踪初始化、采集周期 ID 与进程内计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 采集计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub cycle_failures: u64,
    pub register_read_failures: u64,
    pub measurements_written: u64,
    pub measurement_write_failures: u64,
    pub alerts_created: u64,
    pub notification_failures: u64,
    pub cycle_latency_ms_total: u64,
    pub cycle_latency_ms_count: u64,
}

/// 采集计数器。
pub struct TelemetryMetrics {
    cycles: AtomicU64,
    cycle_failures: AtomicU64,
    register_read_failures: AtomicU64,
    measurements_written: AtomicU64,
    measurement_write_failures: AtomicU64,
    alerts_created: AtomicU64,
    notification_failures: AtomicU64,
    cycle_latency_ms_total: AtomicU64,
    cycle_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            cycle_failures: AtomicU64::new(0),
            register_read_failures: AtomicU64::new(0),
            measurements_written: AtomicU64::new(0),
            measurement_write_failures: AtomicU64::new(0),
            alerts_created: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
            cycle_latency_ms_total: AtomicU64::new(0),
            cycle_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            register_read_failures: self.register_read_failures.load(Ordering::Relaxed),
            measurements_written: self.measurements_written.load(Ordering::Relaxed),
            measurement_write_failures: self.measurement_write_failures.load(Ordering::Relaxed),
            alerts_created: self.alerts_created.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            cycle_latency_ms_total: self.cycle_latency_ms_total.load(Ordering::Relaxed),
            cycle_latency_ms_count: self.cycle_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成采集周期 ID，用于串联同一轮的日志。
pub fn new_cycle_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录完成的采集周期。
pub fn record_cycle() {
    metrics().cycles.fetch_add(1, Ordering::Relaxed);
}

/// 记录有设备读取失败的采集周期。
pub fn record_cycle_failure() {
    metrics().cycle_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录单个寄存器读取失败。
pub fn record_register_read_failure() {
    metrics()
        .register_read_failures
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_measurement_written() {
    metrics().measurements_written.fetch_add(1, Ordering::Relaxed);
}

pub fn record_measurement_write_failure() {
    metrics()
        .measurement_write_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录新建告警（去重命中不计）。
pub fn record_alert_created() {
    metrics().alerts_created.fetch_add(1, Ordering::Relaxed);
}

/// 记录通知发送失败。
pub fn record_notification_failure() {
    metrics()
        .notification_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录单轮采集耗时（毫秒）。
pub fn record_cycle_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .cycle_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .cycle_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
