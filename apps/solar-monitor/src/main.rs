//! 光伏监控采集进程：逆变器 + 数据记录器轮询、测量值落库、告警评估。

mod shutdown;

use domain::{
    AlertRuleSet, DeviceClass, DeviceRef, InverterNameplate, LoggerNameplate, Nameplate,
};
use solar_alerting::{AlertEngine, TracingNotifier};
use solar_collector::{Collector, CollectorSettings, DevicePoller, DeviceTarget};
use solar_config::{AlertConfig, AppConfig, DeviceEndpointConfig};
use solar_protocol::{Endpoint, ModbusSession, RegisterMap};
use solar_storage::{
    AlertStore, DeviceStore, InMemoryAlertStore, InMemoryDeviceStore, InMemoryMeasurementStore,
    MeasurementStore, PgAlertStore, PgDeviceStore, PgMeasurementStore,
};
use solar_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

struct Stores {
    devices: Arc<dyn DeviceStore>,
    measurements: Arc<dyn MeasurementStore>,
    alerts: Arc<dyn AlertStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let stores = build_stores(&config).await?;
    let engine = Arc::new(AlertEngine::new(
        build_rules(&config.alerts),
        stores.alerts.clone(),
        Arc::new(TracingNotifier),
    ));

    let settings = CollectorSettings {
        poll_interval: Duration::from_secs(config.poll_interval_seconds),
        retry_backoff: Duration::from_secs(config.retry_backoff_seconds),
        liveness_window: Duration::from_secs(config.liveness_window_seconds),
    };
    let mut collector = Collector::new(
        settings,
        stores.devices,
        stores.measurements,
        engine,
        build_pollers(&config),
    );
    collector.start().await?;

    if let Err(err) = shutdown::wait_for_shutdown().await {
        warn!(target: "solar.monitor", error = %err, "shutdown_signal_failed");
    }
    info!(target: "solar.monitor", "shutdown_requested");
    collector.stop().await;

    let snapshot = solar_telemetry::metrics().snapshot();
    info!(
        target: "solar.monitor",
        cycles = snapshot.cycles,
        cycle_failures = snapshot.cycle_failures,
        measurements_written = snapshot.measurements_written,
        alerts_created = snapshot.alerts_created,
        "collector_metrics"
    );
    Ok(())
}

/// 配置了数据库时使用 Postgres（启动时建表），否则使用内存存储。
async fn build_stores(config: &AppConfig) -> Result<Stores, solar_storage::StorageError> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!(target: "solar.monitor", "database_not_configured_using_memory");
        return Ok(Stores {
            devices: Arc::new(InMemoryDeviceStore::new()),
            measurements: Arc::new(InMemoryMeasurementStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
        });
    };
    let pool = solar_storage::connect_pool(database_url).await?;
    solar_storage::apply_schema(&pool).await?;
    info!(target: "solar.monitor", "database_ready");
    Ok(Stores {
        devices: Arc::new(PgDeviceStore::new(pool.clone())),
        measurements: Arc::new(PgMeasurementStore::new(pool.clone())),
        alerts: Arc::new(PgAlertStore::new(pool)),
    })
}

fn build_rules(alerts: &AlertConfig) -> AlertRuleSet {
    let mut rules = AlertRuleSet::default();
    rules.low_production.enabled = alerts.low_production_enabled;
    rules.low_production.threshold = Some(alerts.low_production_threshold_w);
    rules.high_temperature.enabled = alerts.high_temperature_enabled;
    rules.high_temperature.threshold = Some(alerts.high_temperature_threshold_c);
    rules.communication_error.enabled = alerts.communication_error_enabled;
    rules.communication_error.threshold = Some(alerts.communication_timeout_seconds as f64);
    rules.fault_detected.enabled = alerts.fault_detected_enabled;
    rules.status_warning.enabled = alerts.status_warning_enabled;
    rules.status_warning.threshold = Some(alerts.status_nominal as f64);
    rules
}

fn build_pollers(config: &AppConfig) -> Vec<DevicePoller> {
    let inverter = &config.inverter;
    let logger = &config.logger;
    vec![
        poller(
            DeviceRef::new(DeviceClass::Inverter, inverter.serial_number.clone()),
            Nameplate::Inverter(InverterNameplate {
                model: inverter.model.clone(),
                rated_power_w: inverter.rated_power_w,
                mppt_count: inverter.mppt_count,
                protocol_version: inverter.protocol_version.clone(),
                firmware_version: None,
            }),
            &inverter.endpoint,
        ),
        poller(
            DeviceRef::new(DeviceClass::Logger, logger.serial_number.clone()),
            Nameplate::Logger(LoggerNameplate {
                model: logger.model.clone(),
                firmware_version: logger.firmware_version.clone(),
                system_version: logger.system_version.clone(),
                mac_address: logger.mac_address.clone(),
                router_ssid: logger.router_ssid.clone(),
                signal_strength: Some(90),
                data_send_interval_min: Some(5),
                data_log_interval_s: Some(60),
                max_devices: Some(1),
            }),
            &logger.endpoint,
        ),
    ]
}

fn poller(device: DeviceRef, nameplate: Nameplate, endpoint: &DeviceEndpointConfig) -> DevicePoller {
    let register_map = RegisterMap::for_class(device.class);
    DevicePoller::new(
        DeviceTarget {
            device,
            nameplate,
            endpoint: Endpoint::new(endpoint.host.clone(), endpoint.port),
            unit_id: endpoint.unit_id,
            timeout: Duration::from_secs(endpoint.timeout_seconds),
        },
        register_map,
        Box::new(ModbusSession::new()),
    )
}
