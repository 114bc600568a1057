use async_trait::async_trait;
use domain::{
    AlertRule, AlertRuleSet, DeviceClass, DeviceRef, InverterNameplate, LoggerNameplate,
    Nameplate, RuleType, Severity,
};
use solar_alerting::{AlertEngine, TracingNotifier};
use solar_collector::{
    Collector, CollectorError, CollectorPhase, CollectorSettings, DevicePoller, DeviceTarget,
};
use solar_protocol::{Endpoint, ProtocolError, RegisterClient, RegisterMap};
use solar_storage::{
    AlertQuery, AlertStore, DeviceStore, InMemoryAlertStore, InMemoryDeviceStore,
    InMemoryMeasurementStore, MeasurementStore, MeasurementsQueryOptions,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INVERTER_SERIAL: &str = "2106027230";
const LOGGER_SERIAL: &str = "1782433145";

#[derive(Default)]
struct FakeDevice {
    registers: HashMap<u16, u16>,
    failing: HashSet<u16>,
    refuse_connect: bool,
    connect_delay: Duration,
    read_delay: Duration,
    panic_on_read: bool,
    connected: bool,
    connects: usize,
    disconnects: usize,
}

struct FakeClient {
    device: Arc<Mutex<FakeDevice>>,
}

#[async_trait]
impl RegisterClient for FakeClient {
    async fn connect(
        &mut self,
        _endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<(), ProtocolError> {
        let (delay, refuse) = {
            let device = self.device.lock().expect("lock");
            (device.connect_delay, device.refuse_connect)
        };
        tokio::time::sleep(delay).await;
        let mut device = self.device.lock().expect("lock");
        device.connects += 1;
        if refuse {
            return Err(ProtocolError::Transport("connection refused".to_string()));
        }
        device.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut device = self.device.lock().expect("lock");
        if device.connected {
            device.connected = false;
            device.disconnects += 1;
        }
    }

    fn is_connected(&self) -> bool {
        self.device.lock().expect("lock").connected
    }

    async fn read_register(&mut self, address: u16, _unit_id: u8) -> Result<u16, ProtocolError> {
        let (delay, fatal) = {
            let device = self.device.lock().expect("lock");
            (device.read_delay, device.panic_on_read)
        };
        if fatal {
            panic!("register driver crashed");
        }
        tokio::time::sleep(delay).await;
        let device = self.device.lock().expect("lock");
        if !device.connected {
            return Err(ProtocolError::NotConnected);
        }
        if device.failing.contains(&address) {
            return Err(ProtocolError::Exception("illegal data address".to_string()));
        }
        Ok(device.registers.get(&address).copied().unwrap_or(0))
    }

    async fn write_register(
        &mut self,
        address: u16,
        value: u16,
        _unit_id: u8,
    ) -> Result<(), ProtocolError> {
        self.device
            .lock()
            .expect("lock")
            .registers
            .insert(address, value);
        Ok(())
    }
}

fn inverter_device() -> Arc<Mutex<FakeDevice>> {
    let registers = HashMap::from([
        (0x0001, 1500),
        (0x0002, 12),
        (0x0008, 45),
        (0x000A, 1),
        (0x000B, 0),
    ]);
    Arc::new(Mutex::new(FakeDevice {
        registers,
        ..FakeDevice::default()
    }))
}

fn logger_device() -> Arc<Mutex<FakeDevice>> {
    let registers = HashMap::from([(0x0100, 1), (0x0102, 0), (0x0103, 90)]);
    Arc::new(Mutex::new(FakeDevice {
        registers,
        ..FakeDevice::default()
    }))
}

fn inverter_poller(device: &Arc<Mutex<FakeDevice>>, unit_id: u8) -> DevicePoller {
    DevicePoller::new(
        DeviceTarget {
            device: DeviceRef::new(DeviceClass::Inverter, INVERTER_SERIAL),
            nameplate: Nameplate::Inverter(InverterNameplate {
                model: "SUN-5K-G".to_string(),
                rated_power_w: 5000.0,
                mppt_count: 2,
                protocol_version: Some("V0.2.0.1".to_string()),
                firmware_version: None,
            }),
            endpoint: Endpoint::new("127.0.0.1", 502),
            unit_id,
            timeout: Duration::from_secs(1),
        },
        RegisterMap::inverter(),
        Box::new(FakeClient {
            device: device.clone(),
        }),
    )
}

fn logger_poller(device: &Arc<Mutex<FakeDevice>>, serial: &str) -> DevicePoller {
    DevicePoller::new(
        DeviceTarget {
            device: DeviceRef::new(DeviceClass::Logger, serial),
            nameplate: Nameplate::Logger(LoggerNameplate {
                model: "LSW-3".to_string(),
                firmware_version: Some("LSW3_15_FFFF_1.0.65".to_string()),
                system_version: None,
                mac_address: None,
                router_ssid: None,
                signal_strength: Some(90),
                data_send_interval_min: Some(5),
                data_log_interval_s: Some(60),
                max_devices: Some(1),
            }),
            endpoint: Endpoint::new("127.0.0.1", 8899),
            unit_id: 1,
            timeout: Duration::from_secs(1),
        },
        RegisterMap::logger(),
        Box::new(FakeClient {
            device: device.clone(),
        }),
    )
}

struct Fixture {
    devices: Arc<InMemoryDeviceStore>,
    measurements: Arc<InMemoryMeasurementStore>,
    alerts: Arc<InMemoryAlertStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            devices: Arc::new(InMemoryDeviceStore::new()),
            measurements: Arc::new(InMemoryMeasurementStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
        }
    }

    fn collector(
        &self,
        settings: CollectorSettings,
        rules: AlertRuleSet,
        pollers: Vec<DevicePoller>,
    ) -> Collector {
        let engine = AlertEngine::new(rules, self.alerts.clone(), Arc::new(TracingNotifier));
        Collector::new(
            settings,
            self.devices.clone(),
            self.measurements.clone(),
            Arc::new(engine),
            pollers,
        )
    }
}

fn fast_settings() -> CollectorSettings {
    CollectorSettings {
        poll_interval: Duration::from_millis(20),
        retry_backoff: Duration::from_millis(20),
        liveness_window: Duration::from_secs(300),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

#[tokio::test]
async fn persists_measurements_with_non_decreasing_timestamps() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    let logger = logger_device();
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![
            inverter_poller(&inverter, 1),
            logger_poller(&logger, LOGGER_SERIAL),
        ],
    );

    collector.start().await.expect("start");
    assert_eq!(collector.phase(), CollectorPhase::Running);
    let store = fixture.measurements.clone();
    wait_until(|| store.len() >= 6).await;
    collector.stop().await;

    let device = DeviceRef::new(DeviceClass::Inverter, INVERTER_SERIAL);
    let items = fixture
        .measurements
        .query_measurements(&device, MeasurementsQueryOptions::default())
        .await
        .expect("query");
    assert!(items.len() >= 3);
    assert!(items.windows(2).all(|pair| pair[0].ts_ms <= pair[1].ts_ms));

    let reading = items[0].inverter().expect("inverter reading");
    assert_eq!(reading.power_output, Some(1500.0));
    assert_eq!(reading.temperature, Some(45.0));
    assert_eq!(reading.status_code, Some(1));
    assert_eq!(reading.fault_code, Some(0));

    // 会话复用：多轮读取只连接一次
    assert_eq!(inverter.lock().expect("lock").connects, 1);
    assert!(!collector.status(domain::now_epoch_ms()).running);
}

#[tokio::test]
async fn failed_register_becomes_absent_field() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    inverter.lock().expect("lock").failing.insert(0x0008);
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![inverter_poller(&inverter, 1)],
    );

    collector.start().await.expect("start");
    let store = fixture.measurements.clone();
    wait_until(|| !store.is_empty()).await;
    collector.stop().await;

    let device = DeviceRef::new(DeviceClass::Inverter, INVERTER_SERIAL);
    let latest = fixture
        .measurements
        .latest_measurement(&device)
        .await
        .expect("latest")
        .expect("measurement");
    let reading = latest.inverter().expect("inverter reading");
    assert_eq!(reading.temperature, None);
    assert_eq!(reading.power_output, Some(1500.0));

    // 单个寄存器失败不会让设备离线
    assert!(collector.is_reachable(INVERTER_SERIAL, domain::now_epoch_ms()));
}

#[tokio::test]
async fn bootstrap_is_idempotent_across_restarts() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    let logger = logger_device();
    let mut collector = fixture.collector(
        CollectorSettings {
            poll_interval: Duration::from_secs(3600),
            ..fast_settings()
        },
        AlertRuleSet::default(),
        vec![
            inverter_poller(&inverter, 1),
            logger_poller(&logger, LOGGER_SERIAL),
        ],
    );

    collector.start().await.expect("first start");
    let first = fixture
        .devices
        .find_device(INVERTER_SERIAL)
        .await
        .expect("find")
        .expect("registered");
    collector.stop().await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    collector.start().await.expect("second start");
    // 重复 start 无操作
    collector.start().await.expect("third start");
    collector.stop().await;

    let devices = fixture.devices.list_devices().await.expect("list");
    assert_eq!(devices.len(), 2);
    let again = fixture
        .devices
        .find_device(INVERTER_SERIAL)
        .await
        .expect("find")
        .expect("registered");
    assert_eq!(again, first);
}

#[tokio::test]
async fn invalid_unit_id_is_fatal_at_start() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![inverter_poller(&inverter, 0)],
    );

    let err = collector.start().await.expect_err("unit id 0");
    assert!(matches!(err, CollectorError::Configuration(_)));
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
    assert!(fixture.devices.list_devices().await.expect("list").is_empty());
    assert_eq!(inverter.lock().expect("lock").connects, 0);
}

#[tokio::test]
async fn duplicate_serial_is_fatal_at_start() {
    let fixture = Fixture::new();
    let first = logger_device();
    let second = logger_device();
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![
            logger_poller(&first, LOGGER_SERIAL),
            logger_poller(&second, LOGGER_SERIAL),
        ],
    );

    let err = collector.start().await.expect_err("duplicate serial");
    assert!(matches!(err, CollectorError::Configuration(_)));
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
}

#[tokio::test]
async fn stop_waits_for_in_flight_cycle() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    let logger = logger_device();
    inverter.lock().expect("lock").read_delay = Duration::from_millis(10);
    logger.lock().expect("lock").read_delay = Duration::from_millis(10);
    let mut collector = fixture.collector(
        CollectorSettings {
            poll_interval: Duration::from_secs(3600),
            ..fast_settings()
        },
        AlertRuleSet::default(),
        vec![
            inverter_poller(&inverter, 1),
            logger_poller(&logger, LOGGER_SERIAL),
        ],
    );

    collector.start().await.expect("start");
    tokio::time::timeout(Duration::from_secs(5), collector.stop())
        .await
        .expect("stop finished");

    // 第一轮没有被中途打断
    assert_eq!(fixture.measurements.len(), 2);
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
    for device in [&inverter, &logger] {
        let device = device.lock().expect("lock");
        assert!(!device.connected);
        assert_eq!(device.disconnects, 1);
    }
    let status = collector.status(domain::now_epoch_ms());
    assert!(status.devices.iter().all(|item| !item.connected));
}

#[tokio::test]
async fn stop_interrupts_the_inter_cycle_sleep() {
    let fixture = Fixture::new();
    let logger = logger_device();
    let mut collector = fixture.collector(
        CollectorSettings {
            poll_interval: Duration::from_secs(3600),
            ..fast_settings()
        },
        AlertRuleSet::default(),
        vec![logger_poller(&logger, LOGGER_SERIAL)],
    );

    collector.start().await.expect("start");
    let handle = collector.handle();
    wait_until(|| handle.status(domain::now_epoch_ms()).last_cycle_at_ms.is_some()).await;

    tokio::time::timeout(Duration::from_secs(1), collector.stop())
        .await
        .expect("stop during sleep returns promptly");
    assert_eq!(handle.phase(), CollectorPhase::Stopped);
    assert!(!logger.lock().expect("lock").connected);
}

#[tokio::test]
async fn stop_without_start_is_noop() {
    let fixture = Fixture::new();
    let logger = logger_device();
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![logger_poller(&logger, LOGGER_SERIAL)],
    );

    collector.stop().await;
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
    assert_eq!(logger.lock().expect("lock").disconnects, 0);
}

#[tokio::test]
async fn unreachable_device_raises_one_communication_alert() {
    let fixture = Fixture::new();
    let inverter = inverter_device();
    {
        let mut device = inverter.lock().expect("lock");
        device.refuse_connect = true;
        device.connect_delay = Duration::from_millis(20);
    }
    let logger = logger_device();
    let rules = AlertRuleSet {
        communication_error: AlertRule::new(
            RuleType::CommunicationError,
            Some(0.01),
            "Device communication lost",
        ),
        ..AlertRuleSet::default()
    };
    let mut collector = fixture.collector(
        fast_settings(),
        rules,
        vec![
            inverter_poller(&inverter, 1),
            logger_poller(&logger, LOGGER_SERIAL),
        ],
    );

    collector.start().await.expect("start");
    wait_until(|| inverter.lock().expect("lock").connects >= 4).await;
    collector.stop().await;

    let alerts = fixture
        .alerts
        .list_alerts(AlertQuery {
            rule_type: Some(RuleType::CommunicationError),
            ..AlertQuery::active()
        })
        .await
        .expect("list");
    let inverter_alerts: Vec<_> = alerts
        .iter()
        .filter(|alert| {
            alert
                .device
                .as_ref()
                .is_some_and(|device| device.serial_number == INVERTER_SERIAL)
        })
        .collect();
    assert_eq!(inverter_alerts.len(), 1);
    assert_eq!(inverter_alerts[0].severity, Severity::High);

    let now_ms = domain::now_epoch_ms();
    assert!(!collector.is_reachable(INVERTER_SERIAL, now_ms));
    assert!(collector.is_reachable(LOGGER_SERIAL, now_ms));
    // 失败的设备没有测量值
    let device = DeviceRef::new(DeviceClass::Inverter, INVERTER_SERIAL);
    assert!(
        fixture
            .measurements
            .latest_measurement(&device)
            .await
            .expect("latest")
            .is_none()
    );
}

#[tokio::test]
async fn empty_device_list_is_fatal_at_start() {
    let fixture = Fixture::new();
    let mut collector = fixture.collector(fast_settings(), AlertRuleSet::default(), Vec::new());

    let err = collector.start().await.expect_err("no devices");
    assert!(matches!(err, CollectorError::Configuration(_)));
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
}

#[tokio::test]
async fn crashed_poll_task_refuses_restart() {
    let fixture = Fixture::new();
    let logger = logger_device();
    logger.lock().expect("lock").panic_on_read = true;
    let mut collector = fixture.collector(
        fast_settings(),
        AlertRuleSet::default(),
        vec![logger_poller(&logger, LOGGER_SERIAL)],
    );

    collector.start().await.expect("start");
    tokio::time::timeout(Duration::from_secs(5), collector.stop())
        .await
        .expect("stop finished");
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
    let status = collector.status(domain::now_epoch_ms());
    assert!(status.devices.iter().all(|item| !item.connected));

    // 会话随任务丢失，不能带着空设备列表重新启动
    let err = collector.start().await.expect_err("restart");
    assert!(matches!(err, CollectorError::TaskFailed(_)));
    assert_eq!(collector.phase(), CollectorPhase::Stopped);
}
