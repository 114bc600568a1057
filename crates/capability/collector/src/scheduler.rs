//! 采集调度器：单任务轮询循环。
//!
//! ```text
//! start() ──► Bootstrapping（校验 + 设备注册）──► Running
//!                                               │ 每轮：读取 → 落库 → 告警评估 → 状态刷新
//!                                               │ 休眠 poll_interval（失败时 retry_backoff）
//! stop()  ──► Draining（取消休眠、等待当前轮结束、断开会话）──► Stopped
//! ```

use crate::error::CollectorError;
use crate::poller::DevicePoller;
use crate::state::{
    CollectorHandle, CollectorPhase, CollectorState, CollectorStatus, SharedState, read_state,
    write_state,
};
use domain::{DeviceRef, Measurement};
use solar_alerting::{AlertEngine, DeviceSnapshot};
use solar_storage::{DeviceRecord, DeviceStore, MeasurementStore};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 调度参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub poll_interval: Duration,
    /// 本轮有失败时改用的固定重试间隔
    pub retry_backoff: Duration,
    /// 判定设备可达的存活窗口
    pub liveness_window: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(30),
            liveness_window: Duration::from_secs(300),
        }
    }
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<Vec<DevicePoller>>,
}

/// 采集调度器。由调用方持有，不存在全局实例。
pub struct Collector {
    settings: CollectorSettings,
    device_store: Arc<dyn DeviceStore>,
    measurement_store: Arc<dyn MeasurementStore>,
    engine: Arc<AlertEngine>,
    state: SharedState,
    pollers: Vec<DevicePoller>,
    task: Option<RunningTask>,
    /// 上一次轮询任务异常退出的原因
    task_failure: Option<String>,
}

impl Collector {
    pub fn new(
        settings: CollectorSettings,
        device_store: Arc<dyn DeviceStore>,
        measurement_store: Arc<dyn MeasurementStore>,
        engine: Arc<AlertEngine>,
        pollers: Vec<DevicePoller>,
    ) -> Self {
        Self {
            settings,
            device_store,
            measurement_store,
            engine,
            state: Arc::new(RwLock::new(CollectorState::default())),
            pollers,
            task: None,
            task_failure: None,
        }
    }

    /// 状态查询句柄。
    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle::new(
            self.state.clone(),
            self.settings.poll_interval,
            self.settings.liveness_window,
        )
    }

    pub fn phase(&self) -> CollectorPhase {
        read_state(&self.state, |state| state.phase())
    }

    pub fn status(&self, now_ms: i64) -> CollectorStatus {
        self.handle().status(now_ms)
    }

    pub fn is_reachable(&self, serial: &str, now_ms: i64) -> bool {
        self.handle().is_reachable(serial, now_ms)
    }

    /// 校验配置、注册设备并启动轮询任务。已启动时无操作。
    ///
    /// 配置错误与注册失败都是致命的，调度器回到 Stopped。
    /// 轮询任务曾异常退出时拒绝启动。
    pub async fn start(&mut self) -> Result<(), CollectorError> {
        if self.task.is_some() {
            return Ok(());
        }
        if let Some(reason) = &self.task_failure {
            return Err(CollectorError::TaskFailed(reason.clone()));
        }
        write_state(&self.state, |state| {
            state.set_phase(CollectorPhase::Bootstrapping)
        });

        if let Err(err) = self.bootstrap().await {
            write_state(&self.state, |state| state.set_phase(CollectorPhase::Stopped));
            error!(target: "solar.collector", error = %err, "collector_bootstrap_failed");
            return Err(err);
        }

        let cancel = CancellationToken::new();
        let runner = CycleRunner {
            settings: self.settings,
            measurement_store: self.measurement_store.clone(),
            engine: self.engine.clone(),
            state: self.state.clone(),
            pollers: std::mem::take(&mut self.pollers),
        };
        let handle = tokio::spawn(runner.run(cancel.clone()));
        self.task = Some(RunningTask { cancel, handle });

        write_state(&self.state, |state| state.set_phase(CollectorPhase::Running));
        info!(
            target: "solar.collector",
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "collector_started"
        );
        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<(), CollectorError> {
        if self.pollers.is_empty() {
            return Err(CollectorError::Configuration(
                "no devices configured".to_string(),
            ));
        }
        let mut serials = HashSet::new();
        for poller in &self.pollers {
            poller.validate()?;
            if !serials.insert(poller.device().serial_number.clone()) {
                return Err(CollectorError::Configuration(format!(
                    "duplicate serial number: {}",
                    poller.device().serial_number
                )));
            }
        }

        let now_ms = domain::now_epoch_ms();
        for poller in &self.pollers {
            let target = poller.target();
            let registration = self
                .device_store
                .register_device(DeviceRecord {
                    device: target.device.clone(),
                    nameplate: target.nameplate.clone(),
                    created_at_ms: now_ms,
                })
                .await?;
            info!(
                target: "solar.collector",
                device = %target.device,
                created = registration.created,
                "device_registered"
            );
        }

        write_state(&self.state, |state| {
            state.mark_started(now_ms);
            for poller in &self.pollers {
                state.track(poller.device());
            }
        });
        Ok(())
    }

    /// 取消休眠、等待当前轮结束并断开所有会话。未启动时无操作。
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        write_state(&self.state, |state| state.set_phase(CollectorPhase::Draining));
        info!(target: "solar.collector", "collector_draining");

        task.cancel.cancel();
        match task.handle.await {
            Ok(pollers) => self.pollers = pollers,
            Err(err) => {
                error!(target: "solar.collector", error = %err, "collector_task_join_failed");
                self.task_failure = Some(err.to_string());
                write_state(&self.state, |state| state.mark_all_disconnected());
            }
        }

        write_state(&self.state, |state| {
            state.set_phase(CollectorPhase::Stopped);
            for poller in &self.pollers {
                state.set_connected(&poller.device().serial_number, poller.is_connected());
            }
        });
        info!(target: "solar.collector", "collector_stopped");
    }
}

/// 轮询任务持有的全部资源。
struct CycleRunner {
    settings: CollectorSettings,
    measurement_store: Arc<dyn MeasurementStore>,
    engine: Arc<AlertEngine>,
    state: SharedState,
    pollers: Vec<DevicePoller>,
}

impl CycleRunner {
    async fn run(mut self, cancel: CancellationToken) -> Vec<DevicePoller> {
        loop {
            let cycle_id = solar_telemetry::new_cycle_id();
            let span = info_span!("collector_cycle", cycle_id = %cycle_id);
            let failed = self.run_cycle().instrument(span).await;

            let delay = if failed {
                self.settings.retry_backoff
            } else {
                self.settings.poll_interval
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        for poller in &mut self.pollers {
            poller.disconnect().await;
            let serial = poller.device().serial_number.clone();
            let connected = poller.is_connected();
            write_state(&self.state, |state| state.set_connected(&serial, connected));
        }
        self.pollers
    }

    /// 执行一轮采集，返回本轮是否有设备失败。
    async fn run_cycle(&mut self) -> bool {
        let started = Instant::now();
        let mut failed = false;

        for index in 0..self.pollers.len() {
            if let Err(err) = self.poll_device(index).await {
                failed = true;
                warn!(
                    target: "solar.collector",
                    device = %self.pollers[index].device(),
                    error = %err,
                    "device_cycle_failed"
                );
            }
            let poller = &self.pollers[index];
            let serial = poller.device().serial_number.clone();
            let connected = poller.is_connected();
            write_state(&self.state, |state| state.set_connected(&serial, connected));
        }

        // 失败时同样评估，存活窗口到期后才会产生通讯告警
        let now_ms = domain::now_epoch_ms();
        let snapshots = self.snapshots().await;
        let created = self.engine.evaluate(&snapshots, now_ms).await;
        write_state(&self.state, |state| {
            state.mark_alert_check(now_ms);
            state.mark_cycle(now_ms);
        });

        solar_telemetry::record_cycle();
        if failed {
            solar_telemetry::record_cycle_failure();
        }
        solar_telemetry::record_cycle_latency_ms(started.elapsed().as_millis() as u64);

        let status = CollectorHandle::new(
            self.state.clone(),
            self.settings.poll_interval,
            self.settings.liveness_window,
        )
        .status(now_ms);
        debug!(
            target: "solar.collector",
            alerts_created = created.len(),
            failed,
            status = ?status,
            "collector_cycle_completed"
        );
        failed
    }

    async fn poll_device(&mut self, index: usize) -> Result<(), CollectorError> {
        let poller = &mut self.pollers[index];
        let result = poller.poll().await?;
        let device = poller.device().clone();

        let ts_ms = write_state(&self.state, |state| {
            state.next_timestamp(&device.serial_number, domain::now_epoch_ms())
        });
        let measurement = Measurement {
            device: device.clone(),
            ts_ms,
            reading: result.reading,
        };
        if let Err(err) = self.measurement_store.write_measurement(&measurement).await {
            solar_telemetry::record_measurement_write_failure();
            return Err(err.into());
        }
        solar_telemetry::record_measurement_written();
        write_state(&self.state, |state| {
            state.mark_success(&device.serial_number, ts_ms)
        });
        debug!(
            target: "solar.collector",
            device = %device,
            ts_ms,
            failed_registers = result.failed_registers,
            "measurement_persisted"
        );
        Ok(())
    }

    /// 最近一次成功读取 → 最新落库测量值 → 调度器启动时间，依次作为 last_seen。
    async fn snapshots(&mut self) -> Vec<DeviceSnapshot> {
        let started_at_ms = read_state(&self.state, |state| state.started_at_ms());
        let devices: Vec<DeviceRef> = self
            .pollers
            .iter()
            .map(|poller| poller.device().clone())
            .collect();
        let mut snapshots = Vec::with_capacity(devices.len());
        for device in devices {
            let latest = match self.measurement_store.latest_measurement(&device).await {
                Ok(latest) => latest,
                Err(err) => {
                    warn!(
                        target: "solar.collector",
                        device = %device,
                        error = %err,
                        "latest_measurement_failed"
                    );
                    None
                }
            };
            let last_seen_ms = read_state(&self.state, |state| {
                state.last_success_ms(&device.serial_number)
            })
            .or_else(|| latest.as_ref().map(|item| item.ts_ms))
            .or(started_at_ms);
            snapshots.push(DeviceSnapshot {
                device,
                latest,
                last_seen_ms,
            });
        }
        snapshots
    }
}
