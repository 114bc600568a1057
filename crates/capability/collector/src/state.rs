//! 采集状态与状态报告。

use domain::DeviceRef;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// 调度器阶段：Stopped → Bootstrapping → Running → Draining → Stopped。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorPhase {
    #[default]
    Stopped,
    Bootstrapping,
    Running,
    Draining,
}

impl CollectorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorPhase::Stopped => "stopped",
            CollectorPhase::Bootstrapping => "bootstrapping",
            CollectorPhase::Running => "running",
            CollectorPhase::Draining => "draining",
        }
    }
}

impl fmt::Display for CollectorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct DeviceState {
    device: Option<DeviceRef>,
    connected: bool,
    last_success_ms: Option<i64>,
    last_ts_ms: Option<i64>,
}

/// 进程内采集状态，重启后清空。
#[derive(Debug, Clone, Default)]
pub struct CollectorState {
    phase: CollectorPhase,
    started_at_ms: Option<i64>,
    last_cycle_at_ms: Option<i64>,
    last_alert_check_ms: Option<i64>,
    order: Vec<String>,
    devices: HashMap<String, DeviceState>,
}

impl CollectorState {
    pub fn phase(&self) -> CollectorPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: CollectorPhase) {
        self.phase = phase;
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub(crate) fn mark_started(&mut self, now_ms: i64) {
        self.started_at_ms = Some(now_ms);
    }

    pub(crate) fn track(&mut self, device: &DeviceRef) {
        if !self.devices.contains_key(&device.serial_number) {
            self.order.push(device.serial_number.clone());
        }
        let entry = self
            .devices
            .entry(device.serial_number.clone())
            .or_default();
        entry.device = Some(device.clone());
    }

    /// 为本次测量分配时间戳，保证同一设备单调不减。
    pub(crate) fn next_timestamp(&mut self, serial: &str, now_ms: i64) -> i64 {
        let entry = self.devices.entry(serial.to_string()).or_default();
        let ts = entry.last_ts_ms.map_or(now_ms, |last| last.max(now_ms));
        entry.last_ts_ms = Some(ts);
        ts
    }

    pub(crate) fn mark_success(&mut self, serial: &str, ts_ms: i64) {
        let entry = self.devices.entry(serial.to_string()).or_default();
        entry.last_success_ms = Some(ts_ms);
    }

    pub(crate) fn set_connected(&mut self, serial: &str, connected: bool) {
        let entry = self.devices.entry(serial.to_string()).or_default();
        entry.connected = connected;
    }

    /// 会话随轮询任务一起丢失时使用。
    pub(crate) fn mark_all_disconnected(&mut self) {
        for item in self.devices.values_mut() {
            item.connected = false;
        }
    }

    pub(crate) fn mark_cycle(&mut self, now_ms: i64) {
        self.last_cycle_at_ms = Some(now_ms);
    }

    pub(crate) fn mark_alert_check(&mut self, now_ms: i64) {
        self.last_alert_check_ms = Some(now_ms);
    }

    pub fn last_success_ms(&self, serial: &str) -> Option<i64> {
        self.devices
            .get(serial)
            .and_then(|item| item.last_success_ms)
    }

    pub fn is_connected(&self, serial: &str) -> bool {
        self.devices.get(serial).is_some_and(|item| item.connected)
    }
}

/// 单台设备的连通性。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConnectivity {
    pub device: DeviceRef,
    /// 会话是否打开
    pub connected: bool,
    /// 存活窗口内是否有成功读取
    pub reachable: bool,
    pub last_success_ms: Option<i64>,
}

/// 聚合状态。
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorStatus {
    pub running: bool,
    pub phase: CollectorPhase,
    pub devices: Vec<DeviceConnectivity>,
    pub poll_interval_secs: u64,
    pub last_cycle_at_ms: Option<i64>,
    pub last_alert_check_ms: Option<i64>,
}

pub(crate) type SharedState = Arc<RwLock<CollectorState>>;

pub(crate) fn write_state<R>(state: &SharedState, f: impl FnOnce(&mut CollectorState) -> R) -> R {
    let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

pub(crate) fn read_state<R>(state: &SharedState, f: impl FnOnce(&CollectorState) -> R) -> R {
    let guard = state.read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// 只读状态句柄，可克隆后交给其他任务查询。
#[derive(Clone)]
pub struct CollectorHandle {
    state: SharedState,
    poll_interval: Duration,
    liveness_window: Duration,
}

impl CollectorHandle {
    pub(crate) fn new(state: SharedState, poll_interval: Duration, liveness_window: Duration) -> Self {
        Self {
            state,
            poll_interval,
            liveness_window,
        }
    }

    pub fn phase(&self) -> CollectorPhase {
        read_state(&self.state, |state| state.phase())
    }

    /// `now - last_success < liveness_window`；从未成功读取时为 false。
    pub fn is_reachable(&self, serial: &str, now_ms: i64) -> bool {
        let window_ms = self.liveness_window.as_millis() as i64;
        read_state(&self.state, |state| {
            state
                .last_success_ms(serial)
                .is_some_and(|last| now_ms - last < window_ms)
        })
    }

    pub fn status(&self, now_ms: i64) -> CollectorStatus {
        let window_ms = self.liveness_window.as_millis() as i64;
        read_state(&self.state, |state| {
            let devices = state
                .order
                .iter()
                .filter_map(|serial| state.devices.get(serial))
                .filter_map(|item| {
                    let device = item.device.clone()?;
                    Some(DeviceConnectivity {
                        device,
                        connected: item.connected,
                        reachable: item
                            .last_success_ms
                            .is_some_and(|last| now_ms - last < window_ms),
                        last_success_ms: item.last_success_ms,
                    })
                })
                .collect();
            CollectorStatus {
                running: state.phase() == CollectorPhase::Running,
                phase: state.phase(),
                devices,
                poll_interval_secs: self.poll_interval.as_secs(),
                last_cycle_at_ms: state.last_cycle_at_ms,
                last_alert_check_ms: state.last_alert_check_ms,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceClass;

    #[test]
    fn timestamps_never_go_backwards() {
        let mut state = CollectorState::default();
        assert_eq!(state.next_timestamp("INV-1", 2_000), 2_000);
        // 系统时钟回拨
        assert_eq!(state.next_timestamp("INV-1", 1_500), 2_000);
        assert_eq!(state.next_timestamp("INV-1", 3_000), 3_000);
        assert_eq!(state.next_timestamp("LOG-1", 1_000), 1_000);
    }

    #[test]
    fn reachability_uses_liveness_window() {
        let state: SharedState = Arc::new(RwLock::new(CollectorState::default()));
        let device = DeviceRef::new(DeviceClass::Inverter, "INV-1");
        write_state(&state, |state| {
            state.track(&device);
            state.mark_success("INV-1", 10_000);
        });
        let handle = CollectorHandle::new(
            state,
            Duration::from_secs(60),
            Duration::from_secs(300),
        );
        assert!(handle.is_reachable("INV-1", 10_000 + 299_999));
        assert!(!handle.is_reachable("INV-1", 10_000 + 300_000));
        assert!(!handle.is_reachable("LOG-1", 10_000));

        let status = handle.status(20_000);
        assert!(!status.running);
        assert_eq!(status.devices.len(), 1);
        assert!(status.devices[0].reachable);
        assert_eq!(status.poll_interval_secs, 60);
    }
}
