//! 设备内存存储实现
//!
//! 仅用于本地运行和测试。

use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceRegistration};
use crate::traits::DeviceStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储，以序列号为键。
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn register_device(
        &self,
        record: DeviceRecord,
    ) -> Result<DeviceRegistration, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(existing) = devices.get(&record.device.serial_number) {
            return Ok(DeviceRegistration {
                record: existing.clone(),
                created: false,
            });
        }
        devices.insert(record.device.serial_number.clone(), record.clone());
        Ok(DeviceRegistration {
            record,
            created: true,
        })
    }

    async fn find_device(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get(serial_number).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices.values().cloned().collect();
        items.sort_by(|a, b| a.device.serial_number.cmp(&b.device.serial_number));
        Ok(items)
    }
}
