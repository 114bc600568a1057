//! 测量值内存实现
//!
//! 仅用于本地运行和测试。

use crate::error::StorageError;
use crate::models::{MeasurementsQueryOptions, TimeOrder};
use crate::traits::MeasurementStore;
use domain::{DeviceRef, Measurement};
use std::sync::RwLock;

/// 测量值内存存储
pub struct InMemoryMeasurementStore {
    values: RwLock<Vec<Measurement>>,
}

impl InMemoryMeasurementStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(Vec::new()),
        }
    }

    /// 获取当前累计的测量值数量（用于测试）
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryMeasurementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MeasurementStore for InMemoryMeasurementStore {
    async fn write_measurement(&self, measurement: &Measurement) -> Result<(), StorageError> {
        if measurement.reading.class() != measurement.device.class {
            return Err(StorageError::new("reading class mismatch"));
        }
        let mut values = self
            .values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        values.push(measurement.clone());
        Ok(())
    }

    async fn latest_measurement(
        &self,
        device: &DeviceRef,
    ) -> Result<Option<Measurement>, StorageError> {
        let values = self
            .values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        // 同一时间戳取最后写入的一条
        let latest = values
            .iter()
            .filter(|item| item.device == *device)
            .fold(None::<&Measurement>, |acc, item| match acc {
                Some(current) if current.ts_ms > item.ts_ms => Some(current),
                _ => Some(item),
            });
        Ok(latest.cloned())
    }

    async fn query_measurements(
        &self,
        device: &DeviceRef,
        options: MeasurementsQueryOptions,
    ) -> Result<Vec<Measurement>, StorageError> {
        let limit = options.limit.max(0) as usize;
        let values = self
            .values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut selected: Vec<Measurement> = values
            .iter()
            .filter(|item| item.device == *device)
            .filter(|item| options.from_ms.is_none_or(|from| item.ts_ms >= from))
            .filter(|item| options.to_ms.is_none_or(|to| item.ts_ms <= to))
            .cloned()
            .collect();

        selected.sort_by_key(|item| item.ts_ms);
        if matches!(options.order, TimeOrder::Desc) {
            selected.reverse();
        }
        if limit > 0 {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}
