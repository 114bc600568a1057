//! 存储接口 Trait 定义
//!
//! - DeviceStore：设备注册（按序列号幂等）
//! - MeasurementStore：测量值追加写入与查询
//! - AlertStore：告警生命周期，含原子去重创建
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    AlertQuery, AlertRecord, AlertStatistics, AlertUpdate, DeviceRecord, DeviceRegistration,
    MeasurementsQueryOptions, NewAlert,
};
use async_trait::async_trait;
use domain::{DeviceRef, Measurement, RuleType};

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 不存在时插入；已存在时原样返回旧记录，不修改任何属性。
    async fn register_device(&self, record: DeviceRecord)
    -> Result<DeviceRegistration, StorageError>;

    /// 按序列号查找设备
    async fn find_device(&self, serial_number: &str)
    -> Result<Option<DeviceRecord>, StorageError>;

    /// 列出全部设备
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError>;
}

/// 测量值存储接口（只追加，不更新）
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// 写入单条测量值（原子）
    async fn write_measurement(&self, measurement: &Measurement) -> Result<(), StorageError>;

    /// 设备最新一条测量值
    async fn latest_measurement(
        &self,
        device: &DeviceRef,
    ) -> Result<Option<Measurement>, StorageError>;

    /// 按时间范围查询
    async fn query_measurements(
        &self,
        device: &DeviceRef,
        options: MeasurementsQueryOptions,
    ) -> Result<Vec<Measurement>, StorageError>;
}

/// 告警存储接口
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// 原子地检查并创建：同一 (设备序列号, 规则类型, 判别值) 已有未解决告警时返回 None。
    async fn create_if_absent(&self, alert: NewAlert) -> Result<Option<AlertRecord>, StorageError>;

    /// 不做去重的创建（人工告警）；关联设备且去重键已有未解决告警时返回错误。
    async fn create_alert(&self, alert: NewAlert) -> Result<AlertRecord, StorageError>;

    async fn find_alert(&self, id: i64) -> Result<Option<AlertRecord>, StorageError>;

    /// 查找去重键对应的未解决告警
    async fn find_unresolved(
        &self,
        device_serial: &str,
        rule_type: RuleType,
        discriminant: Option<i64>,
    ) -> Result<Option<AlertRecord>, StorageError>;

    /// 按条件列出告警，按创建时间倒序
    async fn list_alerts(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, StorageError>;

    /// 部分更新；告警不存在时返回 None
    async fn update_alert(
        &self,
        id: i64,
        update: AlertUpdate,
        at_ms: i64,
    ) -> Result<Option<AlertRecord>, StorageError>;

    async fn delete_alert(&self, id: i64) -> Result<bool, StorageError>;

    /// 统计视图（总数、活跃数、时间窗口内数量、活跃告警按级别 / 类型分组）
    async fn alert_statistics(&self, now_ms: i64) -> Result<AlertStatistics, StorageError>;
}
