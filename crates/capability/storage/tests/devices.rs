use domain::{DeviceClass, DeviceRef, InverterNameplate, Nameplate};
use solar_storage::{DeviceRecord, DeviceStore, InMemoryDeviceStore};

fn inverter(serial: &str, model: &str) -> DeviceRecord {
    DeviceRecord {
        device: DeviceRef::new(DeviceClass::Inverter, serial),
        nameplate: Nameplate::Inverter(InverterNameplate {
            model: model.to_string(),
            rated_power_w: 3000.0,
            mppt_count: 1,
            protocol_version: Some("V0.2.0.1".to_string()),
            firmware_version: None,
        }),
        created_at_ms: 1_000,
    }
}

#[tokio::test]
async fn register_device_is_idempotent() {
    let store = InMemoryDeviceStore::new();
    let first = store
        .register_device(inverter("2106027230", "String Single Inverter"))
        .await
        .expect("register");
    assert!(first.created);

    // 同一序列号再次注册：不新增，也不覆盖铭牌
    let second = store
        .register_device(inverter("2106027230", "Other Model"))
        .await
        .expect("register again");
    assert!(!second.created);
    assert_eq!(second.record.nameplate.model(), "String Single Inverter");

    let devices = store.list_devices().await.expect("list");
    assert_eq!(devices.len(), 1);
}

#[tokio::test]
async fn find_device_by_serial() {
    let store = InMemoryDeviceStore::new();
    store
        .register_device(inverter("INV-1", "String Single Inverter"))
        .await
        .expect("register");

    let found = store
        .find_device("INV-1")
        .await
        .expect("find")
        .expect("device");
    assert_eq!(found.device.class, DeviceClass::Inverter);
    assert!(store.find_device("missing").await.expect("find").is_none());
}
