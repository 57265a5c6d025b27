//! Snapshot save/restore integration tests.

mod common;

use common::{as_item, cfg, get_calls, item, manager, wait_until};
use serde_json::{Value, json};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use uc_common::consts::SNAPSHOT_FILE;
use uc_common::driver::{DriverError, StateMap};
use uc_drivers::{LpiEntry, PhiEntry, Snapshot};

#[test]
fn test_save_then_load_restores_driver_set() {
    let dir = tempdir().unwrap();
    let relay_cfg = cfg(json!({"default_status": 0, "event_on_set": true}));
    {
        let (m, _) = manager(dir.path());
        m.load_phi("relay1", "vrtrelay", relay_cfg.clone(), true).unwrap();
        m.load_phi("sensors1", "vrtsensors", cfg(json!({"default_value": 20.5})), true)
            .unwrap();
        m.load_lpi("basic", "basic", "relay1", StateMap::new(), true).unwrap();
        m.load_lpi("sensor", "sensor", "sensors1", StateMap::new(), true)
            .unwrap();
        m.save().unwrap();
        m.stop();
    }

    let (m, _) = manager(dir.path());
    m.load().unwrap();
    let snapshot = m.snapshot();
    assert_eq!(
        snapshot.phi,
        vec![
            PhiEntry {
                id: "relay1".to_string(),
                module: "vrtrelay".to_string(),
                cfg: relay_cfg,
            },
            PhiEntry {
                id: "sensors1".to_string(),
                module: "vrtsensors".to_string(),
                cfg: cfg(json!({"default_value": 20.5})),
            },
        ]
    );
    assert_eq!(
        snapshot.lpi,
        vec![
            LpiEntry {
                lpi_id: "basic".to_string(),
                module: "basic".to_string(),
                phi_id: "relay1".to_string(),
                cfg: StateMap::new(),
            },
            LpiEntry {
                lpi_id: "sensor".to_string(),
                module: "sensor".to_string(),
                phi_id: "sensors1".to_string(),
                cfg: StateMap::new(),
            },
        ]
    );
    assert_eq!(m.lpi_state("sensors1.sensor", "1000").unwrap(), Some(json!(20.5)));
}

#[test]
fn test_snapshot_file_shape() {
    let dir = tempdir().unwrap();
    let (m, _) = manager(dir.path());
    m.load_phi("relay1", "vrtrelay", StateMap::new(), true).unwrap();
    m.load_lpi("basic", "basic", "relay1", cfg(json!({"x": 1})), true)
        .unwrap();
    m.save().unwrap();

    let path = dir.path().join(SNAPSHOT_FILE);
    assert_eq!(m.store().path(), path);
    let data: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(
        data,
        json!({
            "phi": [{"id": "relay1", "mod": "vrtrelay", "cfg": {}}],
            "lpi": [{"lpi_id": "basic", "mod": "basic", "phi_id": "relay1", "cfg": {"x": 1}}],
        })
    );
}

#[test]
fn test_load_does_not_start_drivers() {
    let dir = tempdir().unwrap();
    {
        let (m, _) = manager(dir.path());
        m.load_phi("c1", "constant", cfg(json!({"update": 0.02})), false)
            .unwrap();
        m.save().unwrap();
    }

    let (m, sink) = manager(dir.path());
    m.load().unwrap();
    m.register_item_update(&as_item(&item("sensor1", "|c1.x")))
        .unwrap();
    let phi = m.get_phi("c1").unwrap();
    assert!(!phi.base().pipeline().is_running());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(get_calls(&m, "c1"), 0);

    m.start();
    assert!(wait_until(Duration::from_secs(5), || sink.count() == 1));
    m.stop();
}

#[test]
fn test_restore_skips_failing_entries() {
    let dir = tempdir().unwrap();
    let (m, _) = manager(dir.path());
    let snapshot = Snapshot {
        phi: vec![
            PhiEntry {
                id: "relay1".to_string(),
                module: "vrtrelay".to_string(),
                cfg: StateMap::new(),
            },
            PhiEntry {
                id: "gone1".to_string(),
                module: "nosuch".to_string(),
                cfg: StateMap::new(),
            },
            PhiEntry {
                id: "u1".to_string(),
                module: "unready".to_string(),
                cfg: StateMap::new(),
            },
        ],
        lpi: vec![
            LpiEntry {
                lpi_id: "basic".to_string(),
                module: "basic".to_string(),
                phi_id: "gone1".to_string(),
                cfg: StateMap::new(),
            },
            LpiEntry {
                lpi_id: "basic".to_string(),
                module: "basic".to_string(),
                phi_id: "relay1".to_string(),
                cfg: StateMap::new(),
            },
            LpiEntry {
                lpi_id: "proto".to_string(),
                module: "nosuch".to_string(),
                phi_id: "relay1".to_string(),
                cfg: StateMap::new(),
            },
        ],
    };

    assert_eq!(m.restore(snapshot), (1, 1));
    assert_eq!(m.phi_ids(), vec!["relay1".to_string()]);
    assert_eq!(m.driver_ids(), vec!["relay1.basic".to_string()]);
}

#[test]
fn test_missing_snapshot_is_empty_set() {
    let dir = tempdir().unwrap();
    let (m, _) = manager(dir.path());
    m.load().unwrap();
    assert!(m.phi_ids().is_empty());
    assert!(m.snapshot().is_empty());
}

#[test]
fn test_corrupt_snapshot_is_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(SNAPSHOT_FILE), "{\"phi\": [").unwrap();
    let (m, _) = manager(dir.path());
    assert!(matches!(m.load(), Err(DriverError::Persistence(_))));
    assert!(m.phi_ids().is_empty());
}

#[test]
fn test_broken_instance_left_out_of_snapshot() {
    let dir = tempdir().unwrap();
    let (m, _) = manager(dir.path());
    m.load_phi("relay1", "vrtrelay", StateMap::new(), true).unwrap();
    m.load_phi("bad1", "broken", StateMap::new(), true).unwrap();
    m.save().unwrap();

    let saved = m.store().load().unwrap().unwrap();
    assert_eq!(saved.phi.len(), 1);
    assert_eq!(saved.phi[0].id, "relay1");
}
