use binsai_config::store::{self, ConfigStore, KEY_PPM_A, KEY_R0};
use binsai_config::{Config, PpmModel};
use binsai_hardware::kv::{FileKvStore, MemKvStore};
use binsai_traits::{KvStore, KvValue};
use tempfile::tempdir;

#[test]
fn empty_store_yields_base_config() {
    let mut cs = ConfigStore::new(MemKvStore::default());
    let base = Config::default();
    assert_eq!(cs.load(&base).unwrap(), base);
}

#[test]
fn saved_values_override_base() {
    let mut cs = ConfigStore::new(MemKvStore::default());
    let mut cfg = Config::default();
    cfg.gas.mq135_r0 = 23.5;
    cfg.thresholds.critical_fill = 85.0;
    cfg.sms.cooldown_ms = 60_000;
    cfg.network.wifi_ssid = "depot".into();
    cs.save(&cfg).unwrap();

    let loaded = cs.load(&Config::default()).unwrap();
    assert_eq!(loaded.gas.mq135_r0, 23.5);
    assert_eq!(loaded.thresholds.critical_fill, 85.0);
    assert_eq!(loaded.sms.cooldown_ms, 60_000);
    assert_eq!(loaded.network.wifi_ssid, "depot");
}

#[test]
fn wrong_typed_value_falls_back_to_default() {
    let mut kv = MemKvStore::default();
    kv.open(store::NAMESPACE).unwrap();
    kv.set(KEY_R0, KvValue::Str("oops".into())).unwrap();
    kv.close().unwrap();
    let mut cs = ConfigStore::new(kv);
    let loaded = cs.load(&Config::default()).unwrap();
    assert_eq!(loaded.gas.mq135_r0, Config::default().gas.mq135_r0);
}

#[test]
fn device_id_derived_once_and_persisted() {
    let mut cs = ConfigStore::new(MemKvStore::default());
    let mut cfg = Config::default();
    let mac = [0x24, 0x6F, 0x28, 0xA1, 0xB2, 0xC3];
    assert!(cs.ensure_device_id(&mut cfg, mac).unwrap());
    assert_eq!(cfg.device.device_id, "BINSAI-A1B2C3");
    assert!(!cs.ensure_device_id(&mut cfg, [0; 6]).unwrap());

    let reloaded = cs.load(&Config::default()).unwrap();
    assert_eq!(reloaded.device.device_id, "BINSAI-A1B2C3");
}

#[test]
fn model_switch_resets_coefficients() {
    let mut cfg = Config::default();
    store::set_from_str(&mut cfg, KEY_PPM_A, "0.5").unwrap();
    assert_eq!(cfg.gas.coefficients().0, 0.5);
    store::set_from_str(&mut cfg, "ppm_model", "ratio").unwrap();
    assert_eq!(cfg.gas.model, PpmModel::Ratio);
    assert_eq!(cfg.gas.coefficients(), (116.6, 2.77));
}

#[test]
fn set_rejects_unknown_key_and_bad_numbers() {
    let mut cfg = Config::default();
    let err = store::set_from_str(&mut cfg, "bogus", "1").unwrap_err();
    assert!(format!("{err}").contains("unknown config key"));
    let err = store::set_from_str(&mut cfg, "crit_cap", "lots").unwrap_err();
    assert!(format!("{err}").contains("expected a number"));
    let err = store::set_from_str(&mut cfg, "sms_cd", "1.5").unwrap_err();
    assert!(format!("{err}").contains("expected milliseconds"));
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nvs.toml");
    let mut cfg = Config::default();
    cfg.gas.model = PpmModel::Ratio;
    cfg.thresholds.reset_below = 70.0;
    {
        let mut cs = ConfigStore::new(FileKvStore::open_path(&path).unwrap());
        cs.save(&cfg).unwrap();
    }
    let mut cs = ConfigStore::new(FileKvStore::open_path(&path).unwrap());
    let loaded = cs.load(&Config::default()).unwrap();
    assert_eq!(loaded.gas.model, PpmModel::Ratio);
    assert_eq!(loaded.gas.coefficients(), (116.6, 2.77));
    assert_eq!(loaded.thresholds.reset_below, 70.0);
}
