use binsai_config::{Config, PpmModel, load_toml};
use rstest::rstest;

const PROVISIONING: &str = r#"
[device]
bin_height_cm = 40.0

[thresholds]
critical_fill = 90.0
critical_ppm = 800.0
reset_below = 80.0

[gas]
mq135_r0 = 12.5
model = "ratio"

[network]
wifi_ssid = "depot"
wifi_pass = "secret"
cloud_token = "tok"

[sms]
phone_numbers = ["+6281234567890", "+6289876543210"]
cooldown_ms = 300000
"#;

#[test]
fn accepts_provisioning_file() {
    let cfg = load_toml(PROVISIONING).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.gas.model, PpmModel::Ratio);
    assert_eq!(cfg.sms.phone_numbers.len(), 2);
    // untouched sections keep defaults
    assert_eq!(cfg.timing.sensor_period_ms, 2_000);
    assert_eq!(cfg.hardware.lcd_i2c_addr, 0x27);
}

#[test]
fn unknown_model_is_a_parse_error() {
    assert!(load_toml("[gas]\nmodel = \"linear\"\n").is_err());
}

#[rstest]
#[case("[device]\nbin_height_cm = 0.0", "device.bin_height_cm")]
#[case("[device]\nbin_height_cm = 500.0", "device.bin_height_cm")]
#[case("[thresholds]\ncritical_fill = 0.0", "thresholds.critical_fill")]
#[case("[thresholds]\ncritical_fill = 101.0", "thresholds.critical_fill")]
#[case("[thresholds]\ncritical_ppm = 2500.0", "thresholds.critical_ppm")]
#[case("[thresholds]\nreset_below = 95.0", "thresholds.reset_below")]
#[case("[gas]\nmq135_r0 = 0.0", "gas.mq135_r0")]
#[case("[gas]\ntemp_comp = -1.0", "gas.temp_comp")]
#[case("[gas]\ncoeff_b = 0.0", "gas.coeff_b")]
#[case("[sms]\ncooldown_ms = 90000000", "sms.cooldown_ms")]
#[case("[timing]\nsensor_period_ms = 10", "timing.sensor_period_ms")]
#[case("[timing]\nloop_yield_ms = 1", "timing.loop_yield_ms")]
#[case("[hardware]\nadc_channel = 9", "hardware.adc_channel")]
fn rejects_out_of_range_fields(#[case] toml: &str, #[case] field: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(field), "got: {err}");
}

#[test]
fn too_many_recipients_rejected() {
    let mut cfg = Config::default();
    cfg.sms.phone_numbers = (0..9).map(|i| format!("+1555000{i:04}")).collect();
    let err = cfg.validate().unwrap_err();
    assert!(format!("{err}").contains("sms.phone_numbers"));
}
