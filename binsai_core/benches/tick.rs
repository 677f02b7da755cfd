use std::hint::black_box;
use std::sync::Arc;

use binsai_config::Config;
use binsai_core::supervisor::{Peripherals, Supervisor};
use binsai_core::{classify, filter::RollingMean};
use binsai_hardware::NmeaParser;
use binsai_hardware::sim::{
    SimCloud, SimDisplay, SimGasAdc, SimGps, SimModem, SimPin, SimUltrasonic, SimWifi,
};
use binsai_traits::ManualClock;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

fn rig() -> Supervisor {
    let mut cfg = Config::default();
    cfg.device.device_id = "BINSAI-BENCH".into();
    cfg.timing.skip_boot_calibration = true;
    cfg.sms.phone_numbers = vec!["+6281234567".into()];
    let gps = SimGps::new(5);
    gps.set_fix(-6.2, 106.8, 8, 0.9);
    let hw = Peripherals {
        ultrasonic: Box::new(SimUltrasonic::new(20.0)),
        gas_adc: Box::new(SimGasAdc::new(61)),
        gsm: Box::new(SimModem::new()),
        modem_power: Box::new(SimPin::default()),
        gps_uart: Box::new(gps),
        gps_parser: Box::new(NmeaParser::new()),
        display: Some(Box::new(SimDisplay::new(true))),
        buzzer: Box::new(SimPin::default()),
        wifi: Box::new(SimWifi::new([0; 6])),
        cloud: Box::new(SimCloud::new()),
        debug: Box::new(std::io::sink()),
    };
    let mut sup = Supervisor::builder()
        .config(cfg)
        .peripherals(hw)
        .clock(Arc::new(ManualClock::new()))
        .try_build()
        .expect("bench rig");
    sup.bring_up().expect("bring-up");
    sup
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("supervisor_tick_idle", |b| {
        b.iter_batched_ref(
            rig,
            |sup| {
                // one sensor period worth of idle ticks
                sup.run_ticks(200);
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_and_filter", |b| {
        let mut f = RollingMean::<10>::new();
        let mut x = 0.0f32;
        b.iter(|| {
            x = (x + 7.3) % 100.0;
            let fill = f.push(Some(x)).unwrap_or(0.0);
            black_box(classify(black_box(fill), black_box(x * 20.0)))
        });
    });
}

criterion_group!(benches, bench_tick, bench_classify);
criterion_main!(benches);
