#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core bin-monitor logic (hardware-agnostic).
//!
//! All devices are reached through the `binsai_traits` seams, so the same
//! pipeline runs against Raspberry Pi drivers, the simulators and test doubles.
//!
//! ## Architecture
//!
//! - **Scheduling**: millisecond time base and periodic tasks (`schedule`)
//! - **Sensors**: ultrasonic distance, gas burst sampling, GPS validity (`sensors`)
//! - **Filtering & calibration**: rolling means, ADC→PPM, boot R₀ routine
//! - **Classification**: capacity and waste class lookup tables (`classify`)
//! - **Alerts**: edge-triggered engine with cooldown and rearm (`alert`)
//! - **SMS**: non-blocking batch dialog over the modem UART (`sms`, `modem`)
//! - **Telemetry**: cloud link supervision and channel publishing (`telemetry`)
//! - **Display & buzzer**: rotating screens, notifications, beeps
//! - **Supervisor**: bring-up and the cooperative tick loop (`supervisor`)
//!
//! Nothing past bring-up is fatal: faults land in [`health::Health`].

pub mod alert;
pub mod buzzer;
pub mod calibration;
pub mod classify;
pub mod display;
pub mod error;
pub mod filter;
pub mod health;
pub mod hw_error;
pub mod modem;
pub mod schedule;
pub mod sensors;
pub mod sms;
pub mod supervisor;
pub mod telemetry;
pub mod types;
pub mod util;

pub use alert::{AlertDecision, AlertEngine, AlertKind};
pub use classify::{Capacity, Classification, WasteClass, classify, fill_percent};
pub use error::{BinsaiError, Result};
pub use health::Health;
pub use schedule::{SharedClock, Ticker};
pub use sms::{DialogState, SmsDialog};
pub use supervisor::{Peripherals, Supervisor, SupervisorBuilder};
pub use types::{GeoFix, SensorSnapshot};
