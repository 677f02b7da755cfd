use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BinsaiError {
    #[error("no ultrasonic echo")]
    SensorTimeout,
    #[error("reading out of range: {0}")]
    SensorOutOfRange(String),
    #[error("calibration unstable: stdev {stdev_pct:.1}% of mean exceeds 15%")]
    CalibrationUnstable { stdev_pct: f32 },
    #[error("modem not responding: {0}")]
    ModemNoResponse(String),
    #[error("sms to recipient {index} failed: {reason}")]
    ModemSendFailed { index: usize, reason: String },
    #[error("cloud disconnected: {0}")]
    CloudDisconnected(String),
    #[error("config key missing: {0}")]
    ConfigMissing(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("fatal hardware fault: {0}")]
    Fatal(String),
}

impl BinsaiError {
    /// Short stable name used in health output.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SensorTimeout => "SensorTimeout",
            Self::SensorOutOfRange(_) => "SensorOutOfRange",
            Self::CalibrationUnstable { .. } => "CalibrationUnstable",
            Self::ModemNoResponse(_) => "ModemNoResponse",
            Self::ModemSendFailed { .. } => "ModemSendFailed",
            Self::CloudDisconnected(_) => "CloudDisconnected",
            Self::ConfigMissing(_) => "ConfigMissing",
            Self::Hardware(_) => "Hardware",
            Self::Config(_) => "Config",
            Self::Fatal(_) => "Fatal",
        }
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
