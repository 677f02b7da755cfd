use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("ultrasonic echo timeout")]
    EchoTimeout,
    #[error("uart error: {0}")]
    Uart(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("device not present: {0}")]
    NoDevice(String),
    #[error("key/value store: {0}")]
    Store(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
