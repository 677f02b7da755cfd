//! Raspberry Pi bindings (rppal): HC-SR04 on GPIO, MCP3008 on SPI0, UARTs,
//! HD44780 LCD behind a PCF8574 I²C backpack.
use std::thread::sleep;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin as RpOutputPin};
use rppal::i2c::I2c;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use rppal::uart::{Parity, Uart};
use tracing::{debug, trace};

use binsai_traits::{AnalogIn, BoxError, CharDisplay, OutputPin, SerialPort, Ultrasonic};

use crate::error::{HwError, Result};
use crate::util::measure_high_pulse_us;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

pub struct PiUltrasonic {
    trig_pin: u8,
    echo_pin: u8,
    pins: Option<(RpOutputPin, InputPin)>,
}

impl PiUltrasonic {
    pub fn new(trig_pin: u8, echo_pin: u8) -> Result<Self> {
        Ok(Self {
            trig_pin,
            echo_pin,
            pins: Some(Self::acquire(trig_pin, echo_pin)?),
        })
    }

    fn acquire(trig_pin: u8, echo_pin: u8) -> Result<(RpOutputPin, InputPin)> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut trig = gpio.get(trig_pin).map_err(gpio_err)?.into_output();
        trig.set_low();
        let echo = gpio.get(echo_pin).map_err(gpio_err)?.into_input();
        Ok((trig, echo))
    }
}

#[inline]
fn spin_us(us: u64) {
    let until = std::time::Instant::now() + Duration::from_micros(us);
    while std::time::Instant::now() < until {
        std::hint::spin_loop();
    }
}

impl Ultrasonic for PiUltrasonic {
    fn echo_width_us(&mut self, timeout: Duration) -> std::result::Result<u32, BoxError> {
        let Some((trig, echo)) = self.pins.as_mut() else {
            return Err(Box::new(HwError::Gpio("ultrasonic pins not acquired".into())));
        };
        trig.set_low();
        spin_us(2);
        trig.set_high();
        spin_us(10);
        trig.set_low();
        match measure_high_pulse_us(|| echo.is_high(), timeout) {
            Ok(us) => {
                trace!(width_us = us, "echo");
                Ok(us)
            }
            Err(HwError::EchoTimeout) => Ok(0),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn reinit(&mut self) -> std::result::Result<(), BoxError> {
        // Release the old handles first; rppal refuses pins that are still held.
        self.pins = None;
        self.pins = Some(Self::acquire(self.trig_pin, self.echo_pin)?);
        debug!(trig = self.trig_pin, echo = self.echo_pin, "ultrasonic pins re-initialised");
        Ok(())
    }
}

/// MCP3008 10-bit ADC, single-ended channel.
pub struct Mcp3008 {
    spi: Spi,
    channel: u8,
}

impl Mcp3008 {
    pub fn new(channel: u8) -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self {
            spi,
            channel: channel & 0x07,
        })
    }
}

impl AnalogIn for Mcp3008 {
    fn read_raw(&mut self) -> std::result::Result<u16, BoxError> {
        let tx = [0x01, 0x80 | (self.channel << 4), 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok((u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]))
    }

    fn full_scale(&self) -> u16 {
        1023
    }
}

/// Non-blocking UART.
pub struct PiUart(Uart);

impl PiUart {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1)
            .map_err(|e| HwError::Uart(format!("{path}: {e}")))?;
        uart.set_read_mode(0, Duration::ZERO)
            .map_err(|e| HwError::Uart(e.to_string()))?;
        Ok(Self(uart))
    }
}

impl SerialPort for PiUart {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let mut off = 0;
        while off < bytes.len() {
            off += self
                .0
                .write(&bytes[off..])
                .map_err(|e| HwError::Uart(e.to_string()))?;
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> std::result::Result<usize, BoxError> {
        Ok(self.0.read(buf).map_err(|e| HwError::Uart(e.to_string()))?)
    }
}

pub struct PiPin(RpOutputPin);

impl PiPin {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut out = gpio.get(pin).map_err(gpio_err)?.into_output();
        out.set_low();
        Ok(Self(out))
    }
}

impl OutputPin for PiPin {
    fn set_high(&mut self) -> std::result::Result<(), BoxError> {
        self.0.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> std::result::Result<(), BoxError> {
        self.0.set_low();
        Ok(())
    }
}

const LCD_RS: u8 = 0x01;
const LCD_EN: u8 = 0x04;
const LCD_BACKLIGHT: u8 = 0x08;

/// 16x2 HD44780 in 4-bit mode behind a PCF8574.
pub struct Pcf8574Lcd {
    i2c: I2c,
    ready: bool,
}

impl Pcf8574Lcd {
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(addr)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self { i2c, ready: false })
    }

    fn expander(&mut self, byte: u8) -> Result<()> {
        self.i2c
            .write(&[byte | LCD_BACKLIGHT])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }

    fn nibble(&mut self, nib: u8, rs: u8) -> Result<()> {
        let b = (nib << 4) | rs;
        self.expander(b | LCD_EN)?;
        spin_us(1);
        self.expander(b)?;
        spin_us(50);
        Ok(())
    }

    fn send(&mut self, byte: u8, rs: u8) -> Result<()> {
        self.nibble(byte >> 4, rs)?;
        self.nibble(byte & 0x0F, rs)
    }

    fn init(&mut self) -> Result<()> {
        sleep(Duration::from_millis(50));
        for _ in 0..3 {
            self.nibble(0x03, 0)?;
            sleep(Duration::from_millis(5));
        }
        self.nibble(0x02, 0)?;
        for cmd in [0x28, 0x0C, 0x01, 0x06] {
            self.send(cmd, 0)?;
        }
        sleep(Duration::from_millis(2));
        self.ready = true;
        Ok(())
    }
}

impl CharDisplay for Pcf8574Lcd {
    fn probe(&mut self) -> bool {
        if self.expander(0).is_err() {
            return false;
        }
        self.ready || self.init().is_ok()
    }

    fn clear(&mut self) -> std::result::Result<(), BoxError> {
        self.send(0x01, 0)?;
        sleep(Duration::from_millis(2));
        Ok(())
    }

    fn write_row(&mut self, row: usize, text: &str) -> std::result::Result<(), BoxError> {
        let base = if row == 0 { 0x80 } else { 0xC0 };
        self.send(base, 0)?;
        // Pad so stale characters from a longer previous line are erased.
        let padded = format!("{text:<16.16}");
        for ch in padded.chars() {
            let code = if ch.is_ascii() { ch as u8 } else { b'?' };
            self.send(code, LCD_RS)?;
        }
        Ok(())
    }
}
