use anyhow::Context;
use embedded_hal::blocking::i2c::WriteRead;
use esp_idf_hal::{
    delay::TickType,
    gpio::{InputPin, OutputPin},
    i2c::{I2c, I2cConfig, I2cDriver},
    peripheral::Peripheral,
    prelude::*,
};
use esp_idf_sys::{EspError, TickType_t};
use std::time::Duration;

pub type Sensor = apc1::Apc1<TimedI2c>;

/// Upper bound on a single register read, so that a wedged bus turns into an
/// error rather than a hung request.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(100);

/// An I2C driver whose transactions time out.
pub struct TimedI2c {
    driver: I2cDriver<'static>,
    timeout: TickType_t,
}

pub fn bringup<I: I2c>(
    i2c: impl Peripheral<P = I> + 'static,
    sda: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
    scl: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
    address: u8,
) -> anyhow::Result<Sensor> {
    // the APC1 only supports standard mode (100 kHz).
    let config = I2cConfig::new().baudrate(100u32.kHz().into());
    let driver = I2cDriver::new(i2c, sda, scl, &config).context("constructing I2C driver")?;
    log::info!("APC1 on I2C address {address:#04x}");
    Ok(apc1::Apc1::with_address(
        TimedI2c::new(driver, TRANSACTION_TIMEOUT),
        address,
    ))
}

// === impl TimedI2c ===

impl TimedI2c {
    pub fn new(driver: I2cDriver<'static>, timeout: Duration) -> Self {
        Self {
            driver,
            timeout: TickType::from(timeout).ticks(),
        }
    }
}

impl WriteRead for TimedI2c {
    type Error = EspError;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), EspError> {
        self.driver.write_read(address, bytes, buffer, self.timeout)
    }
}
