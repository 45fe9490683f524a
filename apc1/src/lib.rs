// register map from the ScioSense APC1 datasheet (I2C interface section).
// every measurement lives at a fixed offset and is read as a big-endian
// unsigned integer, then multiplied by a per-register scale.
use core::fmt;
use embedded_hal::blocking::i2c;

/// The APC1's default 7-bit I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x12;

/// The APC1 register map.
///
/// This is the order in which [`Apc1::read_all`] and [`Apc1::read_each`]
/// read the sensor.
pub static REGISTERS: [Register; 10] = [
    Register::new("PM1.0", 0x04, Width::Two, 1.0, "ug/m3", "PM1.0 Mass Concentration"),
    Register::new("PM2.5", 0x06, Width::Two, 1.0, "ug/m3", "PM2.5 Mass Concentration"),
    Register::new("PM10", 0x08, Width::Two, 1.0, "ug/m3", "PM10 Mass Concentration"),
    Register::new("TVOC", 0x1C, Width::Two, 1.0, "ppb", "TVOC output"),
    Register::new("eCO2", 0x1E, Width::Two, 1.0, "ppm", "Output in ppm CO2 equivalents"),
    Register::new("T-comp", 0x22, Width::Two, 0.1, "C", "Compensated Temperature"),
    Register::new("RH-comp", 0x24, Width::Two, 0.1, "%", "Compensated Relative Humidity"),
    Register::new("T-raw", 0x26, Width::Two, 0.1, "C", "Raw Temperature"),
    Register::new("RH-raw", 0x28, Width::Two, 0.1, "%", "Raw Relative Humidity"),
    Register::new("AQI", 0x3A, Width::One, 1.0, "", "AQI according to TVOC value"),
];

#[derive(Debug)]
pub struct Apc1<I> {
    i2c: I,
    address: u8,
}

/// Describes one measurement register on the sensor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Register {
    pub name: &'static str,
    /// Register offset on the device.
    pub address: u8,
    pub width: Width,
    /// Multiplier from the raw integer to `unit`.
    pub scale: f32,
    pub unit: &'static str,
    pub description: &'static str,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Width {
    One = 1,
    Two = 2,
}

/// A decoded measurement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub value: f32,
    pub unit: &'static str,
    pub description: &'static str,
}

/// Readings for a set of registers, in register-map order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Readings {
    readings: Vec<Reading>,
}

/// The result of reading every register independently.
#[derive(Debug)]
pub struct Survey<E> {
    pub readings: Readings,
    pub failures: Vec<(&'static Register, Error<E>)>,
}

#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
    UnknownRegister(UnknownRegister),
    ShortRead(ShortRead),
}

/// A register name that isn't in [`REGISTERS`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownRegister {
    pub name: String,
}

/// The number of bytes read didn't match the register's width.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ShortRead {
    pub register: &'static str,
    pub expected: usize,
    pub actual: usize,
}

/// Looks up a register descriptor by name.
pub fn lookup(name: &str) -> Result<&'static Register, UnknownRegister> {
    REGISTERS
        .iter()
        .find(|register| register.name == name)
        .ok_or_else(|| UnknownRegister {
            name: name.to_owned(),
        })
}

// === impl Apc1 ===

impl<I> Apc1<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn registers(&self) -> &'static [Register] {
        &REGISTERS[..]
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I, E> Apc1<I>
where
    I: i2c::WriteRead<Error = E>,
{
    /// Reads `register.width` raw bytes from the register into `buf`, returning
    /// the filled part of the buffer.
    pub fn read_raw<'buf>(
        &mut self,
        register: &Register,
        buf: &'buf mut [u8; 2],
    ) -> Result<&'buf [u8], Error<E>> {
        let buf = &mut buf[..register.width.len()];
        self.i2c
            .write_read(self.address, &[register.address], buf)
            .map_err(Error::I2c)?;
        Ok(&*buf)
    }

    pub fn read(&mut self, register: &Register) -> Result<Reading, Error<E>> {
        let mut buf = [0; 2];
        let raw = self.read_raw(register, &mut buf)?;
        Ok(register.decode(raw)?)
    }

    pub fn read_register(&mut self, name: &str) -> Result<Reading, Error<E>> {
        let register = lookup(name)?;
        self.read(register)
    }

    /// Reads every register, giving up at the first one that fails.
    pub fn read_all(&mut self) -> Result<Readings, Error<E>> {
        let mut readings = Readings::with_capacity(REGISTERS.len());
        for register in &REGISTERS {
            readings.push(self.read(register)?);
        }
        Ok(readings)
    }

    /// Reads every register, carrying on past registers that fail.
    pub fn read_each(&mut self) -> Survey<E> {
        let mut survey = Survey {
            readings: Readings::with_capacity(REGISTERS.len()),
            failures: Vec::new(),
        };
        for register in &REGISTERS {
            match self.read(register) {
                Ok(reading) => survey.readings.push(reading),
                Err(error) => survey.failures.push((register, error)),
            }
        }
        survey
    }
}

// === impl Register ===

impl Register {
    pub const fn new(
        name: &'static str,
        address: u8,
        width: Width,
        scale: f32,
        unit: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            address,
            width,
            scale,
            unit,
            description,
        }
    }

    /// Decodes the raw big-endian bytes read from this register.
    pub fn decode(&self, raw: &[u8]) -> Result<Reading, ShortRead> {
        if raw.len() != self.width.len() {
            return Err(ShortRead {
                register: self.name,
                expected: self.width.len(),
                actual: raw.len(),
            });
        }

        let raw = raw
            .iter()
            .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));
        Ok(Reading {
            name: self.name,
            value: raw as f32 * self.scale,
            unit: self.unit,
            description: self.description,
        })
    }
}

// === impl Width ===

impl Width {
    pub const fn len(self) -> usize {
        self as usize
    }
}

// === impl Readings ===

impl Readings {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            readings: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    pub fn get(&self, name: &str) -> Option<&Reading> {
        self.readings.iter().find(|reading| reading.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl<'a> IntoIterator for &'a Readings {
    type Item = &'a Reading;
    type IntoIter = core::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

impl fmt::Display for Readings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reading in self {
            writeln!(f, "{reading}")?;
        }
        Ok(())
    }
}

// === impl Reading ===

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            name,
            value,
            unit,
            description,
        } = self;
        write!(f, "{name}: {value:.1} {unit} - {description}")
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{Reading, Readings};
    use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

    /// Serialized as a map of register names to `{ value, unit, description }`.
    impl Serialize for Readings {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(self.len()))?;
            for reading in self {
                map.serialize_entry(reading.name, &Entry(reading))?;
            }
            map.end()
        }
    }

    struct Entry<'a>(&'a Reading);

    impl Serialize for Entry<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut entry = serializer.serialize_struct("Reading", 3)?;
            entry.serialize_field("value", &self.0.value)?;
            entry.serialize_field("unit", self.0.unit)?;
            entry.serialize_field("description", self.0.description)?;
            entry.end()
        }
    }
}

// === impl Error ===

impl<E> From<UnknownRegister> for Error<E> {
    fn from(error: UnknownRegister) -> Self {
        Self::UnknownRegister(error)
    }
}

impl<E> From<ShortRead> for Error<E> {
    fn from(error: ShortRead) -> Self {
        Self::ShortRead(error)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(error) => write!(f, "I2C error: {error:?}"),
            Self::UnknownRegister(error) => fmt::Display::fmt(error, f),
            Self::ShortRead(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for Error<E> {}

impl fmt::Display for UnknownRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "register '{}' not found", self.name)
    }
}

impl std::error::Error for UnknownRegister {}

impl fmt::Display for ShortRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            register,
            expected,
            actual,
        } = self;
        write!(
            f,
            "{register}: expected {expected} bytes of data, but got {actual}"
        )
    }
}

impl std::error::Error for ShortRead {}
