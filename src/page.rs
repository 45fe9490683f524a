use apc1::{Readings, Register, REGISTERS};
use std::fmt::Write;

/// The credential entry form served in access point mode.
pub const SETUP_FORM: &str = include_str!("./http/setup.html");
/// Sent back once submitted credentials have been saved.
pub const SAVED: &str = include_str!("./http/saved.html");

/// Renders the sensor page, one row per register in table order.
///
/// Registers in `failed` get a row saying so rather than a value.
pub fn sensors<'a>(
    readings: &Readings,
    failed: impl IntoIterator<Item = &'a Register>,
) -> String {
    let failed: Vec<&str> = failed.into_iter().map(|register| register.name).collect();
    let mut rows = String::new();
    for register in &REGISTERS {
        // writing to a `String` can't fail
        let _ = if let Some(reading) = readings.get(register.name) {
            writeln!(
                &mut rows,
                "<tr><td>{name}</td><td class=\"value\">{value:.1}</td><td>{unit}</td><td>{description}</td></tr>",
                name = reading.name,
                value = reading.value,
                unit = reading.unit,
                description = reading.description,
            )
        } else if failed.contains(&register.name) {
            writeln!(
                &mut rows,
                "<tr class=\"unavailable\"><td>{name}</td><td class=\"value\">unavailable</td><td></td><td>{description}</td></tr>",
                name = register.name,
                description = register.description,
            )
        } else {
            continue;
        };
    }
    format!(include_str!("./http/sensors.html"), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apc1::Apc1;
    use embedded_hal::blocking::i2c::WriteRead;

    /// Every register reads as `0x00E6`; AQI reads `0x02`. Registers in
    /// `broken` fail.
    struct Bus {
        broken: &'static [u8],
    }

    impl WriteRead for Bus {
        type Error = ();

        fn write_read(&mut self, _: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), ()> {
            if self.broken.contains(&bytes[0]) {
                return Err(());
            }
            match buffer {
                [aqi] => *aqi = 2,
                [hi, lo] => {
                    *hi = 0x00;
                    *lo = 0xE6;
                }
                _ => unreachable!(),
            }
            Ok(())
        }
    }

    #[test]
    fn renders_every_reading() {
        let readings = Apc1::new(Bus { broken: &[] }).read_all().unwrap();
        let page = sensors(&readings, []);

        for register in &REGISTERS {
            assert!(page.contains(register.description), "{}", register.name);
        }
        assert!(page.contains("<td>T-comp</td><td class=\"value\">23.0</td><td>C</td>"));
        assert!(page.contains("<td>PM2.5</td><td class=\"value\">230.0</td><td>ug/m3</td>"));
        assert!(page.contains("<td>AQI</td><td class=\"value\">2.0</td>"));
        assert!(!page.contains("unavailable</td>"));
    }

    #[test]
    fn failed_registers_have_no_value() {
        let survey = Apc1::new(Bus { broken: &[0x22] }).read_each();
        let page = sensors(
            &survey.readings,
            survey.failures.iter().map(|(register, _)| *register),
        );

        assert!(page.contains(
            "<td>T-comp</td><td class=\"value\">unavailable</td><td></td><td>Compensated Temperature</td>"
        ));
        assert!(!page.contains("<td>T-comp</td><td class=\"value\">23.0"));
        assert!(page.contains("<td>T-raw</td><td class=\"value\">23.0</td>"));
    }

    #[test]
    fn failed_rows_stay_in_table_order() {
        let survey = Apc1::new(Bus { broken: &[0x22] }).read_each();
        let page = sensors(
            &survey.readings,
            survey.failures.iter().map(|(register, _)| *register),
        );

        let positions: Vec<usize> = REGISTERS
            .iter()
            .map(|register| {
                page.find(&format!("<td>{}</td>", register.name))
                    .unwrap_or_else(|| panic!("no row for {}", register.name))
            })
            .collect();
        assert!(
            positions.windows(2).all(|pair| pair[0] < pair[1]),
            "rows out of order: {positions:?}"
        );
    }

    #[test]
    fn setup_form_posts_credentials() {
        assert!(SETUP_FORM.contains(r#"action="/submit""#));
        assert!(SETUP_FORM.contains(r#"name="ssid""#));
        assert!(SETUP_FORM.contains(r#"name="password""#));
    }
}
