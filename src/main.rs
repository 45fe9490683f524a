#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

/// Host builds can't talk to the hardware; print the register map instead.
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    aqi_station::logger::init()?;
    log::warn!("not running on ESP-IDF; printing the APC1 register map");
    for register in &apc1::REGISTERS {
        println!(
            "{name:<8} {address:#04x} {width} byte(s) x{scale:<4} {unit:<6} {description}",
            name = register.name,
            address = register.address,
            width = register.width.len(),
            scale = register.scale,
            unit = register.unit,
            description = register.description,
        );
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
mod firmware {
    // If using the `binstart` feature of `esp-idf-sys`, always keep this module
    // imported
    use esp_idf_sys as _;

    use anyhow::Context;
    use aqi_station::{
        config::{self, CredentialStore, Credentials, NvsCredentials},
        http, net, sensor,
        wifi::{Bootstrap, State, Station},
    };
    use esp_idf_hal::{delay::FreeRtos, peripherals::Peripherals};
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop, log::EspLogger, nvs::EspDefaultNvsPartition,
    };
    use std::{thread, time::Duration};

    pub(super) fn run() -> anyhow::Result<()> {
        // It is necessary to call this function once. Otherwise, some patches to the
        // runtime implemented by esp-idf-sys might not link properly. See
        // https://github.com/esp-rs/esp-idf-template/issues/71
        esp_idf_sys::link_patches();
        EspLogger::initialize_default();

        log::info!("AQI station is go!");

        let peripherals = Peripherals::take().context("peripherals were already taken")?;
        let sysloop =
            EspSystemEventLoop::take().context("failed to initialize system event loop")?;
        let nvs =
            EspDefaultNvsPartition::take().context("failed to initialize non-volatile storage")?;

        let mut store = NvsCredentials::new(nvs.clone())?;
        seed_credentials(&mut store);

        let mut wifi = net::AqiWifi::new(peripherals.modem, &sysloop, nvs)?;
        match Bootstrap::new().run(&mut wifi, &mut store, &mut FreeRtos) {
            State::Connected => {
                let apc1 = sensor::bringup(
                    peripherals.i2c0,
                    peripherals.pins.gpio5,
                    peripherals.pins.gpio6,
                    apc1::DEFAULT_ADDRESS,
                )
                .context("bringing up APC1")?;
                let _server = http::serve_sensors(apc1)?;
                loop {
                    // don't get killed by the doggy timer
                    thread::sleep(Duration::from_secs(1));
                }
            }
            State::ApMode | State::TryStored => {
                wifi.start_access_point(config::DEFAULT_AP_SSID)
                    .context("failed to start access point")?;
                let server = http::serve_setup(store)?;

                let credentials = server
                    .saved_credentials
                    .recv()
                    .context("setup server went away")?;
                log::info!("new WiFi credentials saved for {:?}", credentials.ssid);

                // let the confirmation page make it out before the AP goes away.
                thread::sleep(config::AP_SHUTDOWN_DELAY);
                if let Err(error) = wifi.deactivate() {
                    log::warn!("failed to stop access point: {error:#}");
                }
                restart_after(config::REBOOT_DELAY);

                loop {
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }

    /// If nothing has been saved yet, start out with the credentials that were
    /// set at build time (if any).
    fn seed_credentials(store: &mut NvsCredentials) {
        match store.load() {
            Ok(Some(_)) => {}
            Ok(None) => {
                let Some(credentials) = Credentials::from_build_env() else {
                    log::info!("no WiFi credentials saved");
                    return;
                };
                log::info!("saving build-time WiFi credentials for {:?}", credentials.ssid);
                if let Err(error) = store.store(&credentials) {
                    log::warn!("failed to save build-time WiFi credentials: {error:#}");
                }
            }
            Err(error) => log::warn!("failed to load WiFi credentials: {error:#}"),
        }
    }

    fn restart_after(delay: Duration) {
        log::info!("rebooting in {delay:?}...");
        let spawned = thread::Builder::new()
            .name("restart".into())
            .spawn(move || {
                thread::sleep(delay);
                esp_idf_hal::reset::restart();
            });
        if let Err(error) = spawned {
            log::error!("failed to spawn restart thread ({error}); rebooting now");
            esp_idf_hal::reset::restart();
        }
    }
}
