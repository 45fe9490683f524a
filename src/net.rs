use crate::{config::Credentials, wifi::Station};
use anyhow::Context;
use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::{modem::Modem, peripheral::Peripheral};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    wifi::{EspWifi, WifiWait},
};
use std::time::Duration;

pub struct AqiWifi {
    wifi: Box<EspWifi<'static>>,
    sysloop: EspSystemEventLoop,
    wait_timeout: Duration,
}

impl AqiWifi {
    pub fn new(
        modem: impl Peripheral<P = Modem> + 'static,
        sysloop: &EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        log::info!("bringing up WiFi...");
        let wifi = Box::new(
            EspWifi::new(modem, sysloop.clone(), Some(nvs)).context("failed to create WiFi driver")?,
        );
        Ok(Self {
            wifi,
            sysloop: sysloop.clone(),
            wait_timeout: Duration::from_secs(20),
        })
    }

    /// Brings up an open access point called `ssid`.
    pub fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<()> {
        // start from scratch, in case the station interface is still up.
        if self.wifi.is_started().unwrap_or_default() {
            self.wifi.stop().context("failed to stop WiFi")?;
        }

        let config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: ssid
                .parse()
                .map_err(|_| anyhow::anyhow!("access point SSID too long"))?,
            auth_method: AuthMethod::None,
            channel: 1,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .context("failed to set access point configuration")?;
        self.start()?;

        let ip_info = self
            .wifi
            .ap_netif()
            .get_ip_info()
            .context("failed to get access point IP info")?;
        log::info!("access point started; connect to {ssid:?} and visit http://{}/", ip_info.ip);
        Ok(())
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.wifi.start().context("failed to start WiFi")?;

        log::debug!("Waiting for wifi to start ({:?})...", self.wait_timeout);
        let started = WifiWait::new(&self.sysloop)
            .context("failed to create wifi wait")?
            .wait_with_timeout(self.wait_timeout, || {
                self.wifi.is_started().unwrap_or_default()
            });
        anyhow::ensure!(started, "WiFi did not start within {:?}", self.wait_timeout);
        Ok(())
    }
}

// === impl Station ===

impl Station for AqiWifi {
    fn is_connected(&mut self) -> anyhow::Result<bool> {
        if !self.wifi.is_connected().context("failed to check WiFi status")? {
            return Ok(false);
        }

        // associated, but not much use until DHCP has given us an address.
        let ip_info = self
            .wifi
            .sta_netif()
            .get_ip_info()
            .context("failed to get station IP info")?;
        if ip_info.ip.is_unspecified() {
            return Ok(false);
        }

        log::info!("WiFi DHCP info: {ip_info:?}");
        Ok(true)
    }

    fn connect(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .parse()
                .map_err(|_| anyhow::anyhow!("ssid too long"))?,
            password: credentials
                .password
                .parse()
                .map_err(|_| anyhow::anyhow!("password too long"))?,
            auth_method: if credentials.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .context("failed to set WiFi configuration")?;
        if !self.wifi.is_started().unwrap_or_default() {
            self.start()?;
        }

        self.wifi
            .connect()
            .context("failed to start connecting to WiFi network")
    }

    fn deactivate(&mut self) -> anyhow::Result<()> {
        self.wifi.stop().context("failed to stop WiFi")
    }
}
