use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// SSID of the open access point used to collect WiFi credentials.
pub const DEFAULT_AP_SSID: &str = "AQISetup";
pub const HTTP_PORT: u16 = 80;

/// How long to wait after saving new credentials before rebooting.
pub const REBOOT_DELAY: Duration = Duration::from_secs(5);
/// How long to let the confirmation response drain before the AP goes away.
pub const AP_SHUTDOWN_DELAY: Duration = Duration::from_millis(100);

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
/// Longest stored text form of valid credentials: every byte of both fields
/// percent-encoded.
pub const MAX_TEXT_LEN: usize = "ssid=&password=".len() + 3 * MAX_SSID_LEN + 3 * MAX_PASSWORD_LEN;
/// Credential form bodies longer than this are refused.
pub const MAX_FORM_LEN: usize = 1024;

#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

/// Somewhere to keep WiFi credentials across reboots.
pub trait CredentialStore {
    fn load(&mut self) -> anyhow::Result<Option<Credentials>>;
    fn store(&mut self, credentials: &Credentials) -> anyhow::Result<()>;
}

/// Handles a credential form submission: parses the form body and persists the
/// credentials, replacing whatever was stored before.
pub fn submit(store: &mut impl CredentialStore, body: &[u8]) -> anyhow::Result<Credentials> {
    let credentials = Credentials::from_form(body)?;
    store
        .store(&credentials)
        .with_context(|| format!("failed to save credentials for {:?}", credentials.ssid))?;
    log::info!("saved WiFi credentials for {:?}", credentials.ssid);
    Ok(credentials)
}

/// Reads a form body to the end with `read`, which returns how many bytes it
/// put into the buffer (0 at the end of the body).
///
/// A failed read fails the whole body; a partial form is never returned.
pub fn read_form<E>(mut read: impl FnMut(&mut [u8]) -> Result<usize, E>) -> anyhow::Result<Vec<u8>>
where
    E: fmt::Debug,
{
    let mut buf = vec![0; 128];
    let mut total_bytes_read = 0;

    loop {
        let bytes_read = read(&mut buf[total_bytes_read..])
            .map_err(|error| anyhow::anyhow!("failed to read request body: {error:?}"))?;
        log::trace!("read {bytes_read} bytes");
        if bytes_read == 0 {
            break;
        }

        total_bytes_read += bytes_read;
        anyhow::ensure!(total_bytes_read <= MAX_FORM_LEN, "request body too large");
        if total_bytes_read == buf.len() {
            buf.resize(buf.len() * 2, 0);
        }
    }

    anyhow::ensure!(total_bytes_read > 0, "empty request body");
    buf.truncate(total_bytes_read);
    Ok(buf)
}

// === impl Credentials ===

impl Credentials {
    /// Credentials baked in at build time from `WIFI_SSID` and `WIFI_PASS`, if
    /// there were any.
    pub fn from_build_env() -> Option<Self> {
        let ssid = option_env!("WIFI_SSID").filter(|ssid| !ssid.is_empty())?;
        Some(Self {
            ssid: ssid.to_owned(),
            password: option_env!("WIFI_PASS").unwrap_or_default().to_owned(),
        })
    }

    /// Parses an `application/x-www-form-urlencoded` body with `ssid` and
    /// `password` fields.
    pub fn from_form(body: &[u8]) -> anyhow::Result<Self> {
        let credentials: Self =
            serde_urlencoded::from_bytes(body).context("invalid credentials form")?;
        credentials.validate()?;
        Ok(credentials)
    }

    /// Serializes the credentials to the text format kept in storage.
    pub fn to_text(&self) -> anyhow::Result<String> {
        serde_urlencoded::to_string(self).context("failed to encode credentials")
    }

    pub fn from_text(text: &[u8]) -> anyhow::Result<Self> {
        serde_urlencoded::from_bytes(text).context("stored credentials are corrupt")
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.ssid.is_empty(), "SSID must not be empty");
        anyhow::ensure!(
            self.ssid.len() <= MAX_SSID_LEN,
            "SSID is longer than {MAX_SSID_LEN} bytes"
        );
        anyhow::ensure!(
            self.password.len() <= MAX_PASSWORD_LEN,
            "password is longer than {MAX_PASSWORD_LEN} bytes"
        );
        Ok(())
    }
}

// don't put passwords in the logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &format_args!("<{} bytes>", self.password.len()))
            .finish()
    }
}

#[cfg(target_os = "espidf")]
pub use self::nvs::NvsCredentials;

#[cfg(target_os = "espidf")]
mod nvs {
    use super::{CredentialStore, Credentials, MAX_TEXT_LEN};
    use anyhow::Context;
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

    const NAMESPACE: &str = "aqi";
    const KEY: &str = "wifi";

    /// Keeps the credentials' text form in non-volatile storage.
    pub struct NvsCredentials {
        nvs: EspNvs<NvsDefault>,
    }

    impl NvsCredentials {
        pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
            let nvs = EspNvs::new(partition, NAMESPACE, true)
                .with_context(|| format!("failed to open NVS namespace {NAMESPACE:?}"))?;
            Ok(Self { nvs })
        }
    }

    impl CredentialStore for NvsCredentials {
        fn load(&mut self) -> anyhow::Result<Option<Credentials>> {
            let mut buf = [0u8; MAX_TEXT_LEN];
            let Some(text) = self
                .nvs
                .get_raw(KEY, &mut buf)
                .context("failed to read stored credentials")?
            else {
                return Ok(None);
            };
            Credentials::from_text(text).map(Some)
        }

        fn store(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
            let text = credentials.to_text()?;
            anyhow::ensure!(
                text.len() <= MAX_TEXT_LEN,
                "encoded credentials are {} bytes, more than {MAX_TEXT_LEN}",
                text.len()
            );
            self.nvs
                .set_raw(KEY, text.as_bytes())
                .context("failed to write credentials")?;
            Ok(())
        }
    }
}
