//! WiFi bringup.
//!
//! On boot, the station tries to join the network whose credentials were saved
//! last time. If there are no saved credentials, or the network can't be
//! joined within the attempt budget, we fall back to access point mode so that
//! new credentials can be entered. There is no way back from access point mode
//! other than a reboot.
use crate::config::{CredentialStore, Credentials};
use embedded_hal::blocking::delay::DelayMs;
use std::fmt;

/// A WiFi interface that can join a network as a station.
pub trait Station {
    fn is_connected(&mut self) -> anyhow::Result<bool>;

    /// Starts associating with the network described by `credentials`. This
    /// need not wait for the association to complete.
    fn connect(&mut self, credentials: &Credentials) -> anyhow::Result<()>;

    /// Shuts the station interface down.
    fn deactivate(&mut self) -> anyhow::Result<()>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    /// Trying to join the network with the stored credentials.
    TryStored,
    /// Joined; serve the sensor page.
    Connected,
    /// Serving the credential form on our own access point.
    ApMode,
}

#[derive(Debug)]
pub enum Association {
    Connected,
    Failed(WifiConnectionError),
}

#[derive(Debug)]
pub enum WifiConnectionError {
    /// There were no credentials to connect with.
    NoCredentials,
    /// Still not connected after polling `attempts` times.
    Timeout { attempts: u32 },
    /// The WiFi driver returned an error.
    Driver(anyhow::Error),
}

#[derive(Copy, Clone, Debug)]
pub struct Bootstrap {
    max_attempts: u32,
    poll_interval_ms: u32,
}

// === impl Bootstrap ===

impl Bootstrap {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_POLL_INTERVAL_MS: u32 = 1000;

    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub const fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    pub const fn with_poll_interval_ms(self, poll_interval_ms: u32) -> Self {
        Self {
            poll_interval_ms,
            ..self
        }
    }

    /// Runs the bootstrap from [`State::TryStored`] until it settles in either
    /// [`State::Connected`] or [`State::ApMode`].
    pub fn run(
        &self,
        station: &mut impl Station,
        store: &mut impl CredentialStore,
        delay: &mut impl DelayMs<u32>,
    ) -> State {
        let mut state = State::TryStored;
        loop {
            log::debug!("WiFi bootstrap: {state:?}");
            state = match state {
                State::TryStored => match self.try_stored(station, store, delay) {
                    Association::Connected => State::Connected,
                    Association::Failed(error) => {
                        log::warn!("{error}; switching to access point mode");
                        State::ApMode
                    }
                },
                done => return done,
            };
        }
    }

    fn try_stored(
        &self,
        station: &mut impl Station,
        store: &mut impl CredentialStore,
        delay: &mut impl DelayMs<u32>,
    ) -> Association {
        let credentials = match store.load() {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return Association::Failed(WifiConnectionError::NoCredentials),
            Err(error) => {
                log::warn!("failed to load stored WiFi credentials: {error:#}");
                return Association::Failed(WifiConnectionError::NoCredentials);
            }
        };
        self.associate(station, &credentials, delay)
    }

    /// Joins the network described by `credentials`, polling the connection
    /// status once every poll interval.
    pub fn associate(
        &self,
        station: &mut impl Station,
        credentials: &Credentials,
        delay: &mut impl DelayMs<u32>,
    ) -> Association {
        match self.poll_connect(station, credentials, delay) {
            Ok(()) => {
                log::info!("connected to WiFi network {:?}", credentials.ssid);
                Association::Connected
            }
            Err(error) => {
                if let Err(error) = station.deactivate() {
                    log::warn!("failed to deactivate WiFi station: {error:#}");
                }
                Association::Failed(error)
            }
        }
    }

    fn poll_connect(
        &self,
        station: &mut impl Station,
        credentials: &Credentials,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<(), WifiConnectionError> {
        if station.is_connected()? {
            return Ok(());
        }

        log::info!("connecting to WiFi network {:?}...", credentials.ssid);
        station.connect(credentials)?;

        let mut attempts = 0;
        while !station.is_connected()? {
            delay.delay_ms(self.poll_interval_ms);
            attempts += 1;
            log::debug!("still connecting ({attempts}/{})", self.max_attempts);
            if attempts >= self.max_attempts {
                return Err(WifiConnectionError::Timeout { attempts });
            }
        }

        Ok(())
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

// === impl WifiConnectionError ===

impl From<anyhow::Error> for WifiConnectionError {
    fn from(error: anyhow::Error) -> Self {
        Self::Driver(error)
    }
}

impl fmt::Display for WifiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => f.write_str("no WiFi credentials are configured"),
            Self::Timeout { attempts } => {
                write!(f, "unable to connect to WiFi after {attempts} attempts")
            }
            Self::Driver(error) => write!(f, "WiFi driver error: {error:#}"),
        }
    }
}

impl std::error::Error for WifiConnectionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, tests::MemoryStore};

    /// A station that connects after a set number of status polls.
    #[derive(Debug, Default)]
    struct FakeStation {
        /// `None` never connects.
        connects_after: Option<u32>,
        polls: u32,
        joined: Vec<Credentials>,
        deactivated: bool,
        already_connected: bool,
    }

    impl Station for FakeStation {
        fn is_connected(&mut self) -> anyhow::Result<bool> {
            if self.already_connected {
                return Ok(true);
            }
            if self.joined.is_empty() {
                return Ok(false);
            }
            self.polls += 1;
            Ok(self
                .connects_after
                .map(|after| self.polls > after)
                .unwrap_or(false))
        }

        fn connect(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
            self.joined.push(credentials.clone());
            Ok(())
        }

        fn deactivate(&mut self) -> anyhow::Result<()> {
            self.deactivated = true;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeDelay {
        delays: Vec<u32>,
    }

    impl DelayMs<u32> for FakeDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.delays.push(ms);
        }
    }

    fn store_with(ssid: &str, password: &str) -> MemoryStore {
        let mut store = MemoryStore::default();
        store
            .store(&Credentials {
                ssid: ssid.into(),
                password: password.into(),
            })
            .unwrap();
        store
    }

    #[test]
    fn connects_with_stored_credentials() {
        let mut station = FakeStation {
            connects_after: Some(3),
            ..Default::default()
        };
        let mut store = store_with("home", "hunter2");
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::Connected);
        assert_eq!(station.joined.len(), 1);
        assert_eq!(station.joined[0].ssid, "home");
        assert_eq!(station.joined[0].password, "hunter2");
        assert_eq!(delay.delays, [1000, 1000, 1000]);
        assert!(!station.deactivated);
    }

    #[test]
    fn already_connected_skips_association() {
        let mut station = FakeStation {
            already_connected: true,
            ..Default::default()
        };
        let mut store = store_with("home", "hunter2");
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::Connected);
        assert!(station.joined.is_empty());
        assert!(delay.delays.is_empty());
    }

    #[test]
    fn gives_up_after_ten_polls() {
        let mut station = FakeStation::default();
        let creds = Credentials {
            ssid: "nowhere".into(),
            password: String::new(),
        };
        let mut delay = FakeDelay::default();

        let association = Bootstrap::new().associate(&mut station, &creds, &mut delay);

        assert!(matches!(
            association,
            Association::Failed(WifiConnectionError::Timeout { attempts: 10 })
        ));
        assert_eq!(delay.delays, [1000; 10]);
        assert_eq!(station.joined.len(), 1);
        assert!(station.deactivated);
    }

    #[test]
    fn attempt_budget_is_configurable() {
        let mut station = FakeStation::default();
        let mut store = store_with("nowhere", "");
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new()
            .with_max_attempts(3)
            .with_poll_interval_ms(250)
            .run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::ApMode);
        assert_eq!(delay.delays, [250, 250, 250]);
    }

    #[test]
    fn budget_runs_out_before_a_late_connection() {
        // would be connected if the status were checked after the tenth delay
        let mut station = FakeStation {
            connects_after: Some(10),
            ..Default::default()
        };
        let mut store = store_with("slow", "");
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::ApMode);
        assert_eq!(delay.delays.len(), 10);
    }

    #[test]
    fn no_credentials_goes_to_ap_mode() {
        let mut station = FakeStation::default();
        let mut store = MemoryStore::default();
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::ApMode);
        assert!(station.joined.is_empty());
        assert!(delay.delays.is_empty());
    }

    #[test]
    fn corrupt_credentials_go_to_ap_mode() {
        let mut station = FakeStation::default();
        let mut store = MemoryStore {
            text: Some("password=only".into()),
        };
        let mut delay = FakeDelay::default();

        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);

        assert_eq!(state, State::ApMode);
        assert!(station.joined.is_empty());
    }

    #[test]
    fn submitted_credentials_are_used_after_restart() {
        let mut store = store_with("old", "stale");
        let mut delay = FakeDelay::default();

        // first boot: the old network is gone.
        let mut station = FakeStation::default();
        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);
        assert_eq!(state, State::ApMode);

        config::submit(&mut store, b"ssid=new+network&password=fresh").unwrap();

        // "reboot": a fresh station and a fresh bootstrap, same storage.
        let mut station = FakeStation {
            connects_after: Some(1),
            ..Default::default()
        };
        let state = Bootstrap::new().run(&mut station, &mut store, &mut delay);
        assert_eq!(state, State::Connected);
        assert_eq!(
            station.joined,
            [Credentials {
                ssid: "new network".into(),
                password: "fresh".into(),
            }]
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            WifiConnectionError::Timeout { attempts: 10 }.to_string(),
            "unable to connect to WiFi after 10 attempts"
        );
        assert_eq!(
            WifiConnectionError::NoCredentials.to_string(),
            "no WiFi credentials are configured"
        );
    }
}
