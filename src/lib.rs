//! Firmware for an ESP32 air-quality station built around a ScioSense APC1
//! sensor.
//!
//! On boot the station joins the WiFi network it was last configured for and
//! serves the sensor's readings over HTTP. If it can't, it opens an access
//! point named [`config::DEFAULT_AP_SSID`] with a form for entering new WiFi
//! credentials, saves them, and reboots.
pub mod config;
pub mod logger;
pub mod page;
pub mod wifi;

#[cfg(target_os = "espidf")]
pub mod http;
#[cfg(target_os = "espidf")]
pub mod net;
#[cfg(target_os = "espidf")]
pub mod sensor;
