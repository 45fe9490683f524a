use crate::{
    config::{self, CredentialStore, Credentials, HTTP_PORT},
    page,
    sensor::Sensor,
};
use anyhow::Context;
use embedded_svc::{
    http::{
        server::{Connection, HandlerResult, Request},
        Method,
    },
    io::{Read, Write},
};
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use std::sync::{mpsc, Arc, Mutex};

/// The HTTP server in station mode: serves sensor readings.
pub struct SensorServer {
    _server: EspHttpServer,
}

/// The HTTP server in access point mode: collects WiFi credentials.
pub struct SetupServer {
    /// Receives credentials once they have been saved.
    pub saved_credentials: mpsc::Receiver<Credentials>,
    _server: EspHttpServer,
}

pub fn serve_sensors(sensor: Sensor) -> anyhow::Result<SensorServer> {
    let mut server = new_server()?;
    let sensor = Arc::new(Mutex::new(sensor));
    let json_sensor = sensor.clone();
    server
        .fn_handler("/", Method::Get, move |req| {
            let survey = lock(&sensor)?.read_each();
            log_failures(&survey);
            let html = page::sensors(
                &survey.readings,
                survey.failures.iter().map(|(register, _)| *register),
            );
            req.into_response(200, Some("OK"), &[(header::CONTENT_TYPE, header::HTML)])?
                .write_all(html.as_bytes())?;
            Ok(())
        })
        .context("adding GET / handler")?
        .fn_handler("/sensors.json", Method::Get, move |req| {
            get_sensors(req, &json_sensor)
        })
        .context("adding GET /sensors.json handler")?;

    log::info!("sensor page is being served on port {HTTP_PORT}");
    Ok(SensorServer { _server: server })
}

pub fn serve_setup<S>(store: S) -> anyhow::Result<SetupServer>
where
    S: CredentialStore + Send + 'static,
{
    let mut server = new_server()?;
    let store = Mutex::new(store);
    let (tx, rx) = mpsc::sync_channel(1);
    server
        .fn_handler("/", Method::Get, |req| {
            req.into_response(200, Some("OK"), &[(header::CONTENT_TYPE, header::HTML)])?
                .write_all(page::SETUP_FORM.as_bytes())?;
            Ok(())
        })
        .context("adding GET / handler")?
        .fn_handler("/submit", Method::Post, move |mut req| {
            let body = config::read_form(|buf| req.read(buf))?;

            let submitted = {
                let mut store = lock(&store)?;
                config::submit(&mut *store, &body)
            };
            let credentials = match submitted {
                Ok(credentials) => credentials,
                Err(error) => {
                    log::warn!("rejected WiFi credentials: {error:#}");
                    req.into_status_response(400)?
                        .write_all(format!("{error:#}").as_bytes())?;
                    return Ok(());
                }
            };

            req.into_response(200, Some("OK"), &[(header::CONTENT_TYPE, header::HTML)])?
                .write_all(page::SAVED.as_bytes())?;
            tx.try_send(credentials)
                .context("sending saved wifi credentials")?;
            Ok(())
        })
        .context("adding POST /submit handler")?;

    log::info!("credential form is being served on port {HTTP_PORT}");
    Ok(SetupServer {
        saved_credentials: rx,
        _server: server,
    })
}

fn new_server() -> anyhow::Result<EspHttpServer> {
    EspHttpServer::new(&Configuration {
        http_port: HTTP_PORT,
        ..Default::default()
    })
    .context("failed to start HTTP server")
}

fn get_sensors<C: Connection>(req: Request<C>, sensor: &Mutex<Sensor>) -> HandlerResult {
    const JSON: &str = "application/json";

    let survey = lock(sensor)?.read_each();
    log_failures(&survey);

    let mut rsp = req.into_response(200, Some("OK"), &[(header::CONTENT_TYPE, JSON)])?;
    let json = serde_json::to_string_pretty(&survey.readings)?;
    rsp.write_all(json.as_bytes())?;
    Ok(())
}

fn log_failures<E: core::fmt::Debug>(survey: &apc1::Survey<E>) {
    for (register, error) in &survey.failures {
        log::warn!(target: "aqi::sensor", "failed to read {}: {error}", register.name);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("lock poisoned by a panicked handler"))
}

mod header {
    pub(super) const CONTENT_TYPE: &str = "content-type";
    pub(super) const HTML: &str = "text/html";
}
