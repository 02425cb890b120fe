//! HTTP transport to the issuing service.
//! Can be enabled by turning `http` feature on.
//!
//! The service expects JSON bodies and a mobile-app user agent. A connection is first
//! initialised with the client's language and timezone; the cookies it sets are kept for the
//! card-reading requests that follow.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;

use crate::protocol::Request;
use crate::remote::RemoteService;
use crate::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not encode the request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Where and how to reach the issuing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub init_path: String,
    pub reading_path: String,
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://latsecu.comunidad.madrid".to_owned(),
            init_path: "/middlelat/midd/device/init/conn".to_owned(),
            reading_path: "/middlelat/device/front/CardReading".to_owned(),
            // Same as the official mobile app.
            user_agent: "okhttp/4.12.0".to_owned(),
            language: "en".to_owned(),
            timezone: "Europe/Madrid".to_owned(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    pub fn init_url(&self) -> String {
        join(&self.base_url, &self.init_path)
    }

    pub fn reading_url(&self) -> String {
        join(&self.base_url, &self.reading_path)
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Serialize)]
struct InitConnection<'a> {
    language: &'a str,
    timezone: &'a str,
}

/// A session with the issuing service over HTTP.
pub struct HttpService {
    client: Client,
    reading_url: String,
}

impl HttpService {
    /// Builds the HTTP client and initialises the connection.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        let init = serde_json::to_string(&InitConnection {
            language: &config.language,
            timezone: &config.timezone,
        })?;

        let url = config.init_url();
        debug!("Initialising connection: {}", url);

        let response = client.post(&url).body(init).send()?;
        if !response.status().is_success() {
            warning!("Connection initialisation answered {}", response.status());
        }

        Ok(Self {
            client,
            reading_url: config.reading_url(),
        })
    }

    fn post(&self, request: &Request) -> Result<String> {
        let body = serde_json::to_string(request)?;
        let response = self.client.post(&self.reading_url).body(body).send()?;

        let status = response.status();
        if !status.is_success() {
            // The body is still handed over; decoding it decides whether the run goes on.
            warning!("Card reading request answered {}", status);
        }

        Ok(response.text()?)
    }
}

impl RemoteService for HttpService {
    fn send(&mut self, request: &Request) -> std::result::Result<String, BoxError> {
        Ok(self.post(request)?)
    }
}
