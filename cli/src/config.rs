//! Settings of a run: defaults, overridden by a TOML file, overridden by the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cardrelay::http::ServiceConfig;
use cardrelay::{RelayConfig, RequestTemplate};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Could not parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Contents of the configuration file. Every key is optional.
///
/// ```toml
/// reader = "ACS ACR122U PICC Interface 00 00"
///
/// [service]
/// base_url = "https://latsecu.comunidad.madrid"
/// request_timeout_secs = 30
///
/// [request]
/// salePoint = "010201000005"
///
/// [relay]
/// max_rounds = 5
/// card_timeout_secs = 10
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub reader: Option<String>,
    pub service: ServiceSection,
    pub request: Option<RequestTemplate>,
    pub relay: RelaySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    pub base_url: Option<String>,
    pub init_path: Option<String>,
    pub reading_path: Option<String>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub max_rounds: Option<usize>,
    pub card_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;

        Self::parse(&text).map_err(|e| Error::Parse(path.to_owned(), e))
    }

    fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub reader: Option<String>,
    pub base_url: Option<String>,
    pub sale_point: Option<String>,
    pub max_rounds: Option<usize>,
    pub card_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub reader: Option<String>,
    pub service: ServiceConfig,
    pub template: RequestTemplate,
    pub relay: RelayConfig,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let FileConfig {
            reader,
            service: s,
            request,
            relay: r,
        } = file;

        let mut service = ServiceConfig::default();
        set(&mut service.base_url, overrides.base_url.or(s.base_url));
        set(&mut service.init_path, s.init_path);
        set(&mut service.reading_path, s.reading_path);
        set(&mut service.user_agent, s.user_agent);
        set(&mut service.language, s.language);
        set(&mut service.timezone, s.timezone);
        set(
            &mut service.request_timeout,
            overrides
                .request_timeout_secs
                .or(s.request_timeout_secs)
                .map(Duration::from_secs),
        );

        let mut template = request.unwrap_or_default();
        set(&mut template.sale_point, overrides.sale_point);

        let mut relay = RelayConfig::default();
        set(&mut relay.max_rounds, overrides.max_rounds.or(r.max_rounds));
        set(
            &mut relay.card_timeout,
            overrides
                .card_timeout_secs
                .or(r.card_timeout_secs)
                .map(Duration::from_secs),
        );
        set(
            &mut relay.poll_interval,
            r.poll_interval_ms.map(Duration::from_millis),
        );
        set(
            &mut relay.settle_delay,
            r.settle_delay_ms.map(Duration::from_millis),
        );

        Self {
            reader: overrides.reader.or(reader),
            service,
            template,
            relay,
        }
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(FileConfig::default(), Overrides::default());

        assert_eq!(None, settings.reader);
        assert_eq!(ServiceConfig::default(), settings.service);
        assert_eq!(RequestTemplate::default(), settings.template);
        assert_eq!(RelayConfig::default(), settings.relay);
    }

    #[test]
    fn test_file() {
        let file = FileConfig::parse(
            r#"
            reader = "Reader 0"

            [service]
            base_url = "http://localhost:8080"
            request_timeout_secs = 5

            [request]
            salePoint = "42"

            [relay]
            max_rounds = 3
            settle_delay_ms = 500
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(file, Overrides::default());

        assert_eq!(Some("Reader 0".to_owned()), settings.reader);
        assert_eq!("http://localhost:8080", settings.service.base_url);
        assert_eq!(Duration::from_secs(5), settings.service.request_timeout);
        assert_eq!("42", settings.template.sale_point);
        assert_eq!("WRAPPED", settings.template.command_type);
        assert_eq!(3, settings.relay.max_rounds);
        assert_eq!(Duration::from_millis(500), settings.relay.settle_delay);
        assert_eq!(Duration::from_secs(10), settings.relay.card_timeout);
    }

    #[test]
    fn test_overrides_win() {
        let file = FileConfig::parse(
            r#"
            [relay]
            max_rounds = 3
            card_timeout_secs = 20
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            max_rounds: Some(7),
            sale_point: Some("1".to_owned()),
            ..Default::default()
        };
        let settings = Settings::resolve(file, overrides);

        assert_eq!(7, settings.relay.max_rounds);
        assert_eq!(Duration::from_secs(20), settings.relay.card_timeout);
        assert_eq!("1", settings.template.sale_point);
    }

    #[test]
    fn test_unknown_key() {
        assert!(FileConfig::parse("[relay]\nmax_round = 3\n").is_err());
    }
}
