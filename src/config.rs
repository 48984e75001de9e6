use std::time::Duration;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// Error messages for validating the target URL pieces
const BASE_URL_ENDS_WITH: &str =
    "The base URL can't end with a /, the base path carries the leading one";
const BASE_PATH_MISSING_SLASH: &str = "The base path is required to begin with a leading /.";

/// Raw shape of the TOML configuration file, as written on disk.
///
/// Nothing in here is trusted until it has gone through [`validate`], which
/// produces the immutable [`Config`] the rest of the harness runs on.
#[derive(Deserialize, Debug, Clone)]
pub struct RawConfig {
    pub api: Api,
    pub data: Data,
    pub http: Http,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Api {
    pub base_url: String,
    pub base_path: String,
    pub auth_token: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Data {
    pub fuel_id_valid: i64,
    pub fuel_id_invalid: i64,
    pub fuel_id_test: i64,
    pub quantity_valid: i64,
    pub quantity_invalid: i64,
    pub quantity_zero: i64,
    pub order_id_valid: Option<String>,
    pub order_id_invalid: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Http {
    pub timeout_secs: u64,
    pub long_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_delay_secs: u64,
}

/// Validated, immutable run configuration.
///
/// Built once before any request is sent and passed by reference from there
/// on. There is no process-global client state to mutate between scenarios.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub base_path: String,
    pub auth_token: String,
    pub username: String,
    pub password: String,

    pub fuel_id_valid: i64,
    pub fuel_id_invalid: i64,
    pub fuel_id_test: i64,
    pub quantity_valid: i64,
    pub quantity_invalid: i64,
    pub quantity_zero: i64,
    pub order_id_valid: Option<String>,
    pub order_id_invalid: String,

    pub timeout: Duration,
    pub long_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_delay: Duration,
}

impl Config {
    /// Joins a scenario path onto the configured base URL and base path.
    pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}{}{}", self.base_url, self.base_path, path))
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid config field `{field}`: {message}")]
pub struct ConfigError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! config_err {
    ($field:expr, $msg:expr, $toml_src:expr, $file_name:expr, $snippet:expr) => {
        ConfigError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $file_name.to_string(),
                $toml_src.to_string(),
            )),
            span: find_span($snippet, $toml_src),
        }
    };
}

/// Validates the raw TOML into a [`Config`].
///
/// Any failure here is fatal: the run aborts before a single request goes
/// out, with a diagnostic pointing into the offending spot of the file.
pub fn validate(raw: &RawConfig, toml_src: &str, file_name: &str) -> Result<Config, ConfigError> {
    if raw.api.base_url.ends_with('/') {
        return Err(config_err!(
            "api.base_url",
            BASE_URL_ENDS_WITH,
            toml_src,
            file_name,
            &raw.api.base_url
        ));
    }

    if let Err(error) = Url::parse(&raw.api.base_url) {
        return Err(config_err!(
            "api.base_url",
            format!("Failed to parse base URL: {error}"),
            toml_src,
            file_name,
            &raw.api.base_url
        ));
    }

    if !raw.api.base_path.starts_with('/') {
        return Err(config_err!(
            "api.base_path",
            BASE_PATH_MISSING_SLASH,
            toml_src,
            file_name,
            &raw.api.base_path
        ));
    }

    for (field, value) in [
        ("api.auth_token", &raw.api.auth_token),
        ("api.username", &raw.api.username),
        ("api.password", &raw.api.password),
    ] {
        if value.trim().is_empty() {
            return Err(config_err!(
                field,
                "Value must not be empty",
                toml_src,
                file_name,
                value
            ));
        }
    }

    // The token ends up inside an Authorization header, so it has to be a
    // legal header value up front. This is what lets profile construction
    // stay infallible.
    if raw.api.auth_token.chars().any(|c| !c.is_ascii_graphic()) {
        return Err(config_err!(
            "api.auth_token",
            "Token must be printable ASCII without spaces",
            toml_src,
            file_name,
            &raw.api.auth_token
        ));
    }

    if raw.http.timeout_secs == 0 {
        return Err(config_err!(
            "http.timeout_secs",
            "Timeout must be at least 1 second",
            toml_src,
            file_name,
            "timeout_secs"
        ));
    }

    if raw.http.retry_max_attempts == 0 {
        return Err(config_err!(
            "http.retry_max_attempts",
            "At least one attempt is required",
            toml_src,
            file_name,
            "retry_max_attempts"
        ));
    }

    Ok(Config {
        base_url: raw.api.base_url.clone(),
        base_path: raw.api.base_path.clone(),
        auth_token: raw.api.auth_token.clone(),
        username: raw.api.username.clone(),
        password: raw.api.password.clone(),
        fuel_id_valid: raw.data.fuel_id_valid,
        fuel_id_invalid: raw.data.fuel_id_invalid,
        fuel_id_test: raw.data.fuel_id_test,
        quantity_valid: raw.data.quantity_valid,
        quantity_invalid: raw.data.quantity_invalid,
        quantity_zero: raw.data.quantity_zero,
        order_id_valid: raw.data.order_id_valid.clone(),
        order_id_invalid: raw.data.order_id_invalid.clone(),
        timeout: Duration::from_secs(raw.http.timeout_secs),
        long_timeout: Duration::from_secs(raw.http.long_timeout_secs),
        retry_max_attempts: raw.http.retry_max_attempts,
        retry_delay: Duration::from_secs(raw.http.retry_delay_secs),
    })
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{}\"", needle);
    toml_src
        .find(&pattern)
        .map(|start| SourceSpan::new(start.into(), needle.len()))
        .or_else(|| {
            toml_src
                .find(needle)
                .map(|start| SourceSpan::new(start.into(), needle.len()))
        })
}

#[cfg(test)]
pub(crate) const SAMPLE_TOML: &str = r#"
[api]
base_url = "https://qacandidatetest.ensek.io"
base_path = "/ENSEK"
auth_token = "s3cr3t-token"
username = "test"
password = "testing"

[data]
fuel_id_valid = 1
fuel_id_invalid = 9999
fuel_id_test = 3
quantity_valid = 10
quantity_invalid = -1
quantity_zero = 0
order_id_invalid = "no-such-order"

[http]
timeout_secs = 10
long_timeout_secs = 30
retry_max_attempts = 3
retry_delay_secs = 1
"#;

#[cfg(test)]
pub(crate) fn sample_config() -> Config {
    let raw: RawConfig = toml::from_str(SAMPLE_TOML).unwrap();
    validate(&raw, SAMPLE_TOML, "sample.toml").unwrap()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::RawConfig;
    use super::sample_config;
    use super::validate;

    #[test]
    fn sample_validates() {
        let config = sample_config();

        assert_eq!(config.base_url, "https://qacandidatetest.ensek.io");
        assert_eq!(config.base_path, "/ENSEK");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry_max_attempts, 3);
        assert!(config.order_id_valid.is_none());
    }

    #[test]
    fn join_builds_full_endpoint() {
        let config = sample_config();

        let url = config.join("/orders").unwrap();
        assert_eq!(url.as_str(), "https://qacandidatetest.ensek.io/ENSEK/orders");
    }

    #[test]
    fn base_url_with_trailing_slash_is_rejected() {
        let toml_src = super::SAMPLE_TOML.replace(
            "https://qacandidatetest.ensek.io",
            "https://qacandidatetest.ensek.io/",
        );
        let raw: RawConfig = toml::from_str(&toml_src).unwrap();

        let error = validate(&raw, &toml_src, "sample.toml").unwrap_err();
        assert!(error.to_string().contains("api.base_url"));
    }

    #[test]
    fn base_path_without_leading_slash_is_rejected() {
        let toml_src = super::SAMPLE_TOML.replace("\"/ENSEK\"", "\"ENSEK\"");
        let raw: RawConfig = toml::from_str(&toml_src).unwrap();

        let error = validate(&raw, &toml_src, "sample.toml").unwrap_err();
        assert!(error.to_string().contains("api.base_path"));
    }

    #[test]
    fn empty_token_is_rejected() {
        let toml_src = super::SAMPLE_TOML.replace("\"s3cr3t-token\"", "\"\"");
        let raw: RawConfig = toml::from_str(&toml_src).unwrap();

        let error = validate(&raw, &toml_src, "sample.toml").unwrap_err();
        assert!(error.to_string().contains("api.auth_token"));
    }

    #[test]
    fn token_with_spaces_is_rejected() {
        let toml_src = super::SAMPLE_TOML.replace("\"s3cr3t-token\"", "\"not a token\"");
        let raw: RawConfig = toml::from_str(&toml_src).unwrap();

        assert!(validate(&raw, &toml_src, "sample.toml").is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let toml_src = super::SAMPLE_TOML.replace("timeout_secs = 10", "timeout_secs = 0");
        let raw: RawConfig = toml::from_str(&toml_src).unwrap();

        assert!(validate(&raw, &toml_src, "sample.toml").is_err());
    }

    #[test]
    fn missing_required_key_fails_to_parse() {
        let toml_src = super::SAMPLE_TOML.replace("order_id_invalid = \"no-such-order\"", "");

        assert!(toml::from_str::<RawConfig>(&toml_src).is_err());
    }
}
