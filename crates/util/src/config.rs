use std::{env, fmt, net::SocketAddr, path::PathBuf, time::Duration};

use url::Url;

use super::server_bind_address;

pub const DEFAULT_CATALOG_PATH: &str = "catalog.json";
pub const DEFAULT_HOSTING_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

const DEV_GRAPHQL_URL: &str = "http://127.0.0.1:60000/simple/v1/";
const DEV_UPLOAD_URL: &str = "http://127.0.0.1:60000/file/v1/";
const DEV_GENERATOR_URL: &str = "http://127.0.0.1:9090/";
const DEV_CALLBACK_SECRET: &str = "development-callback-secret";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Base URLs of the services the hosting workflow talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoints {
    pub graphql: Url,
    pub upload: Url,
    pub generator: Url,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub endpoints: RemoteEndpoints,
    pub graphql_token: Option<String>,
    pub catalog_path: PathBuf,
    pub callback_secret: Vec<u8>,
    pub hosting_timeout: Duration,
    /// Sessions untouched for this long are unmounted and dropped.
    pub session_idle_timeout: Duration,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    ///
    /// Remote endpoints and the callback secret fall back to local defaults
    /// outside production and are mandatory in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let strict = matches!(environment, Environment::Production);

        let endpoints = RemoteEndpoints {
            graphql: url_var("FONTHOST_GRAPHQL_URL", DEV_GRAPHQL_URL, strict)?,
            upload: url_var("FONTHOST_UPLOAD_URL", DEV_UPLOAD_URL, strict)?,
            generator: url_var("FONTHOST_GENERATOR_URL", DEV_GENERATOR_URL, strict)?,
        };

        let callback_secret = match non_empty_var("FONTHOST_CALLBACK_SECRET") {
            Some(secret) => secret.into_bytes(),
            None if strict => return Err(ConfigError::MissingVar("FONTHOST_CALLBACK_SECRET")),
            None => DEV_CALLBACK_SECRET.as_bytes().to_vec(),
        };

        let hosting_timeout =
            seconds_var("FONTHOST_HOSTING_TIMEOUT_SECS", DEFAULT_HOSTING_TIMEOUT_SECS)?;
        let session_idle_timeout =
            seconds_var("FONTHOST_SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?;

        Ok(Self {
            bind_addr,
            environment,
            endpoints,
            graphql_token: non_empty_var("FONTHOST_GRAPHQL_TOKEN"),
            catalog_path: non_empty_var("FONTHOST_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH)),
            callback_secret,
            hosting_timeout,
            session_idle_timeout,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn seconds_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidNumber {
                var: name,
                value: raw,
            }),
        },
        None => Ok(Duration::from_secs(default)),
    }
}

fn url_var(name: &'static str, fallback: &str, strict: bool) -> Result<Url, ConfigError> {
    let raw = match non_empty_var(name) {
        Some(value) => value,
        None if strict => return Err(ConfigError::MissingVar(name)),
        None => fallback.to_string(),
    };
    let mut url = Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { var: name, source })?;
    // Relative joins drop the last segment unless the path ends with a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
    InvalidNumber {
        var: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(var) => write!(f, "{var} must be set in production"),
            Self::InvalidUrl { var, source } => write!(f, "invalid {var} value: {source}"),
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::ENV_GUARD;
    use crate::DEFAULT_BIND_ADDR;

    const VARS: [&str; 10] = [
        "APP_ENV",
        "APP_BIND_ADDR",
        "FONTHOST_GRAPHQL_URL",
        "FONTHOST_UPLOAD_URL",
        "FONTHOST_GENERATOR_URL",
        "FONTHOST_GRAPHQL_TOKEN",
        "FONTHOST_CATALOG_PATH",
        "FONTHOST_CALLBACK_SECRET",
        "FONTHOST_HOSTING_TIMEOUT_SECS",
        "FONTHOST_SESSION_IDLE_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.endpoints.graphql.as_str(), DEV_GRAPHQL_URL);
        assert_eq!(config.catalog_path, PathBuf::from(DEFAULT_CATALOG_PATH));
        assert_eq!(config.hosting_timeout, Duration::from_secs(10));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.graphql_token, None);
        assert_eq!(config.callback_secret, DEV_CALLBACK_SECRET.as_bytes());
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn production_requires_remote_endpoints() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");

        let err = AppConfig::from_env().expect_err("missing endpoints should error");
        assert!(matches!(err, ConfigError::MissingVar("FONTHOST_GRAPHQL_URL")));

        clear_env();
    }

    #[test]
    fn parses_production_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("FONTHOST_GRAPHQL_URL", "https://api.example.com/simple/v1/project");
        env::set_var("FONTHOST_UPLOAD_URL", "https://api.example.com/file/v1/project/");
        env::set_var("FONTHOST_GENERATOR_URL", "https://generator.example.com");
        env::set_var("FONTHOST_CALLBACK_SECRET", "s3cret");
        env::set_var("FONTHOST_GRAPHQL_TOKEN", "token");
        env::set_var("FONTHOST_HOSTING_TIMEOUT_SECS", "30");
        env::set_var("FONTHOST_SESSION_IDLE_SECS", "600");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(
            config.endpoints.graphql.as_str(),
            "https://api.example.com/simple/v1/project/"
        );
        assert_eq!(config.endpoints.generator.as_str(), "https://generator.example.com/");
        assert_eq!(config.callback_secret, b"s3cret");
        assert_eq!(config.graphql_token.as_deref(), Some("token"));
        assert_eq!(config.hosting_timeout, Duration::from_secs(30));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(600));

        clear_env();
    }

    #[test]
    fn rejects_invalid_timeout_and_url() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("FONTHOST_HOSTING_TIMEOUT_SECS", "0");
        let err = AppConfig::from_env().expect_err("zero timeout");
        assert!(matches!(err, ConfigError::InvalidNumber { value, .. } if value == "0"));

        clear_env();
        env::set_var("FONTHOST_SESSION_IDLE_SECS", "soon");
        let err = AppConfig::from_env().expect_err("non-numeric idle timeout");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { var: "FONTHOST_SESSION_IDLE_SECS", .. }
        ));

        clear_env();
        env::set_var("FONTHOST_UPLOAD_URL", "not a url");
        let err = AppConfig::from_env().expect_err("bad url");
        assert!(matches!(err, ConfigError::InvalidUrl { var: "FONTHOST_UPLOAD_URL", .. }));

        clear_env();
    }
}
