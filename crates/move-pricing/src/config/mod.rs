//! Environment-driven configuration for the pricing service.

use std::env;
use std::net::{AddrParseError, IpAddr, SocketAddr};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Deployment stage, steering defaults and log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnvironment {
    #[default]
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Aggregate configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Read `APP_*` variables, falling back to development defaults. A `.env`
    /// file in the working directory is honored when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw_port = env_or("APP_PORT", "8080");
        let port = raw_port
            .parse::<u16>()
            .map_err(|_| ConfigError::Port { raw: raw_port })?;

        Ok(Self {
            environment: AppEnvironment::parse(&env_or("APP_ENV", "development")),
            server: ServerConfig {
                host: env_or("APP_HOST", "127.0.0.1"),
                port,
            },
            telemetry: TelemetryConfig {
                log_level: env_or("APP_LOG_LEVEL", "info"),
            },
        })
    }
}

/// HTTP listener binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Resolve the configured host and port to a bindable address. The name
    /// `localhost` is accepted as a convenience and pinned to the IPv4
    /// loopback; anything else must be a literal IP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::from([127, 0, 0, 1])
        } else {
            self.host.parse().map_err(|source| ConfigError::Host {
                raw: self.host.clone(),
                source,
            })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Log filtering defaults consumed by `telemetry::init`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT '{raw}' is not a valid port number")]
    Port { raw: String },
    #[error("APP_HOST '{raw}' is neither 'localhost' nor a literal IP address")]
    Host {
        raw: String,
        #[source]
        source: AddrParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // Env vars are process-global, so these tests take turns.
    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(Mutex::default)
    }

    fn clear_app_env() {
        for key in ["APP_ENV", "APP_HOST", "APP_PORT", "APP_LOG_LEVEL"] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_apply_without_environment() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_app_env();

        let config = AppConfig::load().expect("defaults load");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn localhost_resolves_to_loopback() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_app_env();
        env::set_var("APP_HOST", "localhost");
        env::set_var("APP_PORT", "9466");

        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 9466));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        clear_app_env();
        env::set_var("APP_PORT", "pricing");

        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::Port { raw }) if raw == "pricing"
        ));
    }

    #[test]
    fn production_aliases_are_recognized() {
        assert_eq!(AppEnvironment::parse("PROD"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::parse("ci"), AppEnvironment::Test);
        assert_eq!(AppEnvironment::parse("staging"), AppEnvironment::Development);
    }
}
