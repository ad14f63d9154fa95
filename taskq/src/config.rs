//! Configuration module for environment variable parsing.
//!
//! Both binaries read the broker connection parameters from the same
//! environment variables, each with a default that targets a local broker.

use std::env;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::TaskError;
use crate::processor::duration_millis;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker host name
    pub host: String,

    /// Broker AMQP port
    pub port: u16,

    /// Username for PLAIN authentication
    pub username: String,

    /// Password for PLAIN authentication
    pub password: String,

    /// Virtual host to open the connection on
    pub vhost: String,

    /// Length of one simulated unit of work
    pub work_unit: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            work_unit: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            host: env::var("RABBITMQ_HOST").unwrap_or(defaults.host),

            port: parse_number("RABBITMQ_PORT", defaults.port),

            username: env::var("RABBITMQ_USER").unwrap_or(defaults.username),

            password: env::var("RABBITMQ_PASS").unwrap_or(defaults.password),

            vhost: env::var("RABBITMQ_VHOST").unwrap_or(defaults.vhost),

            work_unit: Duration::from_millis(parse_number(
                "WORK_UNIT_MS",
                duration_millis(defaults.work_unit),
            )),
        }
    }

    /// Build the `amqp://` URI for these connection parameters.
    ///
    /// Credentials and the vhost are percent-encoded, so a password such as
    /// `p@ss/word` survives the trip through the URI.
    pub fn amqp_uri(&self) -> Result<String, TaskError> {
        let mut uri = Url::parse("amqp://localhost/")
            .map_err(|e| TaskError::InvalidUri(e.to_string()))?;

        uri.set_host(Some(&self.host))
            .map_err(|e| TaskError::InvalidUri(format!("host {:?}: {}", self.host, e)))?;
        uri.set_port(Some(self.port))
            .map_err(|_| TaskError::InvalidUri(format!("port {}", self.port)))?;
        uri.set_username(&self.username)
            .map_err(|_| TaskError::InvalidUri("username".to_string()))?;
        uri.set_password(Some(&self.password))
            .map_err(|_| TaskError::InvalidUri("password".to_string()))?;

        // The default vhost "/" is spelled as an empty path segment.
        if self.vhost != "/" {
            uri.path_segments_mut()
                .map_err(|_| TaskError::InvalidUri("vhost".to_string()))?
                .pop_if_empty()
                .push(&self.vhost);
        }

        Ok(uri.into())
    }
}

/// Parse a numeric environment variable, falling back to `default` when it
/// is missing or malformed.
fn parse_number<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            default
        }
    }
}
