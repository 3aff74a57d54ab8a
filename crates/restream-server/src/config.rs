//! Server configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use restream_core::process::{DEFAULT_PIPELINE_SCRIPT, DEFAULT_SHELL};
use restream_core::{DEFAULT_GRACE_PERIOD, PipelineConfig, SupervisorConfig};

use crate::error::{ServerError, ServerResult};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origin allowed to call the API from a browser.
    pub allowed_origin: String,
    /// Supervisor and pipeline settings.
    pub supervisor: SupervisorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origin: "http://localhost:8080".to_string(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var           | Default               |
    /// |-------------------|-----------------------|
    /// | `DOMAIN_URL`      | required              |
    /// | `COOKIES_PATH`    | required              |
    /// | `HOST`            | `0.0.0.0`             |
    /// | `PORT`            | `8000`                |
    /// | `STOP_GRACE_MS`   | `1000`                |
    /// | `PIPELINE_SHELL`  | `bash`                |
    /// | `PIPELINE_SCRIPT` | yt-dlp + ffmpeg relay |
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, treating empty values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| {
            get(name).ok_or_else(|| {
                ServerError::Config(format!("{} environment variable must be set", name))
            })
        };

        let allowed_origin = require("DOMAIN_URL")?;
        let credentials_path = PathBuf::from(require("COOKIES_PATH")?);

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match get("PORT") {
            Some(value) => parse_number::<u16>("PORT", &value)?,
            None => 8000,
        };
        let grace_period = match get("STOP_GRACE_MS") {
            Some(value) => Duration::from_millis(parse_number::<u64>("STOP_GRACE_MS", &value)?),
            None => DEFAULT_GRACE_PERIOD,
        };

        Ok(Self {
            host,
            port,
            allowed_origin,
            supervisor: SupervisorConfig {
                pipeline: PipelineConfig {
                    shell: get("PIPELINE_SHELL").unwrap_or_else(|| DEFAULT_SHELL.to_string()),
                    script: get("PIPELINE_SCRIPT")
                        .unwrap_or_else(|| DEFAULT_PIPELINE_SCRIPT.to_string()),
                    credentials_path,
                },
                grace_period,
            },
        })
    }

    /// Address to bind the listener to.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid HOST address: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ServerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("{} must be a number, got '{}'", name, value)))
}
