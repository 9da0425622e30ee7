//! Configuration loaded from environment variables (and `.env`, if present).

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::factory::ImageBackend;
use crate::gate::DEFAULT_MIN_INTERVAL;
use crate::providers::gemini::DEFAULT_BASE_URL;
use crate::Error;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini credential. Optional so the server can start without it; image
    /// and chat calls fail with a configuration error instead.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub chat_model: String,
    pub image_model: String,
    pub image_backend: ImageBackend,

    /// Generation gate
    pub image_timeout: Duration,
    pub image_min_interval: Duration,
    pub provider_max_retries: u32,

    /// Directory holding the static UI and generated images
    pub public_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let image_backend = match var("IMAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => ImageBackend::Gemini,
        };

        let image_timeout_secs: u64 = parse_or(&var, "IMAGE_TIMEOUT_SECS", DEFAULT_IMAGE_TIMEOUT.as_secs())?;
        if image_timeout_secs == 0 {
            return Err(Error::config("IMAGE_TIMEOUT_SECS must be greater than zero"));
        }

        let image_min_interval_ms: u64 = parse_or(
            &var,
            "IMAGE_MIN_INTERVAL_MS",
            DEFAULT_MIN_INTERVAL.as_millis() as u64,
        )?;

        Ok(Self {
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_api_base: var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: var("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            image_model: var("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            image_backend,
            image_timeout: Duration::from_secs(image_timeout_secs),
            image_min_interval: Duration::from_millis(image_min_interval_ms),
            provider_max_retries: parse_or(&var, "PROVIDER_MAX_RETRIES", 1)?,
            public_dir: var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            host: parse_or(&var, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&var, "PORT", 3000)?,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={value:?} is invalid: {e}"))),
        None => Ok(default),
    }
}
