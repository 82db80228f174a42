use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::certificate::Assets;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Postgres,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageKind::Postgres),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!("unknown storage `{other}`")),
        }
    }
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageKind::Postgres => "postgres",
            StorageKind::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageKind,
    pub database_url: Option<String>,
    /// Root of published media; certificates land in `{media_root}/certificate`.
    pub media_root: PathBuf,
    /// Public prefix `media_root` is served under.
    pub media_url: String,
    pub assets: Assets,
    pub cert_number_prefix: String,
    pub render_queue_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage: StorageKind = try_load(&lookup, "STORAGE", "postgres")?;
        let database_url = lookup("DATABASE_URL");
        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let static_dir = PathBuf::from(lookup("STATIC_DIR").unwrap_or_else(|| "./static".into()));
        let asset = |key: &str, default: &str| {
            lookup(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| static_dir.join(default))
        };
        let assets = Assets {
            template: asset(
                "CERT_TEMPLATE_PATH",
                "certificate_templates/certificate_template.pdf",
            ),
            font: asset("CERT_FONT_PATH", "fonts/LobsterTwo-Regular.ttf"),
            logo: Some(asset("CERT_LOGO_PATH", "images/logo.png")),
        };

        let media_url = lookup("MEDIA_URL").unwrap_or_else(|| "/media".into());

        let render_queue_capacity: usize = try_load(&lookup, "RENDER_QUEUE_CAPACITY", "64")?;
        if render_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "RENDER_QUEUE_CAPACITY",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", "8081")?,
            storage,
            database_url,
            media_root: PathBuf::from(lookup("MEDIA_ROOT").unwrap_or_else(|| "./media".into())),
            media_url: media_url.trim_end_matches('/').to_string(),
            assets,
            cert_number_prefix: lookup("CERT_NUMBER_PREFIX").unwrap_or_else(|| "CERT".into()),
            render_queue_capacity,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse::<T>().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}
