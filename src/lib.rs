use std::path::PathBuf;

use chrono::FixedOffset;
use config::{Config, ConfigError};
use serde::Deserialize;

pub mod application;
pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct QuickparkConfig {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub clock: Clock,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub logger: Logger,
}

impl QuickparkConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("quickpark").required(false))
            .add_source(config::Environment::with_prefix("QUICKPARK").separator("__"))
            .build()?
            .try_deserialize::<QuickparkConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub address: String,
    pub tls: Option<Tls>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_owned(),
            tls: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// 永続化先
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Store {
    #[default]
    Memory,
    EventStore {
        url: String,
    },
}

#[derive(Clone, Debug, Deserialize)]
pub struct Catalog {
    pub path: Option<PathBuf>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("spots.json")),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Payment {
    pub success_rate: f64,
}

impl Default for Payment {
    fn default() -> Self {
        Self { success_rate: 0.8 }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Clock {
    /// 表示に使う固定タイムゾーン (UTCからの分)
    pub utc_offset_minutes: i32,
}

impl Clock {
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
    }
}

impl Default for Clock {
    fn default() -> Self {
        // America/Toronto (EST)
        Self {
            utc_offset_minutes: -300,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Auth {
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Token {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub role: domain::identity::Role,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    #[default]
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
