use crate::error::CoreError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Bounds applied to every paged query.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("CLINIC").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paging: PagingConfig::default(),
            log_level: default_log_level(),
        }
    }
}
