use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Collection;
use crate::error::GrantsError;

pub const DEFAULT_CONFIG_FILE: &str = "doge-grants.json";
pub const DEFAULT_WORKBOOK: &str = "doge_full_download.xlsx";
pub const DEFAULT_CONTRACTS_URL: &str = "https://api.doge.gov/savings/contracts";
pub const DEFAULT_GRANTS_URL: &str = "https://api.doge.gov/savings/grants";
/// Page size requested from the savings API.
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub contracts_url: Option<String>,
    #[serde(default)]
    pub grants_url: Option<String>,
    #[serde(default)]
    pub workbook: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub contracts_url: String,
    pub grants_url: String,
    pub workbook: Utf8PathBuf,
    pub page_size: usize,
    pub top_n: usize,
}

impl ResolvedConfig {
    pub fn endpoint(&self, collection: Collection) -> &str {
        match collection {
            Collection::Contracts => &self.contracts_url,
            Collection::Grants => &self.grants_url,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `doge-grants.json` in the working directory when no path is given.
    ///
    /// A missing default file resolves to the built-in defaults; an explicit path must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GrantsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GrantsError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GrantsError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            contracts_url: config
                .contracts_url
                .unwrap_or_else(|| DEFAULT_CONTRACTS_URL.to_string()),
            grants_url: config
                .grants_url
                .unwrap_or_else(|| DEFAULT_GRANTS_URL.to_string()),
            workbook: Utf8PathBuf::from(
                config
                    .workbook
                    .unwrap_or_else(|| DEFAULT_WORKBOOK.to_string()),
            ),
            page_size: config.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
            top_n: config.top_n.unwrap_or(DEFAULT_TOP_N),
        }
    }
}
