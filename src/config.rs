use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{CatalogError, Result};

pub const DEFAULT_YEAR: &str = "2024-2025";
pub const DEFAULT_OUTPUT_DIR: &str = "./out";
pub const DEFAULT_BASE_URL: &str = "https://www.torontomu.ca";
pub const DEFAULT_DB_PATH: &str = "data/catalog.sqlite";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_CONCURRENCY: usize = 10;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9]{4})-([0-9]{4})$").unwrap());

/// Academic year segment of calendar URLs, e.g. `2024-2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: u16,
    pub end: u16,
}

impl FromStr for YearRange {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = YEAR_RE.captures(s.trim()).ok_or_else(|| {
            CatalogError::Config(format!("year range '{}' must look like YYYY-YYYY", s))
        })?;
        let year = |text: &str| {
            text.parse::<u16>()
                .map_err(|e| CatalogError::Config(format!("year '{}' in '{}': {}", text, s, e)))
        };
        let start = year(&caps[1])?;
        let end = year(&caps[2])?;
        if start.checked_add(1) != Some(end) {
            return Err(CatalogError::Config(format!(
                "year range '{}' must span consecutive years",
                s
            )));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.start, self.end)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            start: 2024,
            end: 2025,
        }
    }
}

/// Options shared by both extractors.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub year: YearRange,
    pub output_dir: PathBuf,
    pub base_url: String,
    pub retries: u32,
    pub concurrency: usize,
    /// Log every extracted record at info level
    pub verbose: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            year: YearRange::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            base_url: DEFAULT_BASE_URL.to_string(),
            retries: 0,
            concurrency: DEFAULT_CONCURRENCY,
            verbose: false,
        }
    }
}

impl ExtractConfig {
    pub fn programs_path(&self) -> String {
        format!("/calendar/{}/programs/", self.year)
    }

    pub fn courses_path(&self) -> String {
        format!("/calendar/{}/courses/", self.year)
    }
}

/// Options for the loader.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub database: String,
    pub source_dir: PathBuf,
    /// Log database totals after the load commits
    pub verbose: bool,
}

/// Values that may come from the environment or a dotenv file.
#[derive(Debug, Default, Clone)]
pub struct EnvSettings {
    pub database_url: Option<String>,
    pub base_url: Option<String>,
}

impl EnvSettings {
    /// Load `env_file` (if present) into the process environment, then read
    /// `CATALOG_*` variables. A file that was asked for explicitly must exist.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    CatalogError::Config(format!("cannot read env file {}: {}", path.display(), e))
                })?;
                debug!("[config] loaded env file {}", path.display());
            }
            None => {
                if dotenvy::from_path(DEFAULT_ENV_FILE).is_ok() {
                    debug!("[config] loaded env file {}", DEFAULT_ENV_FILE);
                }
            }
        }

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("CATALOG"))
            .build()
            .map_err(|e| CatalogError::Config(e.to_string()))?;

        Ok(Self {
            database_url: settings.get_string("database_url").ok(),
            base_url: settings.get_string("base_url").ok(),
        })
    }

    pub fn database(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.database_url.clone())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
    }

    pub fn base_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}
