use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TARGET_URL: &str = "https://www.nepalstock.com/floor-sheet";
pub const DEFAULT_SOURCE_NAME: &str = "nepal_stock_floorsheet";

/// Top-level configuration, usually read from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default = "BrowserSettings::from_env")]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Loads `path` when given, otherwise starts from defaults. Without a
    /// `[browser]` section the browser settings come from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self {
                browser: BrowserSettings::from_env(),
                ..Self::default()
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Value picked in the page's items-per-page dropdown; `None` leaves the
    /// site default alone.
    #[serde(default = "default_items_per_page")]
    pub items_per_page: Option<u32>,
    /// Guard against degenerate pagination loops. Unbounded when `None`.
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl ScraperConfig {
    /// Rejects target URLs the browser could not navigate to.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.target_url)
            .with_context(|| format!("Invalid target URL {:?}", self.target_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Target URL must be http(s), got {}", url.scheme());
        }
        if self.source_name.is_empty() {
            anyhow::bail!("source_name must not be empty");
        }
        Ok(())
    }
}

fn default_target_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}

fn default_source_name() -> String {
    DEFAULT_SOURCE_NAME.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_items_per_page() -> Option<u32> {
    Some(10)
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            source_name: default_source_name(),
            data_dir: default_data_dir(),
            items_per_page: default_items_per_page(),
            max_pages: None,
            timeouts: Timeouts::default(),
        }
    }
}

/// Wait bounds, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_page_load")]
    pub page_load: u64,
    #[serde(default = "default_table_wait")]
    pub table_wait: u64,
    #[serde(default = "default_extract_wait")]
    pub extract_wait: u64,
    #[serde(default = "default_settle")]
    pub settle: u64,
}

fn default_page_load() -> u64 {
    240
}

fn default_table_wait() -> u64 {
    20
}

fn default_extract_wait() -> u64 {
    10
}

fn default_settle() -> u64 {
    3
}

impl Timeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load)
    }

    pub fn table_wait(&self) -> Duration {
        Duration::from_secs(self.table_wait)
    }

    pub fn extract_wait(&self) -> Duration {
        Duration::from_secs(self.extract_wait)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: default_page_load(),
            table_wait: default_table_wait(),
            extract_wait: default_extract_wait(),
            settle: default_settle(),
        }
    }
}

/// How the browser gets launched. Built once at startup and handed to the
/// pipeline; nothing below reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub ci: bool,
}

fn default_true() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

const CI_CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium-browser",
];

impl BrowserSettings {
    /// Detects CI runners (`CI`, `GITHUB_ACTIONS`) and picks a Chrome binary
    /// from `CHROME_BIN` or the usual install locations.
    pub fn from_env() -> Self {
        let ci = std::env::var_os("GITHUB_ACTIONS").is_some() || std::env::var_os("CI").is_some();
        let mut settings = Self {
            ci,
            ..Self::default()
        };

        if ci {
            let explicit = std::env::var_os("CHROME_BIN").map(PathBuf::from);
            settings.chrome_executable = explicit
                .into_iter()
                .chain(CI_CHROME_CANDIDATES.iter().map(PathBuf::from))
                .find(|p| p.exists());

            match &settings.chrome_executable {
                Some(path) => log::info!("CI environment detected, using Chrome at {}", path.display()),
                None => log::warn!("CI environment detected but no Chrome binary found"),
            }
        }

        settings
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            ci: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Github,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default)]
    pub github_owner: String,
    #[serde(default)]
    pub github_repo: String,
    #[serde(default = "default_github_path")]
    pub github_path: String,
    #[serde(skip)]
    pub github_token: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backend() -> StoreBackend {
    StoreBackend::Local
}

fn default_github_path() -> String {
    "data".to_string()
}

impl ApiConfig {
    /// `HOST`, `PORT` and `GITHUB_TOKEN` take precedence over the file.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid number, got {port:?}"))?;
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                self.github_token = Some(token);
            }
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backend: default_backend(),
            data_dir: default_data_dir(),
            source_name: default_source_name(),
            github_owner: String::new(),
            github_repo: String::new(),
            github_path: default_github_path(),
            github_token: None,
        }
    }
}
