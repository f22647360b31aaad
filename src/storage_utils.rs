use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// Every field has a default so a partial (or absent) config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
    // 1-based, inclusive. The default skips the top 20 large caps.
    pub scan_start_rank: usize,
    pub scan_end_rank: usize,
    pub momentum_threshold_pct: f64,
    pub momentum_limit: usize,
    pub watchlist: Vec<String>,
    pub narrative_symbol: Option<String>,
    pub include_perps: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            scan_start_rank: 21,
            scan_end_rank: 200,
            momentum_threshold_pct: 5.0,
            momentum_limit: 5,
            watchlist: [
                "DOT", "CAKE", "TIA", "CRV", "AVAX", "ALGO", "ARB", "CHZ", "THETA", "1INCH", "ICP",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            narrative_symbol: Some("BTC".to_string()),
            include_perps: true,
        }
    }
}

impl ReportConfig {
    /// Zero-based, half-open slice bounds of the scanned rank window, clamped to `len`.
    pub fn scan_bounds(&self, len: usize) -> (usize, usize) {
        let start = self.scan_start_rank.saturating_sub(1).min(len);
        let end = self.scan_end_rank.min(len).max(start);
        (start, end)
    }
}

/// Base URLs of every external collaborator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub coingecko: String,
    pub alternative_me: String,
    pub hyperliquid: String,
    pub telegram: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            coingecko: "https://api.coingecko.com/api/v3".to_string(),
            alternative_me: "https://api.alternative.me".to_string(),
            hyperliquid: "https://api.hyperliquid.xyz".to_string(),
            telegram: "https://api.telegram.org".to_string(),
        }
    }
}

/// Per-request timeouts in milliseconds: the bulk market call and everything else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub market_ms: u64,
    pub request_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            market_ms: 20_000,
            request_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn market(&self) -> Duration {
        Duration::from_millis(self.market_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub report: ReportConfig,
    pub endpoints: Endpoints,
    pub timeouts: Timeouts,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    #[cfg(test)]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// **Constructor: new_relative**
    /// Resolves the storage path relative to the running executable and creates
    /// the directory if it is missing.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }

        Ok(Self { base_dir })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    /// **Generic Load Function**
    /// Reads `<filename>.json` and deserializes it into `T`.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        // serde_json scans the bytes itself, no need for a UTF-8 pass first.
        let content = fs::read(self.path_for(filename)).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Like [`load`](Self::load) but falls back to `T::default()` when the file
    /// does not exist. A file that exists but fails to parse is still an error.
    pub async fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        filename: &str,
    ) -> anyhow::Result<T> {
        let path = self.path_for(filename);
        if !fs::try_exists(&path).await? {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(T::default());
        }
        self.load(filename).await
    }
}
