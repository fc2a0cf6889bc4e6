use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::collector::{SessionOptions, ADS_LIBRARY_URL};

/// Runtime configuration loaded from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    // Browser
    pub headless: bool,
    pub ads_url: String,

    // Collection loop
    pub max_ads: usize,
    pub stall_limit: usize,
    pub iteration_limit: usize,
    pub settle_ms: u64,
    pub initial_wait_ms: u64,

    // Assets
    pub assets_dir: PathBuf,
    pub asset_concurrency: usize,
    pub download_timeout_secs: u64,

    // Storage / output
    pub db_path: PathBuf,
    pub reports_dir: PathBuf,

    // Optional overrides
    pub platform_table: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            headless: var("HEADLESS")
                .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
                .unwrap_or(true),
            ads_url: var("ADS_URL").unwrap_or_else(|| ADS_LIBRARY_URL.to_string()),
            max_ads: parse_or(&var, "MAX_ADS", 50)?,
            stall_limit: parse_or(&var, "STALL_LIMIT", 5)?,
            iteration_limit: parse_or(&var, "ITERATION_LIMIT", 100)?,
            settle_ms: parse_or(&var, "SETTLE_MS", 2000)?,
            initial_wait_ms: parse_or(&var, "INITIAL_WAIT_MS", 5000)?,
            assets_dir: var("ASSETS_DIR").unwrap_or_else(|| "assets".into()).into(),
            asset_concurrency: parse_or(&var, "ASSET_CONCURRENCY", 4)?,
            download_timeout_secs: parse_or(&var, "DOWNLOAD_TIMEOUT_SECS", 30)?,
            db_path: var("DB_PATH").unwrap_or_else(|| "data/ads.sqlite".into()).into(),
            reports_dir: var("REPORTS_DIR").unwrap_or_else(|| "reports".into()).into(),
            platform_table: var("PLATFORM_TABLE").filter(|s| !s.is_empty()).map(PathBuf::from),
            snapshot_dir: var("SNAPSHOT_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
        })
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            url: self.ads_url.clone(),
            stall_limit: self.stall_limit,
            iteration_limit: self.iteration_limit,
            settle: Duration::from_millis(self.settle_ms),
            initial_wait: Duration::from_millis(self.initial_wait_ms),
            asset_concurrency: self.asset_concurrency,
            show_progress: true,
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert!(c.headless);
        assert_eq!(c.max_ads, 50);
        assert_eq!(c.stall_limit, 5);
        assert_eq!(c.db_path, PathBuf::from("data/ads.sqlite"));
        assert_eq!(c.ads_url, ADS_LIBRARY_URL);
        assert!(c.platform_table.is_none());
        assert_eq!(c.session_options().settle, Duration::from_secs(2));
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let c = config(&[("HEADLESS", "false"), ("MAX_ADS", " 12 "), ("ASSETS_DIR", "/tmp/a")]).unwrap();
        assert!(!c.headless);
        assert_eq!(c.max_ads, 12);
        assert_eq!(c.assets_dir, PathBuf::from("/tmp/a"));

        let err = config(&[("STALL_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("STALL_LIMIT"));
    }
}
