// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration file handling.
//!
//! The config lives at `~/.vidqueue/config.json`. A missing file means all
//! defaults; missing keys in an existing file fall back to their defaults too.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fetch::YtDlpFetcher;
use crate::queue::{QueueOptions, DEFAULT_HISTORY_LIMIT};

pub const DEFAULT_PORT: u16 = 8000;
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Port the HTTP server listens on (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Where yt-dlp writes files (default: ./downloads)
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Finished jobs kept for status queries (default: 50)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Idle worker poll interval in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-download time limit in seconds, 0 disables it (default: 300)
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Time limit for title lookups in seconds (default: 30)
    #[serde(default = "default_title_timeout_secs")]
    pub title_timeout_secs: u64,
    /// Look up titles for jobs queued without one (default: true)
    #[serde(default = "default_resolve_titles")]
    pub resolve_titles: bool,
    /// yt-dlp executable (default: "yt-dlp" from PATH)
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// `vidqueue watch` poll interval in seconds (default: 2)
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_title_timeout_secs() -> u64 {
    30
}

fn default_resolve_titles() -> bool {
    true
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_watch_interval_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            download_dir: default_download_dir(),
            history_limit: default_history_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            download_timeout_secs: default_download_timeout_secs(),
            title_timeout_secs: default_title_timeout_secs(),
            resolve_titles: default_resolve_titles(),
            ytdlp_path: default_ytdlp_path(),
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

impl Config {
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            history_limit: self.history_limit.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            resolve_titles: self.resolve_titles,
        }
    }

    pub fn fetcher(&self) -> YtDlpFetcher {
        YtDlpFetcher::new(&self.ytdlp_path, &self.download_dir)
            .with_title_timeout(Duration::from_secs(self.title_timeout_secs))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }

    /// Base URL a local client uses to reach this server.
    pub fn server_url(&self) -> String {
        let host = if self.bind.is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            match self.bind {
                IpAddr::V6(v6) => format!("[{}]", v6),
                IpAddr::V4(v4) => v4.to_string(),
            }
        };
        format!("http://{}:{}", host, self.port)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(
        mut self,
        port: Option<u16>,
        bind: Option<IpAddr>,
        download_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(dir) = download_dir {
            self.download_dir = dir;
        }
        self
    }
}

/// `~/.vidqueue`, created on first use.
pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_dir = home.join(".vidqueue");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    }
    Ok(config_dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
