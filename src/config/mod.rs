//! Engine configuration
//!
//! Runtime limits and timing knobs. Values load from an
//! optional `retune.toml` plus `RETUNE_`-prefixed environment overrides; a
//! plain `RetuneConfig::default()` is the documented production profile.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetuneConfig {
    #[serde(default)]
    pub channels: ChannelLimits,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub setup: SetupLimits,
}

/// Bounds on the channel lineup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLimits {
    /// Hard cap on stored channels
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
    /// Lowest assignable channel number
    #[serde(default = "default_min_channel_number")]
    pub min_number: u16,
    /// Highest assignable channel number
    #[serde(default = "default_max_channel_number")]
    pub max_number: u16,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            max_channels: default_max_channels(),
            min_number: default_min_channel_number(),
            max_number: default_max_channel_number(),
        }
    }
}

/// Content cache and retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a resolved item list stays fresh
    #[serde(with = "duration_serde::duration", default = "default_content_cache_ttl")]
    pub content_ttl: Duration,
    /// Lifetime of the per-library show metadata used to decorate episodes
    #[serde(
        with = "duration_serde::duration",
        default = "default_show_decoration_ttl"
    )]
    pub show_decoration_ttl: Duration,
    /// Delay before re-attempting a resolve that failed with a network error
    #[serde(with = "duration_serde::duration", default = "default_retry_delay")]
    pub retry_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            content_ttl: default_content_cache_ttl(),
            show_decoration_ttl: default_show_decoration_ttl(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Scheduler timing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Drift-guard check cadence
    #[serde(with = "duration_serde::duration", default = "default_sync_interval")]
    pub sync_interval: Duration,
    /// Wall-clock drift beyond which a full re-sync runs
    #[serde(with = "duration_serde::duration", default = "default_drift_tolerance")]
    pub drift_tolerance: Duration,
    /// Lower clamp on the program-boundary timer
    #[serde(
        with = "duration_serde::duration",
        default = "default_min_boundary_timer"
    )]
    pub min_boundary_timer: Duration,
    /// Upper clamp on the program-boundary timer
    #[serde(
        with = "duration_serde::duration",
        default = "default_max_boundary_timer"
    )]
    pub max_boundary_timer: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: default_sync_interval(),
            drift_tolerance: default_drift_tolerance(),
            min_boundary_timer: default_min_boundary_timer(),
            max_boundary_timer: default_max_boundary_timer(),
        }
    }
}

/// Bulk channel-setup limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupLimits {
    /// Default cap on channels created by one setup run
    #[serde(default = "default_setup_max_channels")]
    pub default_max_channels: usize,
    /// Items a source must have before a channel is generated from it
    #[serde(default = "default_min_items_per_channel")]
    pub default_min_items: usize,
    /// Upper bound on items scanned per library during planning
    #[serde(default = "default_library_scan_limit")]
    pub library_scan_limit: usize,
}

impl Default for SetupLimits {
    fn default() -> Self {
        Self {
            default_max_channels: default_setup_max_channels(),
            default_min_items: default_min_items_per_channel(),
            library_scan_limit: default_library_scan_limit(),
        }
    }
}

impl RetuneConfig {
    /// Load configuration from a TOML file (if present) merged with
    /// `RETUNE_`-prefixed environment variables.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path.as_ref()));
        }
        figment
            .merge(Env::prefixed("RETUNE_").split("__"))
            .extract()
            .context("failed to load retune configuration")
    }
}
