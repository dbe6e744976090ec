//! zurg-edge library
//!
//! A reverse proxy for the Zurg WebDAV server that rewrites what picky
//! clients choke on: ISO 8601 `getlastmodified` values, file names in
//! PROPFIND listings, and `Location` headers on redirects.

use std::sync::Arc;

use anyhow::{Context, Result};

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod proxy;
pub mod rewrite;
pub mod store;
pub mod transform;

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn store::ConfigStore>,
    /// `None` while no upstream URL is configured
    pub upstream: Option<proxy::Upstream>,
}

impl AppState {
    /// Build state with the store selected by `config`
    pub fn new(config: config::AppConfig) -> Result<Self> {
        let store = store::from_config(&config.store);
        Self::with_store(config, store)
    }

    /// Build state around an existing store
    pub fn with_store(config: config::AppConfig, store: Arc<dyn store::ConfigStore>) -> Result<Self> {
        let upstream = config
            .upstream_url
            .as_deref()
            .map(proxy::Upstream::new)
            .transpose()
            .context("Failed to set up upstream client")?;

        Ok(Self {
            config,
            store,
            upstream,
        })
    }
}
