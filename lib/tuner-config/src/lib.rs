// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Collective Tuner Configuration Library
//!
//! Provides the deployment-supplied inputs of the collective tuner: cost model
//! coefficients, channel ceilings, pinned override rules and the preferred
//! tuner implementation.

mod channels;
mod cost;
mod overrides;

pub use channels::ChannelConfig;
pub use cost::{CoefficientConfig, CostModelConfig};
pub use overrides::OverrideRule;

use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Json, Serialized, Toml},
    value::{Dict, Map},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Environment variable naming an additional TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "DYN_TUNER_CONFIG_PATH";

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/opt/dynamo/etc/tuner.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Configuration error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Top-level tuner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TunerConfig {
    #[validate(nested)]
    #[serde(default)]
    pub cost: CostModelConfig,

    #[validate(nested)]
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Pinned rules, checked in order before the cost scan.
    #[validate(nested)]
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,

    /// Preferred tuner implementation name. None = highest compatible version.
    #[serde(default)]
    pub plugin: Option<String>,
}

impl TunerConfig {
    /// Create a Figment configuration with all sources merged.
    ///
    /// Configuration sources in priority order (lowest to highest):
    /// 1. Code defaults
    /// 2. System config file at /opt/dynamo/etc/tuner.toml
    /// 3. TOML file from DYN_TUNER_CONFIG_PATH environment variable
    /// 4. Environment variables (DYN_TUNER_* prefixed)
    pub fn figment() -> Figment {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();

        Figment::new()
            .merge(Serialized::defaults(TunerConfig::default()))
            .merge(Toml::file(SYSTEM_CONFIG_PATH))
            .merge(Toml::file(&config_path))
            // Cost config: DYN_TUNER_COST_PIPELINE_FLOOR
            .merge(
                Env::prefixed("DYN_TUNER_COST_")
                    .map(|k| format!("cost.{}", k.as_str().to_lowercase()).into()),
            )
            // Channel config: DYN_TUNER_CHANNELS_MAX_CHANNELS, DYN_TUNER_CHANNELS_CHUNK_BYTES, etc.
            .merge(
                Env::prefixed("DYN_TUNER_CHANNELS_")
                    .map(|k| format!("channels.{}", k.as_str().to_lowercase()).into()),
            )
            // Plugin selection: DYN_TUNER_PLUGIN
            .merge(
                Env::raw()
                    .only(&["DYN_TUNER_PLUGIN"])
                    .map(|_| "plugin".into()),
            )
    }

    /// Run field and cross-field validation on a configuration built in code.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Ok(())
    }

    /// Load configuration from default figment (env and files).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract configuration from any provider.
    ///
    /// # Example
    /// ```rust,ignore
    /// let config = TunerConfig::extract_from(
    ///     TunerConfig::figment()
    ///         .merge(("channels.max_channels", 16u32))
    ///         .merge(("cost.pipeline_floor", 0.5f64))
    /// )?;
    /// ```
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a figment from defaults, then merge a custom provider.
    pub fn figment_with<T: Provider>(extra: T) -> Figment {
        Self::figment().merge(extra)
    }

    /// Load configuration merging JSON overrides.
    ///
    /// JSON has highest priority - overrides env vars, TOML files, and defaults.
    ///
    /// # Example
    /// ```rust,ignore
    /// let json = r#"{"channels": {"max_channels": 16}}"#;
    /// let config = TunerConfig::from_figment_with_json(json)?;
    /// ```
    pub fn from_figment_with_json(json: &str) -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment().merge(Json::string(json)))
    }
}

/// Lets a `TunerConfig` act as a configuration source for composition with
/// other providers.
impl Provider for TunerConfig {
    fn metadata(&self) -> Metadata {
        Metadata::named("TunerConfig")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
