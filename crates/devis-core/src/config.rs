//! # Engine Configuration
//!
//! Tunables of the quote engine. Parsing only: reading `devis.toml` from disk
//! and applying `DEVIS_*` environment overrides lives in `devis-db::config`.
//!
//! ## Configuration File Format
//! ```toml
//! [vat]
//! permitted_rates_bps = [0, 700, 1000, 1400, 2000]
//! default_rate_bps = 2000
//!
//! [limits]
//! max_items = 500
//! max_depth = 8
//!
//! [history]
//! undo_depth = 50
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::VatRate;
use crate::{DEFAULT_VAT_RATE_BPS, MAX_NESTING_DEPTH, MAX_QUOTE_ITEMS, PERMITTED_VAT_RATES_BPS};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// VAT Settings
// =============================================================================

/// Permitted VAT rates and the prevailing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatSettings {
    /// Rates an item may carry, in basis points.
    #[serde(default = "default_permitted_rates")]
    pub permitted_rates_bps: Vec<u32>,

    /// Prevailing rate of new quotes (discounts, items added without a rate).
    #[serde(default = "default_rate_bps")]
    pub default_rate_bps: u32,
}

fn default_permitted_rates() -> Vec<u32> {
    PERMITTED_VAT_RATES_BPS.to_vec()
}

fn default_rate_bps() -> u32 {
    DEFAULT_VAT_RATE_BPS
}

impl Default for VatSettings {
    fn default() -> Self {
        VatSettings {
            permitted_rates_bps: default_permitted_rates(),
            default_rate_bps: default_rate_bps(),
        }
    }
}

// =============================================================================
// Limits
// =============================================================================

/// Size guards. Trees are small; these catch runaway input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Maximum nesting depth; root items are at depth 1.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_items() -> usize {
    MAX_QUOTE_ITEMS
}

fn default_max_depth() -> usize {
    MAX_NESTING_DEPTH
}

impl Default for LimitSettings {
    fn default() -> Self {
        LimitSettings {
            max_items: default_max_items(),
            max_depth: default_max_depth(),
        }
    }
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Snapshots kept for undo. 0 disables undo.
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,
}

fn default_undo_depth() -> usize {
    50
}

impl Default for HistorySettings {
    fn default() -> Self {
        HistorySettings {
            undo_depth: default_undo_depth(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub vat: VatSettings,

    #[serde(default)]
    pub limits: LimitSettings,

    #[serde(default)]
    pub history: HistorySettings,
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vat.permitted_rates_bps.is_empty() {
            return Err(ConfigError::Invalid(
                "vat.permitted_rates_bps must not be empty".into(),
            ));
        }

        if let Some(rate) = self.vat.permitted_rates_bps.iter().find(|r| **r > 10_000) {
            return Err(ConfigError::Invalid(format!(
                "VAT rate {} bps is above 100%",
                rate
            )));
        }

        if !self
            .vat
            .permitted_rates_bps
            .contains(&self.vat.default_rate_bps)
        {
            return Err(ConfigError::Invalid(format!(
                "vat.default_rate_bps {} is not a permitted rate",
                self.vat.default_rate_bps
            )));
        }

        if self.limits.max_items == 0 || self.limits.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_items and limits.max_depth must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Permitted rates as `VatRate`s.
    pub fn permitted_vat_rates(&self) -> Vec<VatRate> {
        self.vat
            .permitted_rates_bps
            .iter()
            .map(|bps| VatRate::from_bps(*bps))
            .collect()
    }

    /// The prevailing VAT rate.
    pub fn default_vat_rate(&self) -> VatRate {
        VatRate::from_bps(self.vat.default_rate_bps)
    }
}
