//! Engine configuration.
//!
//! All tunables live here rather than in the algorithms: the partial-credit and
//! forbidden-substring policy of the matcher, and the weights and gate of fusion.
//! Values come from an optional TOML file overlaid with `PLATE_ORIGIN__*`
//! environment variables, e.g. `PLATE_ORIGIN__FUSION__FORMAT_WEIGHT=0.85`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{PlateOriginError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// How far outside a grammar's length bounds a text may fall before it is rejected outright.
    pub length_tolerance: usize,
    /// Credit for a segment whose characters conform but whose separator is missing.
    pub separator_credit: f64,
    /// Factor applied to the score when a forbidden substring occurs.
    pub forbidden_penalty: f64,
    /// Upper bound on the score of any text containing a forbidden substring.
    pub forbidden_cap: f64,
}
impl Default for MatcherConfig {
    fn default() -> Self {
        Self { length_tolerance: 1, separator_credit: 0.5, forbidden_penalty: 0.5, forbidden_cap: 0.45 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Weight of the structural match. Every reliability must stay at or below it.
    pub format_weight: f64,
    /// Jurisdictions whose structural score is below this never appear in a ranking.
    pub min_structural_score: f64,
    pub max_candidates: Option<usize>,
    /// Used for signals that arrive without a reliability of their own.
    pub default_reliability: f64,
    /// Reliability per signal source name, e.g. `color-scheme = 0.5`.
    pub reliability: BTreeMap<String, f64>,
}
impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            format_weight: 0.9,
            min_structural_score: 0.2,
            max_candidates: None,
            default_reliability: 0.5,
            reliability: BTreeMap::new(),
        }
    }
}
impl FusionConfig {
    pub fn reliability_of(&self, source: &str) -> f64 {
        self.reliability.get(source).copied().unwrap_or(self.default_reliability)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    pub fusion: FusionConfig,
    /// Grammar database used by the command line tool.
    pub grammar_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Reads `path` when given (it must exist), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("PLATE_ORIGIN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML text directly, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| -> Result<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(PlateOriginError::Config(format!("{name} must lie in [0, 1], got {value}")))
            }
        };
        let weight = |name: &str, value: f64| -> Result<()> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(PlateOriginError::Config(format!("{name} must lie in (0, 1], got {value}")))
            }
        };
        let matcher = &self.matcher;
        unit("matcher.separator_credit", matcher.separator_credit)?;
        unit("matcher.forbidden_penalty", matcher.forbidden_penalty)?;
        unit("matcher.forbidden_cap", matcher.forbidden_cap)?;
        if matcher.forbidden_cap >= 0.5 {
            return Err(PlateOriginError::Config(format!(
                "matcher.forbidden_cap must stay below 0.5, got {}",
                matcher.forbidden_cap
            )));
        }
        let fusion = &self.fusion;
        weight("fusion.format_weight", fusion.format_weight)?;
        unit("fusion.min_structural_score", fusion.min_structural_score)?;
        let reliabilities = std::iter::once(("fusion.default_reliability".to_string(), fusion.default_reliability))
            .chain(fusion.reliability.iter().map(|(source, r)| (format!("fusion.reliability.{source}"), *r)));
        for (name, reliability) in reliabilities {
            weight(&name, reliability)?;
            if reliability > fusion.format_weight {
                return Err(PlateOriginError::Config(format!(
                    "{name} ({reliability}) exceeds fusion.format_weight ({})",
                    fusion.format_weight
                )));
            }
        }
        if fusion.max_candidates == Some(0) {
            return Err(PlateOriginError::Config("fusion.max_candidates must be positive".into()));
        }
        Ok(())
    }
}
