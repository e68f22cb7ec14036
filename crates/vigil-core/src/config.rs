//! Configuration loading and typed config structures for the Vigil engine.
//!
//! The canonical configuration lives in `vigil-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure (tuning profiles, noise table, logging) and a loader that
//! reads and parses the file. Sections owned by the engine binary (the
//! scripted scenario) are ignored here.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name of the tuning profile used when a guard does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A guard referenced a tuning profile that is not defined.
    #[error("unknown tuning profile: {name}")]
    UnknownProfile {
        /// The requested profile name.
        name: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level stealth configuration.
///
/// Mirrors the structure of `vigil-config.yaml`. Every section is optional
/// and falls back to the built-in defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StealthConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named tuning profiles. A `default` profile is always available.
    #[serde(default = "default_profiles")]
    pub tuning: BTreeMap<String, TuningConfig>,

    /// Loudness and range per noise tag.
    #[serde(default)]
    pub noise: NoiseTable,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            tuning: default_profiles(),
            noise: NoiseTable::default(),
        }
    }
}

impl StealthConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config
            .tuning
            .entry(DEFAULT_PROFILE.to_owned())
            .or_default();
        Ok(config)
    }

    /// Return a sanitised copy of the named tuning profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProfile`] if no profile has that name.
    pub fn tuning_profile(&self, name: &str) -> Result<TuningConfig, ConfigError> {
        self.tuning
            .get(name)
            .cloned()
            .map(TuningConfig::sanitized)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_owned(),
            })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A visibility multiplier applied when the target carries a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagModifier {
    /// Hierarchical tag, e.g. `State.Movement.Crouching`.
    pub tag: String,
    /// Factor applied to the target's visibility. Zero hides it completely.
    #[serde(default = "default_one")]
    pub multiplier: f32,
}

/// Per-guard tuning parameters.
///
/// Distances share the world's linear unit; rates are alert units per
/// second; times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    // --- Sight ---
    /// Gain per second while the target is within `sight_falloff_start`.
    #[serde(default = "default_base_sight_gain_rate")]
    pub base_sight_gain_rate: f32,

    /// Gain per second with the target at `sight_falloff_end`.
    #[serde(default = "default_sight_min_gain_rate")]
    pub sight_min_gain_rate: f32,

    /// Within this distance the gain is at its maximum.
    #[serde(default = "default_sight_falloff_start")]
    pub sight_falloff_start: f32,

    /// At this distance the gain reaches its minimum.
    #[serde(default = "default_sight_falloff_end")]
    pub sight_falloff_end: f32,

    /// Any positive gain inside this radius snaps alert to the maximum.
    #[serde(default = "default_instant_discovery_radius")]
    pub instant_discovery_radius: f32,

    // --- Distance thresholds ---
    /// Radius search behaviours sweep around the last known position.
    #[serde(default = "default_search_distance_threshold")]
    pub search_distance_threshold: f32,

    /// A maxed-out guard is only alerted while the target is this close.
    #[serde(default = "default_chase_distance_threshold")]
    pub chase_distance_threshold: f32,

    // --- Alert ---
    /// Alert value above which the guard becomes suspicious.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: f32,

    /// Visibility multipliers keyed by target tag.
    #[serde(default)]
    pub target_tag_modifiers: Vec<TagModifier>,

    // --- Hearing ---
    /// Alert added by a noise of strength 1.
    #[serde(default = "default_hearing_alert_add")]
    pub hearing_alert_add: f32,

    // --- Squad ---
    /// Alert added when a distant squad mate raises the alarm.
    #[serde(default = "default_squad_alert_add")]
    pub squad_alert_add: f32,

    /// Squad mates within this radius of the sender are fully alerted.
    #[serde(default = "default_squad_instant_alert_radius")]
    pub squad_instant_alert_radius: f32,

    // --- Decay ---
    /// Seconds without a stimulus before the alert starts to decay.
    #[serde(default = "default_grace_time")]
    pub grace_time: f32,

    /// Alert lost per second once decaying.
    #[serde(default = "default_decrease_rate")]
    pub decrease_rate: f32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            base_sight_gain_rate: default_base_sight_gain_rate(),
            sight_min_gain_rate: default_sight_min_gain_rate(),
            sight_falloff_start: default_sight_falloff_start(),
            sight_falloff_end: default_sight_falloff_end(),
            instant_discovery_radius: default_instant_discovery_radius(),
            search_distance_threshold: default_search_distance_threshold(),
            chase_distance_threshold: default_chase_distance_threshold(),
            suspicious_threshold: default_suspicious_threshold(),
            target_tag_modifiers: Vec::new(),
            hearing_alert_add: default_hearing_alert_add(),
            squad_alert_add: default_squad_alert_add(),
            squad_instant_alert_radius: default_squad_instant_alert_radius(),
            grace_time: default_grace_time(),
            decrease_rate: default_decrease_rate(),
        }
    }
}

impl TuningConfig {
    /// Clamp out-of-range values instead of rejecting the profile.
    ///
    /// Negative (or NaN) numbers become zero and a reversed falloff pair is
    /// swapped. Every correction is logged.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let fields: [(&str, &mut f32); 13] = [
            ("base_sight_gain_rate", &mut self.base_sight_gain_rate),
            ("sight_min_gain_rate", &mut self.sight_min_gain_rate),
            ("sight_falloff_start", &mut self.sight_falloff_start),
            ("sight_falloff_end", &mut self.sight_falloff_end),
            ("instant_discovery_radius", &mut self.instant_discovery_radius),
            ("search_distance_threshold", &mut self.search_distance_threshold),
            ("chase_distance_threshold", &mut self.chase_distance_threshold),
            ("suspicious_threshold", &mut self.suspicious_threshold),
            ("hearing_alert_add", &mut self.hearing_alert_add),
            ("squad_alert_add", &mut self.squad_alert_add),
            ("squad_instant_alert_radius", &mut self.squad_instant_alert_radius),
            ("grace_time", &mut self.grace_time),
            ("decrease_rate", &mut self.decrease_rate),
        ];
        for (field, value) in fields {
            if value.is_nan() || *value < 0.0 {
                warn!(field, value = *value, "Negative tuning value clamped to zero");
                *value = 0.0;
            }
        }

        if self.sight_falloff_end < self.sight_falloff_start {
            warn!(
                start = self.sight_falloff_start,
                end = self.sight_falloff_end,
                "Sight falloff range reversed, swapping"
            );
            std::mem::swap(&mut self.sight_falloff_start, &mut self.sight_falloff_end);
        }

        for modifier in &mut self.target_tag_modifiers {
            if modifier.multiplier.is_nan() || modifier.multiplier < 0.0 {
                warn!(
                    tag = %modifier.tag,
                    multiplier = modifier.multiplier,
                    "Negative tag multiplier clamped to zero"
                );
                modifier.multiplier = 0.0;
            }
        }

        self
    }
}

/// Loudness and audible range of one kind of noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Hearing strength delivered to listeners.
    #[serde(default = "default_one")]
    pub loudness: f32,

    /// Listeners farther away than this do not hear the noise.
    #[serde(default = "default_noise_max_range")]
    pub max_range: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            loudness: default_one(),
            max_range: default_noise_max_range(),
        }
    }
}

/// Noise settings keyed by noise tag (e.g. `Noise.Footstep.Run`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoiseTable(pub BTreeMap<String, NoiseConfig>);

impl NoiseTable {
    /// Settings for `tag`, falling back to [`NoiseConfig::default`] for
    /// unknown tags.
    pub fn lookup(&self, tag: &str) -> NoiseConfig {
        self.0.get(tag).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Default value functions (used by serde)
// ---------------------------------------------------------------------------

fn default_profiles() -> BTreeMap<String, TuningConfig> {
    BTreeMap::from([(DEFAULT_PROFILE.to_owned(), TuningConfig::default())])
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_one() -> f32 {
    1.0
}

const fn default_noise_max_range() -> f32 {
    1000.0
}

const fn default_base_sight_gain_rate() -> f32 {
    20.0
}

const fn default_sight_min_gain_rate() -> f32 {
    5.0
}

const fn default_sight_falloff_start() -> f32 {
    500.0
}

const fn default_sight_falloff_end() -> f32 {
    2000.0
}

const fn default_instant_discovery_radius() -> f32 {
    150.0
}

const fn default_search_distance_threshold() -> f32 {
    1600.0
}

const fn default_chase_distance_threshold() -> f32 {
    2000.0
}

const fn default_suspicious_threshold() -> f32 {
    20.0
}

const fn default_hearing_alert_add() -> f32 {
    25.0
}

const fn default_squad_alert_add() -> f32 {
    50.0
}

const fn default_squad_instant_alert_radius() -> f32 {
    500.0
}

const fn default_grace_time() -> f32 {
    2.0
}

const fn default_decrease_rate() -> f32 {
    5.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = StealthConfig::parse("{}").unwrap();
        assert_eq!(config.logging.level, "info");
        let tuning = config.tuning_profile(DEFAULT_PROFILE).unwrap();
        assert_eq!(tuning, TuningConfig::default());
    }

    #[test]
    fn partial_profile_fills_missing_fields() {
        let yaml = r"
tuning:
  sentry:
    base_sight_gain_rate: 40.0
    grace_time: 4.0
    target_tag_modifiers:
      - tag: State.Movement.Crouching
        multiplier: 0.5
";
        let config = StealthConfig::parse(yaml).unwrap();
        let sentry = config.tuning_profile("sentry").unwrap();
        assert!((sentry.base_sight_gain_rate - 40.0).abs() < f32::EPSILON);
        assert!((sentry.grace_time - 4.0).abs() < f32::EPSILON);
        assert!((sentry.decrease_rate - 5.0).abs() < f32::EPSILON);
        assert_eq!(sentry.target_tag_modifiers.len(), 1);
        // The default profile is still injected.
        assert!(config.tuning.contains_key(DEFAULT_PROFILE));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = StealthConfig::default();
        let err = config.tuning_profile("ghost").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { ref name } if name == "ghost"));
    }

    #[test]
    fn sanitized_clamps_negative_values() {
        let tuning = TuningConfig {
            decrease_rate: -3.0,
            hearing_alert_add: f32::NAN,
            target_tag_modifiers: vec![TagModifier {
                tag: "State.Visibility.Invisible".to_owned(),
                multiplier: -1.0,
            }],
            ..TuningConfig::default()
        }
        .sanitized();
        assert!(tuning.decrease_rate.abs() < f32::EPSILON);
        assert!(tuning.hearing_alert_add.abs() < f32::EPSILON);
        assert!(
            tuning
                .target_tag_modifiers
                .iter()
                .all(|m| m.multiplier.abs() < f32::EPSILON)
        );
    }

    #[test]
    fn sanitized_swaps_reversed_falloff() {
        let tuning = TuningConfig {
            sight_falloff_start: 2000.0,
            sight_falloff_end: 500.0,
            ..TuningConfig::default()
        }
        .sanitized();
        assert!((tuning.sight_falloff_start - 500.0).abs() < f32::EPSILON);
        assert!((tuning.sight_falloff_end - 2000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn noise_lookup_falls_back_to_default() {
        let yaml = r"
noise:
  Noise.Footstep.Run:
    loudness: 1.5
    max_range: 1200.0
";
        let config = StealthConfig::parse(yaml).unwrap();
        let run = config.noise.lookup("Noise.Footstep.Run");
        assert!((run.loudness - 1.5).abs() < f32::EPSILON);
        let unknown = config.noise.lookup("Noise.Sneeze");
        assert_eq!(unknown, NoiseConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = StealthConfig::parse("tuning: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
