use gemscope_domain::services::classifier::{ClassifierConfig, LabelRule};
use gemscope_domain::services::features::FeatureConfig;
use gemscope_domain::services::rl::{RewardConfig, RlConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every section is optional; omitted sections and fields take their defaults.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub features: FeatureConfig,
    pub label: LabelRule,
    pub classifier: ClassifierConfig,
    pub rl: RlConfig,
    pub reward: RewardConfig,
    pub service: ServiceConfig,
    pub guard: GuardConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Blend weights for classifier and RL confidence; normalized at use.
    pub classifier_weight: f64,
    pub rl_weight: f64,
    pub min_position_percent: f64,
    pub max_position_percent: f64,
    /// Symbols remembered for pairing outcomes with their entry state.
    pub entry_cache_capacity: usize,
    /// Recent outcomes covered by the live win rate / average return.
    pub live_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            classifier_weight: 0.5,
            rl_weight: 0.5,
            min_position_percent: 0.5,
            max_position_percent: 10.0,
            entry_cache_capacity: 1_024,
            live_window: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    pub enabled: bool,
    pub novelty_confidence_threshold: f64,
    pub novelty_threshold: f64,
    pub novelty_confidence_factor: f64,
    pub novelty_position_factor: f64,
    pub headwind_threshold: f64,
    pub headwind_confidence_factor: f64,
    pub headwind_position_factor: f64,
    pub late_surge_threshold: f64,
    pub surge_age_threshold: f64,
    pub late_surge_confidence_factor: f64,
    pub late_surge_position_factor: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            novelty_confidence_threshold: 0.7,
            novelty_threshold: 0.7,
            novelty_confidence_factor: 0.7,
            novelty_position_factor: 0.5,
            headwind_threshold: 0.6,
            headwind_confidence_factor: 0.8,
            headwind_position_factor: 0.5,
            late_surge_threshold: 0.6,
            surge_age_threshold: 0.6,
            late_surge_confidence_factor: 0.8,
            late_surge_position_factor: 0.6,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Most recent records used per pass; older ones are dropped.
    pub max_records: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_records: 50_000,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    validate(&config).map_err(|err| format!("invalid config {}: {}", path.display(), err))?;
    Ok((config, contents))
}

pub fn to_toml_pretty(config: &Config) -> Result<String, String> {
    toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config as TOML: {err}"))
}

pub fn validate(config: &Config) -> Result<(), String> {
    config.features.validate()?;
    config.label.validate()?;
    config.classifier.validate()?;
    config.rl.validate()?;
    config.reward.validate()?;

    let service = &config.service;
    for (name, value) in [
        ("classifier_weight", service.classifier_weight),
        ("rl_weight", service.rl_weight),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(format!("service.{name} must be >= 0"));
        }
    }
    if service.classifier_weight + service.rl_weight <= 0.0 {
        return Err("service weights must not both be zero".to_string());
    }
    if !(0.0 <= service.min_position_percent
        && service.min_position_percent <= service.max_position_percent
        && service.max_position_percent <= 100.0)
    {
        return Err(
            "service position bounds must satisfy 0 <= min <= max <= 100".to_string(),
        );
    }
    if service.live_window == 0 {
        return Err("service.live_window must be > 0".to_string());
    }

    let guard = &config.guard;
    for (name, value) in [
        ("novelty_confidence_threshold", guard.novelty_confidence_threshold),
        ("novelty_threshold", guard.novelty_threshold),
        ("novelty_confidence_factor", guard.novelty_confidence_factor),
        ("novelty_position_factor", guard.novelty_position_factor),
        ("headwind_threshold", guard.headwind_threshold),
        ("headwind_confidence_factor", guard.headwind_confidence_factor),
        ("headwind_position_factor", guard.headwind_position_factor),
        ("late_surge_threshold", guard.late_surge_threshold),
        ("surge_age_threshold", guard.surge_age_threshold),
        ("late_surge_confidence_factor", guard.late_surge_confidence_factor),
        ("late_surge_position_factor", guard.late_surge_position_factor),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("guard.{name} must be within [0, 1]"));
        }
    }

    if config.training.max_records == 0 {
        return Err("training.max_records must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{to_toml_pretty, validate, Config};

    fn parse_config(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("config should parse")
    }

    #[test]
    fn parse_config_rejects_malformed_toml() {
        let err = toml::from_str::<Config>("[rl\nepochs = 1").expect_err("malformed");
        let msg = err.to_string();
        assert!(!msg.is_empty());
    }

    #[test]
    fn parse_config_rejects_unknown_fields() {
        let toml_str = r#"
[classifier]
epochs = 10
unknown_field = 123
"#;
        let err = toml::from_str::<Config>(toml_str).expect_err("unknown field should fail");
        assert!(err.to_string().to_lowercase().contains("unknown field"));
    }

    #[test]
    fn parse_config_rejects_unknown_sections() {
        let err = toml::from_str::<Config>("[dashboard]\nport = 80\n").expect_err("unknown section");
        assert!(err.to_string().to_lowercase().contains("unknown field"));
    }

    #[test]
    fn empty_document_is_the_default_config() {
        let config = parse_config("");
        assert_eq!(config, Config::default());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[features.ecosystem_priors]
UNI = 0.9

[label]
horizon_days = 14

[classifier]
gem_threshold = 0.65

[rl]
epochs = 10
epsilon_end = 0.1

[service]
classifier_weight = 0.7
rl_weight = 0.3

[guard]
enabled = false
"#;
        let config = parse_config(toml_str);
        assert_eq!(config.features.ecosystem_priors.get("UNI"), Some(&0.9));
        assert_eq!(config.label.horizon_days, 14);
        assert_eq!(config.classifier.gem_threshold, 0.65);
        assert_eq!(config.classifier.epochs, 300);
        assert_eq!(config.rl.epochs, 10);
        assert_eq!(config.service.rl_weight, 0.3);
        assert!(!config.guard.enabled);
        assert_eq!(config.training.max_records, 50_000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_inverted_position_bounds() {
        let mut config = Config::default();
        config.service.min_position_percent = 20.0;
        config.service.max_position_percent = 10.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_zero_blend_weights() {
        let mut config = Config::default();
        config.service.classifier_weight = 0.0;
        config.service.rl_weight = 0.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn pretty_toml_parses_back() {
        let config = Config::default();
        let text = to_toml_pretty(&config).expect("serialize");
        let parsed = parse_config(&text);
        assert_eq!(parsed, config);
    }
}
