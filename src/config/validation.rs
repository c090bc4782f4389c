use std::collections::{HashMap, HashSet};
use log::{debug, error};
use thiserror::Error;

use super::{StakingConfig, COMMISSION_BASE};

/// Error type for configuration validation issues
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Incompatible settings: {0}")]
    IncompatibleSettings(String),

    #[error("Missing required setting for: {0}")]
    MissingRequiredSetting(String),

    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),
}

/// Result of configuration validation
#[derive(Debug)]
pub struct ValidationResult {
    /// Whether the validation passed
    pub is_valid: bool,

    /// List of errors found during validation
    pub errors: Vec<ConfigValidationError>,

    /// List of warnings (valid but not recommended)
    pub warnings: Vec<String>,

    /// Suggested fixes for validation issues
    pub suggested_fixes: HashMap<String, String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggested_fixes: HashMap::new(),
        }
    }

    pub fn add_error(&mut self, error: ConfigValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_suggested_fix(&mut self, setting: &str, suggestion: String) {
        self.suggested_fixes.insert(setting.to_string(), suggestion);
    }

    /// Return a summary of validation issues
    pub fn get_summary(&self) -> String {
        if self.is_valid && self.warnings.is_empty() {
            return "Configuration is valid with no warnings.".to_string();
        }

        let mut result = String::new();

        if !self.is_valid {
            result.push_str(&format!("Configuration has {} errors:\n", self.errors.len()));
            for (i, error) in self.errors.iter().enumerate() {
                result.push_str(&format!("  {}. {}\n", i + 1, error));
            }
        } else {
            result.push_str("Configuration is valid but has warnings.\n");
        }

        if !self.warnings.is_empty() {
            result.push_str(&format!("\nWarnings ({}):\n", self.warnings.len()));
            for (i, warning) in self.warnings.iter().enumerate() {
                result.push_str(&format!("  {}. {}\n", i + 1, warning));
            }
        }

        if !self.suggested_fixes.is_empty() {
            result.push_str("\nSuggested fixes:\n");
            let mut fixes: Vec<_> = self.suggested_fixes.iter().collect();
            fixes.sort();
            for (setting, suggestion) in fixes {
                result.push_str(&format!("  - {}: {}\n", setting, suggestion));
            }
        }

        result
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration validation rule
pub trait ValidationRule {
    fn name(&self) -> &str;

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError>;

    fn description(&self) -> &str;

    /// Suggest a fix for validation failures
    fn suggest_fix(&self, config: &StakingConfig) -> Option<HashMap<String, String>>;
}

/// Applies a set of rules to a staking configuration
pub struct ConfigValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ConfigValidator {
    /// Create a validator with the default rules
    pub fn new() -> Self {
        let mut validator = Self { rules: Vec::new() };

        validator.add_rule(Box::new(CommissionBoundsRule));
        validator.add_rule(Box::new(StakeFloorRule));
        validator.add_rule(Box::new(EpochLengthRule));
        validator.add_rule(Box::new(ValidatorSetSizeRule));
        validator.add_rule(Box::new(LivenessDecayRule));
        validator.add_rule(Box::new(GovernanceIdentityRule));
        validator.add_rule(Box::new(GenesisValidatorRule));

        validator
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, config: &StakingConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        for rule in &self.rules {
            match rule.validate(config) {
                Ok(()) => {
                    debug!("Validation rule '{}' passed", rule.name());
                }
                Err(err) => {
                    error!("Validation rule '{}' failed: {}", rule.name(), err);
                    result.add_error(err);

                    if let Some(fixes) = rule.suggest_fix(config) {
                        for (setting, suggestion) in fixes {
                            result.add_suggested_fix(&setting, suggestion);
                        }
                    }
                }
            }
        }

        let params = &config.params;
        if params.slash_penalty == 0 {
            result.add_warning("slash_penalty is 0, slashing only jails validators".to_string());
        }
        if params.lock_period == 0 {
            result.add_warning("lock_period is 0, unstaked funds can be withdrawn immediately".to_string());
        }
        if params.epoch_length > 0 && params.remainder_flush_interval % params.epoch_length != 0 {
            result.add_warning(format!(
                "remainder_flush_interval {} is not a multiple of epoch_length {}, flushes happen at the next epoch block",
                params.remainder_flush_interval, params.epoch_length
            ));
        }
        if config.governance.admin == config.governance.emergency_admin {
            result.add_warning("admin and emergency_admin are the same identity".to_string());
        }

        result
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Default and maximum commission must fit inside the commission base
struct CommissionBoundsRule;

impl ValidationRule for CommissionBoundsRule {
    fn name(&self) -> &str {
        "CommissionBounds"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        let params = &config.params;
        if params.max_commission_rate > COMMISSION_BASE {
            return Err(ConfigValidationError::ValueOutOfRange(format!(
                "max_commission_rate {} exceeds {}",
                params.max_commission_rate, COMMISSION_BASE
            )));
        }
        if params.default_commission_rate > params.max_commission_rate {
            return Err(ConfigValidationError::IncompatibleSettings(format!(
                "default_commission_rate {} exceeds max_commission_rate {}",
                params.default_commission_rate, params.max_commission_rate
            )));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates that commission rates are expressed in basis points and ordered"
    }

    fn suggest_fix(&self, config: &StakingConfig) -> Option<HashMap<String, String>> {
        let mut fixes = HashMap::new();
        fixes.insert(
            "params.default_commission_rate".to_string(),
            format!(
                "Set a default at or below {}",
                config.params.max_commission_rate.min(COMMISSION_BASE)
            ),
        );
        Some(fixes)
    }
}

/// Stake floors must be positive and ordered
struct StakeFloorRule;

impl ValidationRule for StakeFloorRule {
    fn name(&self) -> &str {
        "StakeFloor"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        let params = &config.params;
        if params.min_delegator_stake == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "min_delegator_stake must be greater than 0".to_string(),
            ));
        }
        if params.min_validator_stake < params.min_delegator_stake {
            return Err(ConfigValidationError::IncompatibleSettings(format!(
                "min_validator_stake {} is below min_delegator_stake {}",
                params.min_validator_stake, params.min_delegator_stake
            )));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates the minimum delegation and minimum validator stake"
    }

    fn suggest_fix(&self, config: &StakingConfig) -> Option<HashMap<String, String>> {
        let mut fixes = HashMap::new();
        fixes.insert(
            "params.min_validator_stake".to_string(),
            format!(
                "Use a value of at least {}",
                config.params.min_delegator_stake.max(1)
            ),
        );
        Some(fixes)
    }
}

struct EpochLengthRule;

impl ValidationRule for EpochLengthRule {
    fn name(&self) -> &str {
        "EpochLength"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        if config.params.epoch_length == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "epoch_length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates that epochs have a positive length"
    }

    fn suggest_fix(&self, _config: &StakingConfig) -> Option<HashMap<String, String>> {
        let mut fixes = HashMap::new();
        fixes.insert("params.epoch_length".to_string(), "Use 200 blocks".to_string());
        Some(fixes)
    }
}

struct ValidatorSetSizeRule;

impl ValidationRule for ValidatorSetSizeRule {
    fn name(&self) -> &str {
        "ValidatorSetSize"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        if config.params.max_validator_num == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_validator_num must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates the candidate set bound"
    }

    fn suggest_fix(&self, _config: &StakingConfig) -> Option<HashMap<String, String>> {
        None
    }
}

/// Decay must forgive at least one missed block per run
struct LivenessDecayRule;

impl ValidationRule for LivenessDecayRule {
    fn name(&self) -> &str {
        "LivenessDecay"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        let liveness = &config.liveness;
        if liveness.slash_threshold == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "slash_threshold must be greater than 0".to_string(),
            ));
        }
        if liveness.decrease_rate == 0 || liveness.decrease_rate > liveness.slash_threshold {
            return Err(ConfigValidationError::ValueOutOfRange(format!(
                "decrease_rate {} must be in 1..={}",
                liveness.decrease_rate, liveness.slash_threshold
            )));
        }
        if liveness.decay_interval_epochs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "decay_interval_epochs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates missed-block threshold and decay settings"
    }

    fn suggest_fix(&self, config: &StakingConfig) -> Option<HashMap<String, String>> {
        let mut fixes = HashMap::new();
        fixes.insert(
            "liveness.decrease_rate".to_string(),
            format!("Use a value between 1 and {}", config.liveness.slash_threshold.max(1)),
        );
        Some(fixes)
    }
}

struct GovernanceIdentityRule;

impl ValidationRule for GovernanceIdentityRule {
    fn name(&self) -> &str {
        "GovernanceIdentity"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        if config.governance.admin.is_zero() {
            return Err(ConfigValidationError::MissingRequiredSetting(
                "governance.admin".to_string(),
            ));
        }
        if config.governance.emergency_admin.is_zero() {
            return Err(ConfigValidationError::MissingRequiredSetting(
                "governance.emergency_admin".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates that privileged identities are set"
    }

    fn suggest_fix(&self, _config: &StakingConfig) -> Option<HashMap<String, String>> {
        None
    }
}

/// Genesis validators must be unique, funded and within commission bounds
struct GenesisValidatorRule;

impl ValidationRule for GenesisValidatorRule {
    fn name(&self) -> &str {
        "GenesisValidators"
    }

    fn validate(&self, config: &StakingConfig) -> Result<(), ConfigValidationError> {
        let mut seen = HashSet::new();
        for validator in &config.genesis {
            if !seen.insert(validator.address) {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "duplicate genesis validator {}",
                    validator.address
                )));
            }
            if validator.stake < config.params.min_validator_stake {
                return Err(ConfigValidationError::ValueOutOfRange(format!(
                    "genesis validator {} stakes {}, minimum is {}",
                    validator.address, validator.stake, config.params.min_validator_stake
                )));
            }
            if let Some(rate) = validator.commission_rate {
                if rate > config.params.max_commission_rate {
                    return Err(ConfigValidationError::ValueOutOfRange(format!(
                        "genesis validator {} commission {} exceeds {}",
                        validator.address, rate, config.params.max_commission_rate
                    )));
                }
            }
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Validates genesis validator entries"
    }

    fn suggest_fix(&self, config: &StakingConfig) -> Option<HashMap<String, String>> {
        let mut fixes = HashMap::new();
        fixes.insert(
            "genesis".to_string(),
            format!(
                "Give every genesis validator a unique address and at least {} stake",
                config.params.min_validator_stake
            ),
        );
        Some(fixes)
    }
}
