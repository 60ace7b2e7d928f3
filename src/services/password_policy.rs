//! Pure password-policy validation and compliant-password generation,
//! driven by the `password.*` settings catalogue.

use std::collections::HashMap;

use chrono::Duration;
use rand::Rng;
use thiserror::Error;

/// The only special characters the policy recognises.
pub const SPECIAL_CHARACTERS: &str = "!@#$%&*.";

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";

/// Fatal at construction; a policy that cannot be built must abort boot.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("missing password setting: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("password policy enables no character classes")]
    EmptyCharacterSet,

    #[error("invalid length bounds: min {min} exceeds max {max}")]
    InvalidLengthBounds { min: usize, max: usize },

    #[error("lockout threshold must be at least 1, got {0}")]
    InvalidLockoutThreshold(i32),
}

/// Parsed, validated policy. Built once from the settings rows at boot and
/// injected wherever passwords are checked or generated.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    min_length: usize,
    max_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_numbers: bool,
    require_special_characters: bool,
    max_failed_attempts: i32,
    history_size: u64,
    lockout_duration_minutes: i64,
}

impl PasswordPolicy {
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, PolicyError> {
        let policy = Self {
            min_length: parse_value(settings, "password.min_length")?,
            max_length: parse_value(settings, "password.max_length")?,
            require_uppercase: parse_value(settings, "password.require_uppercase")?,
            require_lowercase: parse_value(settings, "password.require_lowercase")?,
            require_numbers: parse_value(settings, "password.require_numbers")?,
            require_special_characters: parse_value(
                settings,
                "password.require_special_characters",
            )?,
            max_failed_attempts: parse_value(
                settings,
                "password.num_failed_attempts_before_lockout",
            )?,
            history_size: parse_value(settings, "password.history_size")?,
            lockout_duration_minutes: parse_value(settings, "password.lockout_duration")?,
        };

        if policy.min_length > policy.max_length {
            return Err(PolicyError::InvalidLengthBounds {
                min: policy.min_length,
                max: policy.max_length,
            });
        }
        if policy.max_failed_attempts < 1 {
            return Err(PolicyError::InvalidLockoutThreshold(
                policy.max_failed_attempts,
            ));
        }
        if policy.alphabet().is_empty() {
            return Err(PolicyError::EmptyCharacterSet);
        }

        Ok(policy)
    }

    /// Pure check against the policy; no I/O. History checks live in the
    /// password-change engine.
    #[must_use]
    pub fn is_valid(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }

        let length = candidate.chars().count();
        if length < self.min_length || length > self.max_length {
            return false;
        }

        if self.require_uppercase && !candidate.chars().any(|c| c.is_ascii_uppercase()) {
            return false;
        }

        if self.require_lowercase && !candidate.chars().any(|c| c.is_ascii_lowercase()) {
            return false;
        }

        if self.require_numbers && !candidate.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }

        if self.require_special_characters
            && !candidate.chars().any(|c| SPECIAL_CHARACTERS.contains(c))
        {
            return false;
        }

        true
    }

    /// Generates a compliant password of exactly `min_length` characters,
    /// drawn uniformly from the enabled classes and regenerated until it
    /// passes validation. Construction guarantees a non-empty alphabet.
    #[must_use]
    pub fn generate(&self) -> String {
        let alphabet = self.alphabet();
        let mut rng = rand::rng();

        loop {
            let candidate: String = (0..self.min_length)
                .map(|_| alphabet[rng.random_range(0..alphabet.len())])
                .collect();

            if self.is_valid(&candidate) {
                return candidate;
            }
        }
    }

    #[must_use]
    pub const fn max_failed_attempts(&self) -> i32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub const fn history_size(&self) -> u64 {
        self.history_size
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_duration_minutes)
    }

    fn alphabet(&self) -> Vec<char> {
        let mut alphabet = Vec::new();
        if self.require_uppercase {
            alphabet.extend(UPPERCASE.chars());
        }
        if self.require_lowercase {
            alphabet.extend(LOWERCASE.chars());
        }
        if self.require_numbers {
            alphabet.extend(DIGITS.chars());
        }
        if self.require_special_characters {
            alphabet.extend(SPECIAL_CHARACTERS.chars());
        }
        alphabet
    }
}

fn parse_value<T: std::str::FromStr>(
    settings: &HashMap<String, String>,
    key: &'static str,
) -> Result<T, PolicyError> {
    let raw = settings.get(key).ok_or(PolicyError::MissingKey(key))?;
    raw.parse().map_err(|_| PolicyError::InvalidValue {
        key,
        value: raw.clone(),
    })
}
