use crate::core::{RecordError, Result};
use serde::{Deserialize, Serialize};

/// How bulk RecordSet mutations are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every row is committed on its own.
    #[default]
    PerRow,
    /// The whole batch runs in one storage transaction.
    Transaction,
}

/// Data-access settings shared by every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Page size used when a page does not ask for one
    pub default_limit: usize,

    /// Largest page a caller may request; bigger limits are clamped
    pub max_limit: usize,

    pub batch_mode: BatchMode,

    /// Match patterns without regard to case
    pub pattern_case_insensitive: bool,
}

impl AccessConfig {
    pub fn new() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            batch_mode: BatchMode::PerRow,
            pattern_case_insensitive: true,
        }
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn pattern_case_insensitive(mut self, yes: bool) -> Self {
        self.pattern_case_insensitive = yes;
        self
    }

    /// Parse from JSON; omitted keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecordError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(RecordError::InvalidConfig("max_limit must be > 0".into()));
        }

        if self.default_limit > self.max_limit {
            return Err(RecordError::InvalidConfig(
                "default_limit cannot exceed max_limit".into(),
            ));
        }

        Ok(())
    }

    /// Effective page size for a requested limit; 0 means unbounded.
    pub fn clamp_limit(&self, requested: usize) -> Option<usize> {
        match requested {
            0 => None,
            n => Some(n.min(self.max_limit)),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::new()
    }
}
