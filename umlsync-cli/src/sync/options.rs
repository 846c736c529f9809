//! Reconciliation policy knobs

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How model tags are written onto external tag rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TagStrategy {
    /// Overwrite keys the model sets to a value, insert missing ones; never removes
    #[default]
    Update,
    /// Like `update`, but every model key is written, empty values included
    Upsert,
    /// Make the external tag set exactly the model's; the only strategy that removes rows
    Replace,
}

/// Version increment applied to updated records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VersionStep {
    #[default]
    None,
    Minor,
    Major,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub tag_strategy: TagStrategy,
    /// Create external records for model entities with no counterpart
    pub allow_insert: bool,
    /// Remove external records of managed kinds that the model no longer has
    pub allow_delete: bool,
    pub version_step: VersionStep,
}

impl ReconcileOptions {
    pub fn with_tag_strategy(mut self, strategy: TagStrategy) -> Self {
        self.tag_strategy = strategy;
        self
    }

    pub fn inserting(mut self) -> Self {
        self.allow_insert = true;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.allow_delete = true;
        self
    }

    pub fn with_version_step(mut self, step: VersionStep) -> Self {
        self.version_step = step;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_toml_defaults() {
        let options: ReconcileOptions = toml::from_str("tag_strategy = \"replace\"\nallow_insert = true").unwrap();

        assert_eq!(options.tag_strategy, TagStrategy::Replace);
        assert!(options.allow_insert);
        assert!(!options.allow_delete);
        assert_eq!(options.version_step, VersionStep::None);
    }
}
