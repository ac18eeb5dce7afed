//! Service configuration, loaded from TOML.
//!
//! ```toml
//! [storage]
//! path = "data/assets.db"
//!
//! [approval]
//! max_chain_depth = 2
//! skip_request_types = ["return"]
//! fallback_approvers = ["user_it_lead"]
//! ```
use crate::error::ConfigError;
use crate::status::RequestType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.approval.max_chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "approval.max_chain_depth must be at least 1".into(),
            ));
        }
        if self
            .approval
            .fallback_approvers
            .iter()
            .any(|a| a.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "approval.fallback_approvers must not contain blank entries".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/assets.db")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalConfig {
    /// Levels of the requester's reporting chain that must approve
    #[serde(default = "default_chain_depth")]
    pub max_chain_depth: usize,
    /// Request types that never need approval
    #[serde(default)]
    pub skip_request_types: Vec<RequestType>,
    /// Approvers used when the requester has no reporting chain
    #[serde(default)]
    pub fallback_approvers: Vec<String>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_chain_depth(),
            skip_request_types: vec![],
            fallback_approvers: vec![],
        }
    }
}

fn default_chain_depth() -> usize {
    2
}
