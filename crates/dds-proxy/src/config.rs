// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Proxy configuration.
//!
//! Loaded from a versioned YAML document; programmatic construction is used
//! by tests. Configurations older than v4.0 are rejected.
//!
//! # Example YAML
//!
//! ```yaml
//! version: v4.0
//! participants:
//!   - kind: echo
//!     id: p0
//!   - kind: echo
//!     id: p1
//! allowlist: ["chatter"]
//! blocklist: []
//! builtin_topics:
//!   - name: chatter
//!     type: String
//! advanced_options:
//!   number_of_threads: 4
//! reload_time_ms: 0
//! timeout_ms: 0
//! ```

use crate::filter::{AllowedTopicList, TopicFilter};
use crate::participant::ParticipantKind;
use crate::types::{QosSnapshot, TopicId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Oldest configuration format still understood.
pub const MINIMUM_SUPPORTED_VERSION: (u32, u32) = (4, 0);
/// Version written by [`ProxyConfig::to_yaml`].
pub const LATEST_VERSION: &str = "v4.0";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration version {0} is no longer supported, update to v4.0")]
    UnsupportedVersion(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub kind: ParticipantKind,
    pub id: String,
    #[serde(default)]
    pub qos: QosSnapshot,
}

/// Tuning knobs with safe defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedOptions {
    /// Worker count of the forwarding thread pool. When absent, derived
    /// from the participant count.
    pub number_of_threads: Option<u32>,
}

/// Whole proxy configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Document format version, e.g. `v4.0`.
    pub version: Option<String>,

    pub participants: Vec<ParticipantConfig>,

    /// Topic patterns samples may be forwarded on. Empty means "everything
    /// not blocked".
    pub allowlist: Vec<TopicFilter>,

    pub blocklist: Vec<TopicFilter>,

    /// Topics bridged from startup, without waiting for discovery.
    pub builtin_topics: Vec<TopicId>,

    /// Raw transport profile XML, handed through to participants untouched.
    pub xml_configuration: Option<String>,

    pub advanced_options: AdvancedOptions,

    /// Period of configuration re-reads; 0 disables the periodic reload.
    pub reload_time_ms: u64,

    /// Maximum execution time; 0 means unbounded.
    pub timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            version: None,
            participants: Vec::new(),
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            builtin_topics: Vec::new(),
            xml_configuration: None,
            advanced_options: AdvancedOptions::default(),
            reload_time_ms: 0,
            timeout_ms: 0,
        }
    }
}

impl ProxyConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML. `from_yaml(to_yaml(c)) == c` for any valid
    /// configuration.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check version and semantic constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.version {
            Some(version) => {
                let (major, minor) = parse_version(version)
                    .ok_or_else(|| ConfigError::Invalid(format!("bad version tag: {version}")))?;
                if (major, minor) < MINIMUM_SUPPORTED_VERSION {
                    return Err(ConfigError::UnsupportedVersion(version.clone()));
                }
            }
            None => {
                tracing::warn!(
                    "no configuration version given, assuming {LATEST_VERSION}; \
                     add a version tag to keep forward compatibility"
                );
            }
        }

        let mut seen = HashSet::new();
        for participant in &self.participants {
            if participant.id.is_empty() {
                return Err(ConfigError::Invalid("participant id is empty".into()));
            }
            if !seen.insert(participant.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "participant ids must be unique, {} is duplicated",
                    participant.id
                )));
            }
        }

        if let Some(threads) = self.advanced_options.number_of_threads {
            if threads == 0 {
                return Err(ConfigError::Invalid(
                    "number_of_threads must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }

    /// Worker count: configured value, or derived from the participant
    /// count.
    pub fn number_of_threads(&self) -> usize {
        match self.advanced_options.number_of_threads {
            Some(threads) => threads as usize,
            None => self.participants.len().max(2),
        }
    }

    /// Build the topic policy this configuration describes.
    pub fn allowed_topics(&self) -> AllowedTopicList {
        AllowedTopicList::new(self.allowlist.clone(), self.blocklist.clone())
    }
}

fn parse_version(tag: &str) -> Option<(u32, u32)> {
    let digits = tag.strip_prefix('v').unwrap_or(tag);
    let (major, minor) = digits.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
