// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Allow/block topic policy.
//!
//! A topic is allowed when the allowlist is empty or any allow rule matches,
//! and no block rule matches. Rules are glob patterns (`*` and `?`) over the
//! topic name, optionally constrained by a type-name pattern.

use crate::types::TopicId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One allow or block rule.
///
/// In configuration a rule is either a bare string (name pattern) or a
/// mapping with `name` and optional `type`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicFilter {
    /// Pattern over the topic name only.
    Name(String),
    /// Patterns over name and type.
    NameAndType {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
    },
}

impl TopicFilter {
    pub fn name(pattern: impl Into<String>) -> Self {
        Self::Name(pattern.into())
    }

    /// Check whether this rule matches a topic.
    pub fn matches(&self, topic: &TopicId) -> bool {
        match self {
            Self::Name(pattern) => glob_match(pattern, &topic.name),
            Self::NameAndType { name, type_name } => {
                glob_match(name, &topic.name) && glob_match(type_name, &topic.type_name)
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(pattern) => f.write_str(pattern),
            Self::NameAndType { name, type_name } => write!(f, "{name} ({type_name})"),
        }
    }
}

/// Allow/block rule sets answering `is_allowed(topic)`.
///
/// Value type: equality is set-equality of the rule lists, irrespective of
/// order or duplicates.
#[derive(Debug, Clone, Default)]
pub struct AllowedTopicList {
    allowlist: Vec<TopicFilter>,
    blocklist: Vec<TopicFilter>,
}

impl AllowedTopicList {
    pub fn new(allowlist: Vec<TopicFilter>, blocklist: Vec<TopicFilter>) -> Self {
        Self {
            allowlist,
            blocklist,
        }
    }

    /// Empty allowlist (allow everything not blocked), empty blocklist.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether samples on `topic` may be forwarded.
    pub fn is_allowed(&self, topic: &TopicId) -> bool {
        let allowed =
            self.allowlist.is_empty() || self.allowlist.iter().any(|rule| rule.matches(topic));
        allowed && !self.blocklist.iter().any(|rule| rule.matches(topic))
    }

    pub fn allowlist(&self) -> &[TopicFilter] {
        &self.allowlist
    }

    pub fn blocklist(&self) -> &[TopicFilter] {
        &self.blocklist
    }
}

impl PartialEq for AllowedTopicList {
    fn eq(&self, other: &Self) -> bool {
        let as_sets = |list: &AllowedTopicList| {
            (
                list.allowlist.iter().cloned().collect::<BTreeSet<_>>(),
                list.blocklist.iter().cloned().collect::<BTreeSet<_>>(),
            )
        };
        as_sets(self) == as_sets(other)
    }
}

impl Eq for AllowedTopicList {}

impl fmt::Display for AllowedTopicList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allowed: [")?;
        for (i, rule) in self.allowlist.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rule}")?;
        }
        write!(f, "]; blocked: [")?;
        for (i, rule) in self.blocklist.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rule}")?;
        }
        write!(f, "]")
    }
}

/// Glob matching supporting `*` (any run) and `?` (any one character).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_recursive(&pattern, &text, 0, 0)
}

fn glob_match_recursive(pattern: &[char], text: &[char], pi: usize, ti: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }

    match pattern[pi] {
        '*' => {
            for i in ti..=text.len() {
                if glob_match_recursive(pattern, text, pi + 1, i) {
                    return true;
                }
            }
            false
        }
        '?' => {
            if ti < text.len() {
                glob_match_recursive(pattern, text, pi + 1, ti + 1)
            } else {
                false
            }
        }
        c => {
            if ti < text.len() && text[ti] == c {
                glob_match_recursive(pattern, text, pi + 1, ti + 1)
            } else {
                false
            }
        }
    }
}
