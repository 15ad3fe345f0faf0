//! Access control table.
//!
//! The ACL maps a consumer identity to the set of fully-qualified operation
//! names (`"/telemetry.Biz/Add"`) it may invoke. It is loaded once at
//! startup from a JSON object of the form:
//!
//! ```json
//! {
//!     "logger":     ["/telemetry.Admin/Logging"],
//!     "stat":       ["/telemetry.Admin/Statistics"],
//!     "biz_user":   ["/telemetry.Biz/Check", "/telemetry.Biz/Add"],
//!     "biz_admin":  ["/telemetry.Biz/*"]
//! }
//! ```
//!
//! # Wildcards
//!
//! An entry `"<group>/*"` names every member of a group from the
//! [`GroupTable`]. It is expanded exactly once, at load time, into the
//! group's explicit operation names: the wildcard is replaced by the group's
//! primary (first) member and the remaining members are appended. After
//! load, [`AclTable::is_allowed`] is a plain set lookup.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

/// Suffix that marks a group wildcard rule.
pub const WILDCARD_SUFFIX: &str = "/*";

/// Group prefix for the business operations.
pub const BIZ_GROUP: &str = "/telemetry.Biz";

/// Group prefix for the admin (streaming) operations.
pub const ADMIN_GROUP: &str = "/telemetry.Admin";

/// Errors raised while loading the ACL or the group table.
#[derive(Debug, Error)]
pub enum AclError {
    /// Input is not a JSON object of string -> list of strings.
    #[error("ACL must be a JSON object mapping names to lists of strings: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A wildcard names a group that is not configured.
    #[error("Consumer {consumer} references unknown group {group}")]
    UnknownGroup { consumer: String, group: String },

    /// A consumer name is empty.
    #[error("ACL contains an empty consumer name")]
    EmptyConsumer,

    /// A rule string is empty.
    #[error("Consumer {consumer} has an empty rule")]
    InvalidRule { consumer: String },

    /// A group has no members, so it has no primary member.
    #[error("Group {0} has no members")]
    EmptyGroup(String),
}

/// One parsed ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclRule {
    /// An explicit operation name.
    Exact(String),
    /// Every member of the named group.
    Group(String),
}

impl AclRule {
    /// Parse a raw rule string.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix(WILDCARD_SUFFIX) {
            Some(group) => AclRule::Group(group.to_string()),
            None => AclRule::Exact(raw.to_string()),
        }
    }
}

/// Raw `name -> [string]` mapping shared by the ACL and group table inputs.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawMapping(HashMap<String, Vec<String>>);

/// Group membership used for wildcard expansion.
///
/// Maps a group prefix (e.g. `"/telemetry.Biz"`) to its ordered member
/// method names. The first member is the group's primary member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTable {
    groups: BTreeMap<String, Vec<String>>,
}

impl Default for GroupTable {
    /// The groups served by this process: `Biz` and `Admin`.
    fn default() -> Self {
        Self::new()
            .with_group(BIZ_GROUP, ["Add", "Check", "Test"])
            .with_group(ADMIN_GROUP, ["Logging", "Statistics"])
    }
}

impl GroupTable {
    /// Create an empty group table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    /// Add (or replace) a group.
    #[must_use]
    pub fn with_group<I, S>(mut self, prefix: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.insert(
            prefix.to_string(),
            members.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Load a group table from JSON (`{"<prefix>": ["Member", ...]}`).
    pub fn from_json(raw: &str) -> Result<Self, AclError> {
        let RawMapping(mapping) = serde_json::from_str(raw)?;
        let mut table = Self::new();
        for (prefix, members) in mapping {
            if members.is_empty() {
                return Err(AclError::EmptyGroup(prefix));
            }
            table.groups.insert(prefix, members);
        }
        Ok(table)
    }

    /// Fully-qualified operation names of a group, primary member first.
    pub fn operations(&self, prefix: &str) -> Option<Vec<String>> {
        self.groups.get(prefix).map(|members| {
            members
                .iter()
                .map(|member| format!("{prefix}/{member}"))
                .collect()
        })
    }

    /// Whether `operation` belongs to any configured group.
    pub fn contains_operation(&self, operation: &str) -> bool {
        operation
            .rsplit_once('/')
            .and_then(|(prefix, method)| {
                self.groups
                    .get(prefix)
                    .map(|members| members.iter().any(|m| m == method))
            })
            .unwrap_or(false)
    }

    /// Number of configured groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no groups are configured.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Expand one consumer's rule list into explicit operation names.
///
/// Order follows the documented convention: a wildcard is replaced in place
/// by the group's primary member and the rest of the group is appended at
/// the end. Duplicates are kept; the table deduplicates.
fn expand_rules(
    consumer: &str,
    rules: &[String],
    groups: &GroupTable,
) -> Result<Vec<String>, AclError> {
    let mut expanded = Vec::with_capacity(rules.len());
    let mut appended = Vec::new();

    for raw in rules {
        if raw.is_empty() {
            return Err(AclError::InvalidRule {
                consumer: consumer.to_string(),
            });
        }
        match AclRule::parse(raw) {
            AclRule::Exact(operation) => {
                if !groups.contains_operation(&operation) {
                    warn!(
                        target: "telemetry.acl",
                        consumer = %consumer,
                        operation = %operation,
                        "ACL grants an operation outside the configured groups"
                    );
                }
                expanded.push(operation);
            }
            AclRule::Group(group) => {
                let mut operations = groups
                    .operations(&group)
                    .ok_or_else(|| AclError::UnknownGroup {
                        consumer: consumer.to_string(),
                        group: group.clone(),
                    })?
                    .into_iter();
                let primary = operations
                    .next()
                    .ok_or_else(|| AclError::EmptyGroup(group.clone()))?;
                expanded.push(primary);
                appended.extend(operations);
            }
        }
    }

    expanded.extend(appended);
    Ok(expanded)
}

/// Immutable consumer -> permitted operations table.
#[derive(Debug, Clone, Default)]
pub struct AclTable {
    permissions: HashMap<String, HashSet<String>>,
}

impl AclTable {
    /// Parse and expand an ACL from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`AclError`] if the input is not a JSON object of
    /// string -> list of strings, or a wildcard names an unknown group.
    pub fn from_json(raw: &str, groups: &GroupTable) -> Result<Self, AclError> {
        let RawMapping(mapping) = serde_json::from_str(raw)?;
        Self::from_rules(mapping, groups)
    }

    /// Expand an already-decoded rule mapping.
    pub fn from_rules(
        rules: HashMap<String, Vec<String>>,
        groups: &GroupTable,
    ) -> Result<Self, AclError> {
        let mut permissions = HashMap::with_capacity(rules.len());
        for (consumer, consumer_rules) in rules {
            if consumer.is_empty() {
                return Err(AclError::EmptyConsumer);
            }
            let operations = expand_rules(&consumer, &consumer_rules, groups)?;
            permissions.insert(consumer, operations.into_iter().collect());
        }
        Ok(Self { permissions })
    }

    /// Whether `consumer` may invoke `operation`.
    pub fn is_allowed(&self, consumer: &str, operation: &str) -> bool {
        self.permissions
            .get(consumer)
            .is_some_and(|operations| operations.contains(operation))
    }

    /// Operations permitted for a consumer.
    pub fn permitted(&self, consumer: &str) -> Option<&HashSet<String>> {
        self.permissions.get(consumer)
    }

    /// Known consumer names.
    pub fn consumers(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    /// Number of consumers in the table.
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Whether the table has no consumers.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
