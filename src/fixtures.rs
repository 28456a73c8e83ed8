#![forbid(unsafe_code)]

//! Seeding of repositories and users from a TOML fixture file.
//!
//! ```toml
//! [[repositories]]
//! id = "us-005578"
//! name = "United States Holocaust Memorial Museum"
//!
//! [[users]]
//! id = "mike"
//! name = "Mike"
//! email = "mike@example.org"
//! ```
//!
//! Keys other than `id` and `name` are stored as string properties.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{GraphStore, NodeSpec, StoreError};
use crate::types::{NodeKind, Props};

/// Error raised while loading fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("failed to read fixtures {}: {source}", path.display())]
    Read {
        /// Fixture file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The fixture file is not valid TOML or has the wrong shape.
    #[error("failed to parse fixtures: {0}")]
    Parse(#[from] toml::de::Error),
    /// An entry is unusable.
    #[error("invalid fixture: {0}")]
    Invalid(String),
    /// The store rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One repository or user entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IdentityFixture {
    /// External id the importer resolves.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Any further string fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl IdentityFixture {
    fn props(&self) -> Props {
        let mut props = Props::new();
        if let Some(name) = &self.name {
            props.insert("name".into(), name.clone().into());
        }
        for (key, value) in &self.extra {
            props.insert(key.clone(), value.clone().into());
        }
        props
    }
}

/// Parsed fixture file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct FixtureSet {
    /// Repositories to create.
    #[serde(default)]
    pub repositories: Vec<IdentityFixture>,
    /// Users to create.
    #[serde(default)]
    pub users: Vec<IdentityFixture>,
}

impl FixtureSet {
    /// Parses fixtures from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, FixtureError> {
        let set: FixtureSet = toml::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Reads and parses a fixture file.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), FixtureError> {
        for (label, entries) in [("repository", &self.repositories), ("user", &self.users)] {
            let mut seen = HashSet::new();
            for entry in entries {
                if entry.id.trim().is_empty() {
                    return Err(FixtureError::Invalid(format!("{label} with empty id")));
                }
                if !seen.insert(entry.id.as_str()) {
                    return Err(FixtureError::Invalid(format!(
                        "duplicate {label} id '{}'",
                        entry.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = (NodeKind, &IdentityFixture)> {
        self.repositories
            .iter()
            .map(|entry| (NodeKind::Repository, entry))
            .chain(self.users.iter().map(|entry| (NodeKind::UserProfile, entry)))
    }
}

/// Outcome of applying fixtures.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FixtureSummary {
    /// Identities created.
    pub created: u64,
    /// Identities already present and left untouched.
    pub existing: u64,
}

/// Writes `fixtures` in one transaction, skipping identities already present.
pub fn apply_fixtures(
    store: &mut dyn GraphStore,
    fixtures: &FixtureSet,
) -> Result<FixtureSummary, FixtureError> {
    store.begin()?;
    match write_all(store, fixtures) {
        Ok(summary) => {
            store.commit()?;
            info!(
                created = summary.created,
                existing = summary.existing,
                "fixtures.loaded"
            );
            Ok(summary)
        }
        Err(err) => {
            if let Err(rollback) = store.rollback() {
                warn!(error = %rollback, "fixtures.rollback_failed");
            }
            Err(err)
        }
    }
}

fn write_all(
    store: &mut dyn GraphStore,
    fixtures: &FixtureSet,
) -> Result<FixtureSummary, FixtureError> {
    let mut summary = FixtureSummary::default();
    for (kind, entry) in fixtures.entries() {
        if store.find_node(kind, &entry.id)?.is_some() {
            debug!(kind = %kind, id = %entry.id, "fixtures.exists");
            summary.existing += 1;
            continue;
        }
        let props = entry.props();
        store.create_node(NodeSpec {
            kind,
            ext_ref: &entry.id,
            scope: None,
            props: &props,
        })?;
        summary.created += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const SAMPLE: &str = r#"
        [[repositories]]
        id = "r1"
        name = "Repository One"

        [[users]]
        id = "u1"
        name = "User One"
        email = "u1@example.org"
    "#;

    #[test]
    fn parses_extra_fields_as_properties() {
        let set = FixtureSet::from_toml(SAMPLE).expect("valid fixtures");
        assert_eq!(set.repositories.len(), 1);
        let user = &set.users[0];
        assert_eq!(user.extra.get("email").map(String::as_str), Some("u1@example.org"));
        let props = user.props();
        assert_eq!(props.get("name").and_then(|v| v.as_str()), Some("User One"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = FixtureSet::from_toml(
            r#"
            [[users]]
            id = "u1"
            [[users]]
            id = "u1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::Invalid(_)));
    }

    #[test]
    fn loading_twice_is_idempotent() -> Result<(), FixtureError> {
        let set = FixtureSet::from_toml(SAMPLE)?;
        let mut store = MemoryStore::new();
        let first = apply_fixtures(&mut store, &set)?;
        let second = apply_fixtures(&mut store, &set)?;
        assert_eq!(first, FixtureSummary { created: 2, existing: 0 });
        assert_eq!(second, FixtureSummary { created: 0, existing: 2 });
        assert_eq!(store.count_nodes(NodeKind::Repository)?, 1);
        assert_eq!(store.count_nodes(NodeKind::UserProfile)?, 1);
        Ok(())
    }
}
