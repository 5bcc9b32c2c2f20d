//! Stray key map.
//!
//! Per target instance, the set of identity keys present in the target but
//! not matched by any directory identity. The engine owns one map per pass.
//! Persisted maps are an audit artifact in a tabular format with the columns
//! `type,username,domain,umapi`; an empty `umapi` means the primary instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use usersync_core::{IdentityKey, IdentityType, InstanceId};

use crate::error::RuleResult;

/// One persisted stray row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrayRow {
    #[serde(rename = "type")]
    pub identity_type: String,
    pub username: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub umapi: Option<String>,
}

/// A stray key together with its instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrayEntry {
    pub instance: InstanceId,
    pub key: IdentityKey,
}

/// Per-instance sets of unmatched identity keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrayKeyMap {
    sets: BTreeMap<InstanceId, BTreeSet<IdentityKey>>,
}

impl StrayKeyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure an instance has a (possibly empty) set.
    pub fn ensure_instance(&mut self, instance: &InstanceId) {
        self.sets.entry(instance.clone()).or_default();
    }

    /// Add a candidate key. Returns `false` if it was already present.
    pub fn insert(&mut self, instance: &InstanceId, key: IdentityKey) -> bool {
        self.sets.entry(instance.clone()).or_default().insert(key)
    }

    /// Replace the content with the given rows.
    ///
    /// Missing `domain` is an empty key component and missing `umapi` the
    /// primary instance. Rows with an unknown type or no username are skipped
    /// with a warning. Returns the number of keys loaded.
    pub fn load<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = StrayRow>,
    {
        self.sets.clear();
        let mut loaded = 0;
        for row in rows {
            let identity_type = match row.identity_type.parse::<IdentityType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!(username = %row.username, "Skipping stray row: {e}");
                    continue;
                }
            };
            if row.username.trim().is_empty() {
                warn!(identity_type = %identity_type, "Skipping stray row without username");
                continue;
            }
            let key = IdentityKey::new(identity_type, &row.username, row.domain.as_deref());
            let instance = InstanceId::from_column(row.umapi.as_deref());
            if self.insert(&instance, key) {
                loaded += 1;
            }
        }
        loaded
    }

    /// Remove a key from an instance's set. No-op when absent.
    pub fn mark_matched(&mut self, instance: &InstanceId, key: &IdentityKey) -> bool {
        self.sets
            .get_mut(instance)
            .is_some_and(|set| set.remove(key))
    }

    #[must_use]
    pub fn contains(&self, instance: &InstanceId, key: &IdentityKey) -> bool {
        self.sets.get(instance).is_some_and(|set| set.contains(key))
    }

    /// Current per-instance sets.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<InstanceId, BTreeSet<IdentityKey>> {
        self.sets.clone()
    }

    /// Keys of one instance.
    #[must_use]
    pub fn instance(&self, instance: &InstanceId) -> Option<&BTreeSet<IdentityKey>> {
        self.sets.get(instance)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceId> {
        self.sets.keys()
    }

    /// Every entry, ordered by instance then key.
    pub fn entries(&self) -> impl Iterator<Item = StrayEntry> + '_ {
        self.sets.iter().flat_map(|(instance, keys)| {
            keys.iter().map(move |key| StrayEntry {
                instance: instance.clone(),
                key: key.clone(),
            })
        })
    }

    /// Total key count over all instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys present here but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &StrayKeyMap) -> StrayKeyMap {
        let mut result = StrayKeyMap::new();
        for entry in self.entries() {
            if !other.contains(&entry.instance, &entry.key) {
                result.insert(&entry.instance, entry.key);
            }
        }
        result
    }

    /// Rows for persistence, ordered by instance then key.
    #[must_use]
    pub fn rows(&self) -> Vec<StrayRow> {
        self.entries()
            .map(|entry| StrayRow {
                identity_type: entry.key.identity_type().to_string(),
                username: entry.key.username().to_string(),
                domain: Some(entry.key.domain().to_string()),
                umapi: Some(entry.instance.as_column().to_string()),
            })
            .collect()
    }

    /// Read a persisted map. Missing `domain`/`umapi` columns are tolerated.
    pub fn read_csv<R: Read>(reader: R) -> RuleResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let rows = csv_reader
            .deserialize::<StrayRow>()
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = Self::new();
        let loaded = map.load(rows);
        debug!(loaded, "Loaded stray key map");
        Ok(map)
    }

    /// Write the map with header `type,username,domain,umapi`.
    pub fn write_csv<W: Write>(&self, writer: W) -> RuleResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        // Header is written explicitly so an empty map still produces one.
        csv_writer.write_record(["type", "username", "domain", "umapi"])?;
        for row in self.rows() {
            csv_writer.write_record([
                row.identity_type.as_str(),
                row.username.as_str(),
                row.domain.as_deref().unwrap_or(""),
                row.umapi.as_deref().unwrap_or(""),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Read a persisted map from a file.
    pub fn read_path<P: AsRef<Path>>(path: P) -> RuleResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(file)
    }

    /// Persist the map to a file, replacing it.
    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> RuleResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}
