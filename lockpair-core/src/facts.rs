#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lock {
    pub name: String,
}

impl Lock {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A named group of shared storage, modelled in the program as a map global.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryRegion {
    pub name: String,
}

impl MemoryRegion {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Two entry points to check against each other; the first plays the logger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryPointPair(pub String, pub String);

impl EntryPointPair {
    pub fn new(logger: impl Into<String>, checker: impl Into<String>) -> Self {
        Self(logger.into(), checker.into())
    }

    pub fn logger(&self) -> &str {
        &self.0
    }

    pub fn checker(&self) -> &str {
        &self.1
    }

    pub fn is_self_pair(&self) -> bool {
        self.0 == self.1
    }
}

/// Externally computed facts about the program: which locks exist, which
/// memory regions exist, which entry point touches which region, and which
/// entry points must be checked against each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStateFacts {
    #[serde(default)]
    pub locks: Vec<Lock>,
    #[serde(default)]
    pub regions: Vec<MemoryRegion>,
    #[serde(default)]
    pub accesses: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub pairs: Vec<EntryPointPair>,
}

impl SharedStateFacts {
    pub fn is_region(&self, name: &str) -> bool {
        self.regions.iter().any(|r| r.name == name)
    }

    /// Regions the entry point may touch, in name order.
    pub fn regions_of<'a>(&'a self, entry_point: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.accesses
            .get(entry_point)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn touches(&self, entry_point: &str, region: &str) -> bool {
        self.accesses
            .get(entry_point)
            .is_some_and(|set| set.contains(region))
    }

    /// Entry points named by some pair, each once, in first-seen order.
    pub fn paired_entry_points(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for p in &self.pairs {
            for ep in [p.logger(), p.checker()] {
                if !out.iter().any(|e| e == ep) {
                    out.push(ep.to_string());
                }
            }
        }
        out
    }

    /// Pairs with duplicates removed, first occurrence wins.
    pub fn unique_pairs(&self) -> Vec<EntryPointPair> {
        let mut seen = BTreeSet::new();
        self.pairs
            .iter()
            .filter(|p| seen.insert((*p).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pairs_as_arrays() {
        let facts: SharedStateFacts = serde_json::from_str(
            r#"{
                "locks": ["dev_lock"],
                "regions": ["dev_state"],
                "accesses": { "probe": ["dev_state"] },
                "pairs": [["probe", "probe"], ["probe", "remove"]]
            }"#,
        )
        .expect("decode");
        assert_eq!(facts.locks, vec![Lock::new("dev_lock")]);
        assert!(facts.pairs[0].is_self_pair());
        assert_eq!(facts.paired_entry_points(), vec!["probe", "remove"]);
        assert!(facts.touches("probe", "dev_state"));
        assert!(!facts.touches("remove", "dev_state"));
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let facts = SharedStateFacts {
            pairs: vec![
                EntryPointPair::new("a", "b"),
                EntryPointPair::new("a", "b"),
                EntryPointPair::new("b", "a"),
            ],
            ..SharedStateFacts::default()
        };
        assert_eq!(facts.unique_pairs().len(), 2);
    }
}
