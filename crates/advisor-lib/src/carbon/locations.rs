//! Location groups known to the carbon advisor
//!
//! A group such as `us_azure` stands for a list of concrete locations. Both
//! group names and their members are accepted in `allowed-locations`.

use crate::error::{AdvisorError, Result};
use std::collections::{BTreeMap, BTreeSet};

const BUILTIN_LOCATIONS: &str = include_str!("../../data/locations.json");

#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    groups: BTreeMap<String, Vec<String>>,
}

impl LocationTable {
    /// Table compiled into the library
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_LOCATIONS)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let groups: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        if let Some((name, _)) = groups.iter().find(|(_, members)| members.is_empty()) {
            return Err(AdvisorError::Configuration(format!(
                "location group {} has no members",
                name
            )));
        }
        Ok(Self { groups })
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn is_supported(&self, location: &str) -> bool {
        self.is_group(location) || self.groups.values().any(|m| m.iter().any(|l| l == location))
    }

    /// Every accepted name, groups and members alike
    pub fn supported(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|(name, members)| {
                std::iter::once(name.as_str()).chain(members.iter().map(String::as_str))
            })
            .collect()
    }

    /// Replace groups by their members, keeping first-seen order without
    /// duplicates. Unsupported names are rejected.
    pub fn expand<S: AsRef<str>>(&self, locations: &[S]) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut expanded = Vec::new();

        for location in locations {
            let location = location.as_ref().trim();
            if !self.is_supported(location) {
                return Err(AdvisorError::Configuration(format!(
                    "Location {} is not supported",
                    location
                )));
            }
            let members = match self.groups.get(location) {
                Some(members) => members.clone(),
                None => vec![location.to_string()],
            };
            for member in members {
                if seen.insert(member.clone()) {
                    expanded.push(member);
                }
            }
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = LocationTable::builtin().unwrap();
        assert!(table.is_group("us_azure"));
        assert!(table.is_supported("eastus"));
        assert!(table.is_supported("world_aws"));
        assert!(!table.is_supported("mars-north-1"));
        assert!(table.supported().contains("westindia"));
    }

    #[test]
    fn test_expand_groups_and_dedupe() {
        let table = LocationTable::from_json(
            r#"{"g1": ["a", "b"], "g2": ["b", "c"]}"#,
        )
        .unwrap();

        let expanded = table.expand(&["c", "g1", "g2", "a"]).unwrap();
        assert_eq!(expanded, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_unsupported_location() {
        let table = LocationTable::builtin().unwrap();
        let err = table.expand(&["eastus", "nowhere"]).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: Location nowhere is not supported");
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(LocationTable::from_json(r#"{"g": []}"#).is_err());
    }
}
