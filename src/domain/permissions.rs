//! Designation permission map: `module -> action -> bool`.
//!
//! Resolved once at login and embedded in the issued token claims so
//! authorization checks do not need a designation lookup per request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action flags for the wildcard module granted to SUPERADMIN.
pub const ALL_MODULES: &str = "all_modules";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, BTreeMap<String, bool>>);

impl Permissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Full access under the wildcard module, assigned to SUPERADMIN.
    #[must_use]
    pub fn superadmin() -> Self {
        let mut actions = BTreeMap::new();
        for action in ["read", "create", "update", "delete"] {
            actions.insert(action.to_string(), true);
        }
        let mut modules = BTreeMap::new();
        modules.insert(ALL_MODULES.to_string(), actions);
        Self(modules)
    }

    /// Parse the JSON column value; malformed maps collapse to no access.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn grant(&mut self, module: &str, action: &str, allowed: bool) {
        self.0
            .entry(module.to_string())
            .or_default()
            .insert(action.to_string(), allowed);
    }

    /// Whether `action` is allowed on `module`. The wildcard module applies
    /// to every module; superuser bypass lives on the user, not here.
    #[must_use]
    pub fn allows(&self, module: &str, action: &str) -> bool {
        let module_allows = |name: &str| {
            self.0
                .get(name)
                .and_then(|actions| actions.get(action))
                .copied()
                .unwrap_or(false)
        };
        module_allows(module) || module_allows(ALL_MODULES)
    }

    #[must_use]
    pub fn has_module(&self, module: &str) -> bool {
        self.0.contains_key(module) || self.0.contains_key(ALL_MODULES)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_resolve_per_module_and_action() {
        let mut perms = Permissions::new();
        perms.grant("students", "read", true);
        perms.grant("students", "delete", false);

        assert!(perms.allows("students", "read"));
        assert!(!perms.allows("students", "delete"));
        assert!(!perms.allows("students", "update"));
        assert!(!perms.allows("employees", "read"));
    }

    #[test]
    fn superadmin_wildcard_covers_every_module() {
        let perms = Permissions::superadmin();
        assert!(perms.allows("students", "delete"));
        assert!(perms.allows("anything", "create"));
        assert!(perms.has_module("establishments"));
    }

    #[test]
    fn malformed_json_means_no_access() {
        let perms = Permissions::from_value(&serde_json::json!([1, 2, 3]));
        assert!(perms.is_empty());
        assert!(!perms.allows("students", "read"));
    }

    #[test]
    fn round_trips_through_json() {
        let mut perms = Permissions::new();
        perms.grant("countries", "read", true);
        let back = Permissions::from_value(&perms.to_value());
        assert_eq!(back, perms);
    }
}
