use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{BaseFields, Model};
use crate::schema::{CrudVerb, FieldKind, SchemaDescriptor};

/// A named bundle of allow-sets, administered as a regular entity and
/// consumed by the auth gate through the policy snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(flatten)]
    pub base: BaseFields,
    pub name: String,
    #[serde(default, rename = "readAllowed")]
    pub read_allowed: Vec<String>,
    #[serde(default, rename = "createAllowed")]
    pub create_allowed: Vec<String>,
    #[serde(default, rename = "updateAllowed")]
    pub update_allowed: Vec<String>,
    #[serde(default, rename = "deleteAllowed")]
    pub delete_allowed: Vec<String>,
}

impl Model for Policy {
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("auth", "Policy")
            .field("name", FieldKind::Keyword)
            .field("readAllowed", FieldKind::ScalarList(Box::new(FieldKind::Keyword)))
            .field("createAllowed", FieldKind::ScalarList(Box::new(FieldKind::Keyword)))
            .field("updateAllowed", FieldKind::ScalarList(Box::new(FieldKind::Keyword)))
            .field("deleteAllowed", FieldKind::ScalarList(Box::new(FieldKind::Keyword)))
    }

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

/// Per-token identity, derived once per resolution and memoized.
///
/// The four allow-sets are the union of the allow-sets of every policy the
/// user holds.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthInfo {
    pub realm: String,
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub policy: Vec<String>,
    #[serde(default)]
    pub read_allowed: HashSet<String>,
    #[serde(default)]
    pub create_allowed: HashSet<String>,
    #[serde(default)]
    pub update_allowed: HashSet<String>,
    #[serde(default)]
    pub delete_allowed: HashSet<String>,
}

impl AuthInfo {
    /// Recompute the union allow-sets from the policies this user holds.
    pub fn apply_policies(&mut self, policies: &[Policy]) {
        self.read_allowed.clear();
        self.create_allowed.clear();
        self.update_allowed.clear();
        self.delete_allowed.clear();
        for policy in policies {
            if !self.policy.iter().any(|name| *name == policy.name) {
                continue;
            }
            self.read_allowed.extend(policy.read_allowed.iter().cloned());
            self.create_allowed.extend(policy.create_allowed.iter().cloned());
            self.update_allowed.extend(policy.update_allowed.iter().cloned());
            self.delete_allowed.extend(policy.delete_allowed.iter().cloned());
        }
    }

    /// ACL check: admins pass, everyone else needs the sref in the verb's
    /// allow-set.
    pub fn allows(&self, verb: CrudVerb, sref: &str) -> bool {
        if self.admin {
            return true;
        }
        let set = match verb {
            CrudVerb::Create => &self.create_allowed,
            CrudVerb::Read => &self.read_allowed,
            CrudVerb::Update => &self.update_allowed,
            CrudVerb::Delete => &self.delete_allowed,
        };
        set.contains(sref)
    }

    /// Ownership check used at the per-owner auth level.
    pub fn check_account(&self, realm: &str, username: &str) -> bool {
        self.realm == realm && self.username == username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(name: &str, read: &[&str]) -> Policy {
        Policy {
            name: name.to_string(),
            read_allowed: read.iter().map(|s| s.to_string()).collect(),
            ..Policy::default()
        }
    }

    #[test]
    fn test_apply_policies_unions_held_only() {
        let mut info = AuthInfo {
            realm: "acme".into(),
            username: "alice".into(),
            policy: vec!["viewer".into(), "editor".into()],
            ..AuthInfo::default()
        };
        info.apply_policies(&[
            policy("viewer", &["mod.X"]),
            policy("editor", &["mod.Y"]),
            policy("admin", &["mod.Z"]),
        ]);
        assert!(info.read_allowed.contains("mod.X"));
        assert!(info.read_allowed.contains("mod.Y"));
        assert!(!info.read_allowed.contains("mod.Z"));
    }

    #[test]
    fn test_allows_respects_verb_sets() {
        let mut info = AuthInfo::default();
        info.read_allowed.insert("mod.X".into());
        assert!(info.allows(CrudVerb::Read, "mod.X"));
        assert!(!info.allows(CrudVerb::Delete, "mod.X"));
        assert!(!info.allows(CrudVerb::Read, "mod.Y"));
    }

    #[test]
    fn test_admin_bypasses_acl() {
        let info = AuthInfo {
            admin: true,
            ..AuthInfo::default()
        };
        assert!(info.allows(CrudVerb::Delete, "anything.At All"));
    }

    #[test]
    fn test_check_account() {
        let info = AuthInfo {
            realm: "acme".into(),
            username: "alice".into(),
            ..AuthInfo::default()
        };
        assert!(info.check_account("acme", "alice"));
        assert!(!info.check_account("acme", "bob"));
        assert!(!info.check_account("umbrella", "alice"));
    }

    #[test]
    fn test_policy_wire_names() {
        let policy: Policy = serde_json::from_value(serde_json::json!({
            "name": "viewer",
            "readAllowed": ["mod.X"]
        }))
        .unwrap();
        assert_eq!(policy.read_allowed, vec!["mod.X".to_string()]);

        let wire = serde_json::to_value(&policy).unwrap();
        assert!(wire.get("readAllowed").is_some());
    }
}
