//! Authenticated principal

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authenticated user attached to a session
///
/// Immutable once built. `D` is a caller-defined details payload; sessions
/// store the erased form `Identity<Value>` and callers read it back typed with
/// [`Identity::details_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity<D = Value> {
    username: String,
    #[serde(default)]
    realm: Option<String>,
    #[serde(default)]
    groups: BTreeSet<String>,
    #[serde(default)]
    roles: BTreeSet<String>,
    details: D,
}

impl<D> Identity<D> {
    pub fn new(username: impl Into<String>, details: D) -> Self {
        Self {
            username: username.into(),
            realm: None,
            groups: BTreeSet::new(),
            roles: BTreeSet::new(),
            details,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn details(&self) -> &D {
        &self.details
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

impl<D: Serialize> Identity<D> {
    /// Convert the details payload to JSON for storage on a session
    pub fn erase(&self) -> Result<Identity<Value>, serde_json::Error> {
        Ok(Identity {
            username: self.username.clone(),
            realm: self.realm.clone(),
            groups: self.groups.clone(),
            roles: self.roles.clone(),
            details: serde_json::to_value(&self.details)?,
        })
    }
}

impl Identity<Value> {
    /// Read the details payload back as `D`
    pub fn details_as<D: DeserializeOwned>(&self) -> Result<Identity<D>, serde_json::Error> {
        Ok(Identity {
            username: self.username.clone(),
            realm: self.realm.clone(),
            groups: self.groups.clone(),
            roles: self.roles.clone(),
            details: serde_json::from_value(self.details.clone())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        email: String,
        age: u32,
    }

    #[test]
    fn test_identity_builder() {
        let identity = Identity::new("alice", ())
            .with_realm("staff")
            .with_groups(["admins", "ops"])
            .with_roles(["read", "write"]);

        assert_eq!(identity.username(), "alice");
        assert_eq!(identity.realm(), Some("staff"));
        assert!(identity.in_group("ops"));
        assert!(identity.has_role("write"));
        assert!(!identity.has_role("delete"));
    }

    #[test]
    fn test_typed_details_round_trip() {
        let identity = Identity::new(
            "bob",
            Profile {
                email: "bob@example.com".to_string(),
                age: 42,
            },
        )
        .with_roles(["user"]);

        let erased = identity.erase().unwrap();
        assert_eq!(erased.details()["email"], json!("bob@example.com"));

        let typed: Identity<Profile> = erased.details_as().unwrap();
        assert_eq!(typed, identity);
    }

    #[test]
    fn test_wrong_details_type() {
        let erased = Identity::new("carol", json!({"unexpected": true}));
        assert!(erased.details_as::<Profile>().is_err());
    }
}
