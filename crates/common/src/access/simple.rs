use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;

use super::{AccessPolicy, Allowed};
use crate::auth::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllKeys {
    All,
}

/// Either the literal `"all"` or a list of keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AccessList {
    All(AllKeys),
    Keys(BTreeSet<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleAccessPolicyArgs {
    #[serde(default)]
    pub access_lists: HashMap<String, AccessList>,
    #[serde(default)]
    pub public: BTreeSet<String>,
}

/// Static per-principal access lists plus a set of keys visible to
/// everyone, anonymous users included.
#[derive(Debug, Clone, Default)]
pub struct SimpleAccessPolicy {
    access_lists: HashMap<String, AccessList>,
    public: BTreeSet<String>,
}

impl SimpleAccessPolicy {
    pub const IDENTIFIER: &'static str = "canopy.access_policies:SimpleAccessPolicy";

    pub fn new(access_lists: HashMap<String, AccessList>, public: BTreeSet<String>) -> Self {
        Self {
            access_lists,
            public,
        }
    }
}

impl From<SimpleAccessPolicyArgs> for SimpleAccessPolicy {
    fn from(args: SimpleAccessPolicyArgs) -> Self {
        Self::new(args.access_lists, args.public)
    }
}

impl AccessPolicy for SimpleAccessPolicy {
    fn allowed(&self, identity: &Identity) -> Allowed {
        let listed = identity
            .principal()
            .and_then(|principal| self.access_lists.get(&principal.id));
        match listed {
            Some(AccessList::All(_)) => Allowed::All,
            Some(AccessList::Keys(keys)) => {
                Allowed::Keys(keys.union(&self.public).cloned().collect())
            }
            None => Allowed::Keys(self.public.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;

    fn policy() -> SimpleAccessPolicy {
        let args: SimpleAccessPolicyArgs = serde_json::from_value(serde_json::json!({
            "access_lists": { "alice": ["a", "b"], "admin": "all" },
            "public": ["p"],
        }))
        .unwrap();
        args.into()
    }

    #[test]
    fn test_listed_keys_include_public() {
        let allowed = policy().allowed(&Identity::User(Principal::user("alice")));
        assert!(allowed.permits("a"));
        assert!(allowed.permits("p"));
        assert!(!allowed.permits("c"));
    }

    #[test]
    fn test_all_keyword() {
        let allowed = policy().allowed(&Identity::User(Principal::user("admin")));
        assert_eq!(allowed, Allowed::All);
    }

    #[test]
    fn test_anonymous_and_unlisted_see_public_only() {
        let policy = policy();
        for identity in [Identity::Anonymous, Identity::User(Principal::user("bob"))] {
            let allowed = policy.allowed(&identity);
            assert!(allowed.permits("p"));
            assert!(!allowed.permits("a"));
        }
    }

    #[test]
    fn test_other_strings_are_rejected() {
        let parsed = serde_json::from_value::<SimpleAccessPolicyArgs>(serde_json::json!({
            "access_lists": { "alice": "some" },
        }));
        assert!(parsed.is_err());
    }
}
