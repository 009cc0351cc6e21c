mod simple;

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use crate::auth::Identity;
use crate::tree::Entry;

pub use simple::{AccessList, SimpleAccessPolicy, SimpleAccessPolicyArgs};

/// The keys an identity may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed {
    All,
    Keys(BTreeSet<String>),
}

impl Allowed {
    pub fn permits(&self, key: &str) -> bool {
        match self {
            Allowed::All => true,
            Allowed::Keys(keys) => keys.contains(key),
        }
    }
}

/// Decides which top-level keys of a tree an identity can see.
pub trait AccessPolicy: Send + Sync + Debug {
    fn allowed(&self, identity: &Identity) -> Allowed;
}

/// Applies an optional access policy to lookups and listings.
///
/// Without a policy everything is visible. The holder of the single-user
/// API key always sees everything.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    policy: Option<Arc<dyn AccessPolicy>>,
}

impl AccessGate {
    pub fn new(policy: Option<Arc<dyn AccessPolicy>>) -> Self {
        Self { policy }
    }

    pub fn open() -> Self {
        Self::default()
    }

    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    fn allowed(&self, identity: &Identity) -> Allowed {
        match (&self.policy, identity.principal()) {
            (None, _) => Allowed::All,
            (Some(_), Some(principal)) if principal.is_single_user() => Allowed::All,
            (Some(policy), _) => policy.allowed(identity),
        }
    }

    pub fn is_visible(&self, identity: &Identity, key: &str) -> bool {
        self.allowed(identity).permits(key)
    }

    pub fn filter(&self, identity: &Identity, entries: Vec<Entry>) -> Vec<Entry> {
        match self.allowed(identity) {
            Allowed::All => entries,
            allowed => entries
                .into_iter()
                .filter(|entry| allowed.permits(&entry.key))
                .collect(),
        }
    }
}
