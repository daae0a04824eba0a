//! Domain types for desired state.
//!
//! Desired state is produced fresh on every reconciliation pass and never
//! persisted; the operating system's own account and route tables are the
//! durable copy.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed local account name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Username(pub String);

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed network interface name (e.g. `eth0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceName(pub String);

impl InterfaceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InterfaceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InterfaceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// One account that should exist, with the SSH keys it should accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAccount {
    pub username: Username,
    pub ssh_keys: Vec<String>,
}

/// The `username -> keys` mapping fetched for one pass.
///
/// Iteration follows first-insertion order of usernames. Keys are
/// de-duplicated per user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAccounts(Vec<DesiredAccount>);

impl DesiredAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` to `username`, creating the entry on first sight.
    pub fn insert_key(&mut self, username: impl Into<Username>, key: impl Into<String>) {
        let username = username.into();
        let key = key.into();
        let entry = self.entry(username);
        if !entry.ssh_keys.contains(&key) {
            entry.ssh_keys.push(key);
        }
    }

    /// Register `username` with `keys`, merging into an existing entry.
    pub fn insert(
        &mut self,
        username: impl Into<Username>,
        keys: impl IntoIterator<Item = String>,
    ) {
        let username = username.into();
        let entry = self.entry(username);
        for key in keys {
            if !entry.ssh_keys.contains(&key) {
                entry.ssh_keys.push(key);
            }
        }
    }

    pub fn get(&self, username: &str) -> Option<&DesiredAccount> {
        self.0.iter().find(|a| a.username.0 == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DesiredAccount> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn entry(&mut self, username: Username) -> &mut DesiredAccount {
        let idx = match self.0.iter().position(|a| a.username == username) {
            Some(idx) => idx,
            None => {
                self.0.push(DesiredAccount {
                    username,
                    ssh_keys: Vec::new(),
                });
                self.0.len() - 1
            }
        };
        &mut self.0[idx]
    }
}

impl<'a> IntoIterator for &'a DesiredAccounts {
    type Item = &'a DesiredAccount;
    type IntoIter = std::slice::Iter<'a, DesiredAccount>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<U, K> FromIterator<(U, K)> for DesiredAccounts
where
    U: Into<Username>,
    K: IntoIterator<Item = String>,
{
    fn from_iter<I: IntoIterator<Item = (U, K)>>(iter: I) -> Self {
        let mut accounts = DesiredAccounts::new();
        for (user, keys) in iter {
            accounts.insert(user, keys);
        }
        accounts
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// The set of local addresses an interface should carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAssignment {
    pub interface: InterfaceName,
    pub addresses: BTreeSet<Ipv4Addr>,
}

/// Desired addresses for every interface known to the metadata source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAddresses(pub Vec<AddressAssignment>);

impl DesiredAddresses {
    pub fn iter(&self) -> std::slice::Iter<'_, AddressAssignment> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn for_interface(&self, interface: &str) -> Option<&AddressAssignment> {
        self.0.iter().find(|a| a.interface.0 == interface)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
