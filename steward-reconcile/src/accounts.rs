//! Accounts reconciliation.
//!
//! A pass fetches the desired `username -> ssh keys` mapping from an
//! [`AccountsSource`] and hands every entry to an [`AccountManager`]. Each
//! entry is applied independently: one failing user is logged, counted in
//! the [`AccountsReport`], and never stops the rest of the batch.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use steward_core::{DesiredAccounts, FetchError, MetadataSource, Username};

use crate::error::ReconcileError;

// ---------------------------------------------------------------------------
// Desired-state source
// ---------------------------------------------------------------------------

/// Where desired accounts come from.
///
/// An empty mapping means "nothing desired"; failures are `Err`.
pub trait AccountsSource {
    fn fetch_desired(&self) -> Result<DesiredAccounts, FetchError>;
}

impl<T: AccountsSource + ?Sized> AccountsSource for &T {
    fn fetch_desired(&self) -> Result<DesiredAccounts, FetchError> {
        (**self).fetch_desired()
    }
}

/// Fixed mapping; used for dry runs from a file and in tests.
impl AccountsSource for DesiredAccounts {
    fn fetch_desired(&self) -> Result<DesiredAccounts, FetchError> {
        Ok(self.clone())
    }
}

/// Reads SSH keys from instance and project attributes.
pub struct MetadataAccountsSource<M> {
    source: M,
}

impl<M: MetadataSource> MetadataAccountsSource<M> {
    pub fn new(source: M) -> Self {
        Self { source }
    }
}

impl<M: MetadataSource> AccountsSource for MetadataAccountsSource<M> {
    fn fetch_desired(&self) -> Result<DesiredAccounts, FetchError> {
        tracing::debug!("getting desired accounts from metadata");
        let body = match self.source.get_metadata("", true) {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(DesiredAccounts::new()),
            Err(err) => return Err(err),
        };
        let doc: Value = serde_json::from_str(&body)?;
        Ok(accounts_from_metadata(&doc, Utc::now()))
    }
}

/// Build the desired mapping from a recursive metadata document.
///
/// Instance `sshKeys` and `ssh-keys` always apply. Project keys are added
/// unless the instance sets `block-project-ssh-keys` to `true` or carries
/// legacy `sshKeys`. Without both attribute sections the mapping is empty.
pub fn accounts_from_metadata(doc: &Value, now: DateTime<Utc>) -> DesiredAccounts {
    let (Some(instance), Some(project)) = (
        doc.pointer("/instance/attributes"),
        doc.pointer("/project/attributes"),
    ) else {
        tracing::debug!("project or instance attributes were not found");
        return DesiredAccounts::new();
    };
    let attr = |section: &Value, key: &str| -> Option<String> {
        section
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut blocks = vec![attr(instance, "sshKeys"), attr(instance, "ssh-keys")];
    let block_project = attr(instance, "block-project-ssh-keys")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if !block_project && attr(instance, "sshKeys").is_none() {
        blocks.push(attr(project, "ssh-keys"));
        blocks.push(attr(project, "sshKeys"));
    }
    let data = blocks.into_iter().flatten().collect::<Vec<_>>().join("\n");
    parse_account_data(&data, now)
}

/// Parse `user:key` lines. Incomplete lines and expired keys are skipped.
pub fn parse_account_data(data: &str, now: DateTime<Utc>) -> DesiredAccounts {
    let mut accounts = DesiredAccounts::new();
    for line in data.lines().filter(|l| !l.is_empty()) {
        let Some((user, key)) = line.split_once(':') else {
            tracing::warn!("SSH key is not a complete entry: {}", line);
            continue;
        };
        if key_has_expired(key, now) {
            tracing::debug!("skipping expired SSH key for user {}: {}", user, key);
            continue;
        }
        accounts.insert_key(user, key);
    }
    accounts
}

const EXPIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+0000";

/// `true` only for a `google-ssh {"expireOn": ...}` key whose timestamp is
/// in the past. Anything unparseable never expires.
pub fn key_has_expired(key: &str, now: DateTime<Utc>) -> bool {
    let Some((schema, json)) = schema_and_payload(key) else {
        return false;
    };
    if schema != "google-ssh" {
        return false;
    }
    let Ok(payload) = serde_json::from_str::<Value>(json) else {
        tracing::error!("invalid JSON in SSH key comment; not expiring key");
        return false;
    };
    let Some(expire_on) = payload.get("expireOn").and_then(Value::as_str) else {
        tracing::warn!("no expiration timestamp; not expiring key");
        return false;
    };
    match NaiveDateTime::parse_from_str(expire_on, EXPIRE_FORMAT) {
        Ok(expires) => now.naive_utc() > expires,
        Err(_) => {
            tracing::error!(
                "expiration timestamp {:?} not in format {}; not expiring key",
                expire_on,
                EXPIRE_FORMAT
            );
            false
        }
    }
}

/// Third whitespace-separated field and everything after it.
fn schema_and_payload(key: &str) -> Option<(&str, &str)> {
    fn next_field(s: &str) -> Option<(&str, &str)> {
        let s = s.trim_start();
        let end = s.find(char::is_whitespace)?;
        Some((&s[..end], &s[end..]))
    }
    let (_, rest) = next_field(key)?;
    let (_, rest) = next_field(rest)?;
    let (schema, rest) = next_field(rest)?;
    let payload = rest.trim_start();
    (!payload.is_empty()).then_some((schema, payload))
}

// ---------------------------------------------------------------------------
// Account manager
// ---------------------------------------------------------------------------

/// What applying one account did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOutcome {
    Created,
    Updated,
    /// Deliberately left alone (invalid name, `nologin` shell, ...).
    Skipped { reason: String },
}

/// Applies one account's desired keys to the system.
///
/// Creating an already-existing user or re-applying the same keys must be a
/// no-op, so the same entry can be retried on the next pass.
pub trait AccountManager {
    fn update_user(
        &mut self,
        username: &Username,
        ssh_keys: &[String],
    ) -> Result<UserOutcome, ReconcileError>;
}

impl<T: AccountManager + ?Sized> AccountManager for &mut T {
    fn update_user(
        &mut self,
        username: &Username,
        ssh_keys: &[String],
    ) -> Result<UserOutcome, ReconcileError> {
        (**self).update_user(username, ssh_keys)
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Per-pass summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsReport {
    pub created: Vec<Username>,
    pub updated: Vec<Username>,
    pub skipped: Vec<Username>,
    /// Users whose update failed, with the error message.
    pub failed: Vec<(Username, String)>,
    /// Users no longer desired whose Google-managed keys were revoked.
    pub revoked: Vec<Username>,
}

impl AccountsReport {
    /// At least one entry failed; the pass as a whole still ran.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.skipped.is_empty()
            && self.failed.is_empty()
            && self.revoked.is_empty()
    }

    fn record(&mut self, username: &Username, result: Result<UserOutcome, ReconcileError>) {
        match result {
            Ok(UserOutcome::Created) => self.created.push(username.clone()),
            Ok(UserOutcome::Updated) => self.updated.push(username.clone()),
            Ok(UserOutcome::Skipped { reason }) => {
                tracing::debug!("skipped {}: {}", username, reason);
                self.skipped.push(username.clone());
            }
            Err(err) => {
                tracing::warn!("could not update account {}: {}", username, err);
                self.failed.push((username.clone(), err.to_string()));
            }
        }
    }
}

impl fmt::Display for AccountsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} revoked, {} failed",
            self.created.len(),
            self.updated.len(),
            self.skipped.len(),
            self.revoked.len(),
            self.failed.len()
        )
    }
}

/// Fetch desired accounts and apply each one.
///
/// An empty mapping makes no calls. Entries with an empty username are
/// skipped silently. Fetch failures propagate before anything is applied.
pub fn create_accounts<S, A>(source: &S, manager: &mut A) -> Result<AccountsReport, FetchError>
where
    S: AccountsSource + ?Sized,
    A: AccountManager + ?Sized,
{
    let desired = source.fetch_desired()?;
    Ok(apply_desired(&desired, manager))
}

fn apply_desired<A>(desired: &DesiredAccounts, manager: &mut A) -> AccountsReport
where
    A: AccountManager + ?Sized,
{
    let mut report = AccountsReport::default();
    for account in desired {
        if account.username.is_empty() {
            continue;
        }
        let result = manager.update_user(&account.username, &account.ssh_keys);
        report.record(&account.username, result);
    }
    report
}

/// Full pass: [`create_accounts`], then revoke Google-managed keys from
/// every user in `sshable_users` that is no longer desired.
pub fn update_accounts<S, A>(
    source: &S,
    manager: &mut A,
    sshable_users: &[Username],
) -> Result<AccountsReport, FetchError>
where
    S: AccountsSource + ?Sized,
    A: AccountManager + ?Sized,
{
    let desired = source.fetch_desired()?;
    let mut report = apply_desired(&desired, manager);

    for username in sshable_users {
        if username.is_empty() || desired.contains(username.as_str()) {
            continue;
        }
        match manager.update_user(username, &[]) {
            Ok(_) => report.revoked.push(username.clone()),
            Err(err) => report.record(username, Err(err)),
        }
    }

    tracing::info!("accounts pass: {}", report);
    Ok(report)
}
