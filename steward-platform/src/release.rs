//! Release-file parsers.
//!
//! Every parser is total: an empty file, a first line that does not match
//! the expected grammar, or a key file missing required entries yields
//! [`ReleaseInfo::default()`] (all `None`) rather than an error.

use std::sync::OnceLock;

use regex::Regex;

/// The four fields every release format can contribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub codename: Option<String>,
    pub description: Option<String>,
    pub distribution: Option<String>,
    pub version: Option<String>,
}

impl ReleaseInfo {
    /// `true` when nothing was parsed.
    pub fn is_empty(&self) -> bool {
        self.codename.is_none()
            && self.description.is_none()
            && self.distribution.is_none()
            && self.version.is_none()
    }

    /// Leading integer of the version string (`"7.0.1406"` → `7`).
    pub fn major_version(&self) -> Option<u32> {
        major_version(self.version.as_deref()?)
    }
}

/// Leading integer of a dotted version string.
pub fn major_version(version: &str) -> Option<u32> {
    let digits: String = version.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// /etc/redhat-release
// ---------------------------------------------------------------------------

fn redhat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // CentOS 6:  CentOS release 6.5 (Final)
        // CentOS 7:  CentOS Linux release 7.0.1406 (Core)
        // RHEL:      Red Hat Enterprise Linux Server release 7.2 (Maipo)
        Regex::new(r"^(.+?)( Linux)? release (\d+(?:\.\d+)*) \(([^)]*)\)")
            .expect("valid redhat-release regex")
    })
}

/// Parse the first line of `/etc/redhat-release`.
///
/// `distribution` is the vendor name before `[ Linux] release`; `codename`
/// and `description` both carry the parenthesised label.
pub fn parse_redhat_release(text: &str) -> ReleaseInfo {
    let Some(line) = text.lines().next() else {
        return ReleaseInfo::default();
    };
    let Some(caps) = redhat_regex().captures(line) else {
        return ReleaseInfo::default();
    };
    let label = caps.get(4).map(|m| m.as_str().to_string());
    ReleaseInfo {
        codename: label.clone(),
        description: label,
        distribution: caps.get(1).map(|m| m.as_str().to_string()),
        version: caps.get(3).map(|m| m.as_str().to_string()),
    }
}

// ---------------------------------------------------------------------------
// /etc/lsb-release
// ---------------------------------------------------------------------------

/// Parse `/etc/lsb-release`.
///
/// All of `DISTRIB_ID`, `DISTRIB_RELEASE`, `DISTRIB_CODENAME` and
/// `DISTRIB_DESCRIPTION` must be present, otherwise the result is empty.
pub fn parse_lsb_release(text: &str) -> ReleaseInfo {
    let mut id = None;
    let mut release = None;
    let mut codename = None;
    let mut description = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value).to_string();
        match key {
            "DISTRIB_ID" => id = Some(value),
            "DISTRIB_RELEASE" => release = Some(value),
            "DISTRIB_CODENAME" => codename = Some(value),
            "DISTRIB_DESCRIPTION" => description = Some(value),
            _ => {}
        }
    }

    match (id, release, codename, description) {
        (Some(id), Some(release), Some(codename), Some(description)) => ReleaseInfo {
            codename: Some(codename),
            description: Some(description),
            distribution: Some(id),
            version: Some(release),
        },
        _ => ReleaseInfo::default(),
    }
}

// ---------------------------------------------------------------------------
// /etc/os-release
// ---------------------------------------------------------------------------

/// Parse `/etc/os-release` (`NAME`, `VERSION_ID`, `VERSION`, `ID`).
///
/// The codename is the parenthesised suffix of `VERSION`, when present.
/// `description` carries `ID`, which detection uses for exact matches.
pub fn parse_os_release(text: &str) -> ReleaseInfo {
    let mut info = ReleaseInfo::default();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("NAME=") {
            info.distribution = Some(field_value(rest));
        } else if let Some(rest) = line.strip_prefix("VERSION_ID=") {
            info.version = Some(field_value(rest));
        } else if let Some(rest) = line.strip_prefix("VERSION=") {
            info.codename = parenthesised(&field_value(rest));
        } else if let Some(rest) = line.strip_prefix("ID=") {
            info.description = Some(field_value(rest));
        }
    }
    info
}

// ---------------------------------------------------------------------------
// /etc/SuSE-release
// ---------------------------------------------------------------------------

/// Parse the legacy `/etc/SuSE-release` format.
///
/// ```text
/// SUSE Linux Enterprise Server 11 (x86_64)
/// VERSION = 11
/// PATCHLEVEL = 3
/// ```
///
/// The distribution is every leading word of the first line up to the first
/// one that starts with a digit.
pub fn parse_suse_release(text: &str) -> ReleaseInfo {
    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return ReleaseInfo::default();
    };

    let words: Vec<&str> = first
        .split_whitespace()
        .take_while(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
        .collect();
    let mut info = ReleaseInfo {
        distribution: (!words.is_empty()).then(|| words.join(" ")),
        ..ReleaseInfo::default()
    };

    for line in lines {
        if let Some(rest) = line.strip_prefix("VERSION =") {
            info.version = Some(field_value(rest));
        } else if let Some(rest) = line.strip_prefix("CODENAME =") {
            info.codename = Some(field_value(rest));
        }
    }
    info
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Value inside the first pair of double quotes, or the trimmed text.
fn field_value(raw: &str) -> String {
    if let Some(start) = raw.find('"') {
        let rest = &raw[start + 1..];
        let end = rest.find('"').unwrap_or(rest.len());
        return rest[..end].to_string();
    }
    raw.trim().to_string()
}

fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
}

fn parenthesised(value: &str) -> Option<String> {
    let open = value.rfind('(')?;
    let close = value[open..].find(')')? + open;
    let inner = value[open + 1..close].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}
