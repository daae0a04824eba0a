//! Addresses reconciliation.
//!
//! Desired forwarded IPs per interface are compared with the local routes we
//! own (tagged with our routing protocol id); missing ones are added and
//! extraneous ones removed. Routes with any other protocol id are never
//! touched.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde_json::Value;
use steward_core::{
    AddressAssignment, DesiredAddresses, FetchError, InterfaceName, MetadataSource,
};

use crate::command::{args, CommandRunner};
use crate::error::ReconcileError;

const INTERFACES_PATH: &str = "instance/network-interfaces/";

// ---------------------------------------------------------------------------
// Desired-state source
// ---------------------------------------------------------------------------

pub trait AddressSource {
    fn fetch_desired(&self) -> Result<DesiredAddresses, FetchError>;
}

impl<T: AddressSource + ?Sized> AddressSource for &T {
    fn fetch_desired(&self) -> Result<DesiredAddresses, FetchError> {
        (**self).fetch_desired()
    }
}

impl AddressSource for DesiredAddresses {
    fn fetch_desired(&self) -> Result<DesiredAddresses, FetchError> {
        Ok(self.clone())
    }
}

/// Forwarded IPs from `instance/network-interfaces/`.
///
/// Interface 0 maps to the configured default interface, interface N to
/// `eth<N>`. The default interface is always present so that its routes are
/// cleaned up once metadata stops listing addresses.
pub struct MetadataAddressSource<M> {
    source: M,
    default_interface: InterfaceName,
}

impl<M: MetadataSource> MetadataAddressSource<M> {
    pub fn new(source: M, default_interface: impl Into<InterfaceName>) -> Self {
        Self {
            source,
            default_interface: default_interface.into(),
        }
    }
}

impl<M: MetadataSource> AddressSource for MetadataAddressSource<M> {
    fn fetch_desired(&self) -> Result<DesiredAddresses, FetchError> {
        let body = match self.source.get_metadata(INTERFACES_PATH, true) {
            Ok(body) => body,
            Err(err) if err.is_not_found() => "[]".to_string(),
            Err(err) => return Err(err),
        };
        let doc: Value = serde_json::from_str(&body)?;
        addresses_from_metadata(&doc, &self.default_interface)
    }
}

/// Parse the `network-interfaces` array. Any address that is not a dotted
/// IPv4 literal rejects the whole document, so nothing is changed this pass.
pub fn addresses_from_metadata(
    doc: &Value,
    default_interface: &InterfaceName,
) -> Result<DesiredAddresses, FetchError> {
    let interfaces = doc
        .as_array()
        .ok_or_else(|| FetchError::malformed(INTERFACES_PATH, "expected an array of interfaces"))?;

    let mut desired = Vec::with_capacity(interfaces.len().max(1));
    for (index, nic) in interfaces.iter().enumerate() {
        let interface = if index == 0 {
            default_interface.clone()
        } else {
            InterfaceName::from(format!("eth{index}"))
        };
        let mut addresses = BTreeSet::new();
        let ips = nic.get("forwardedIps").and_then(Value::as_array);
        for ip in ips.into_iter().flatten() {
            let text = ip.as_str().unwrap_or_default();
            let addr: Ipv4Addr = text.parse().map_err(|_| {
                FetchError::malformed(INTERFACES_PATH, format!("failed to parse ip addr: {ip}"))
            })?;
            addresses.insert(addr);
        }
        desired.push(AddressAssignment {
            interface,
            addresses,
        });
    }
    if desired.is_empty() {
        desired.push(AddressAssignment {
            interface: default_interface.clone(),
            addresses: BTreeSet::new(),
        });
    }
    Ok(DesiredAddresses(desired))
}

// ---------------------------------------------------------------------------
// Configurator
// ---------------------------------------------------------------------------

/// Reads and mutates the addresses we own on an interface.
pub trait AddressConfigurator {
    fn configured(
        &mut self,
        interface: &InterfaceName,
    ) -> Result<BTreeSet<Ipv4Addr>, ReconcileError>;
    fn add(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError>;
    fn remove(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError>;
}

impl<T: AddressConfigurator + ?Sized> AddressConfigurator for &mut T {
    fn configured(
        &mut self,
        interface: &InterfaceName,
    ) -> Result<BTreeSet<Ipv4Addr>, ReconcileError> {
        (**self).configured(interface)
    }

    fn add(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError> {
        (**self).add(interface, addr)
    }

    fn remove(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError> {
        (**self).remove(interface, addr)
    }
}

/// `ip route` on the local table, scoped to our protocol id.
pub struct IpRoute<R> {
    ip: PathBuf,
    proto_id: u8,
    runner: R,
}

impl<R: CommandRunner> IpRoute<R> {
    /// Uses `/sbin/ip` when present, else `/bin/ip`.
    pub fn new(runner: R, proto_id: u8) -> Self {
        let ip = if Path::new("/sbin/ip").exists() {
            PathBuf::from("/sbin/ip")
        } else {
            PathBuf::from("/bin/ip")
        };
        Self::with_binary(runner, proto_id, ip)
    }

    pub fn with_binary(runner: R, proto_id: u8, ip: impl Into<PathBuf>) -> Self {
        Self {
            ip: ip.into(),
            proto_id,
            runner,
        }
    }

    fn ip_route(&self, argv: Vec<String>) -> Result<String, ReconcileError> {
        let program = self.ip.to_string_lossy();
        let output = self.runner.run(&program, &argv)?.check(&program, &argv)?;
        Ok(output.stdout)
    }

    fn change(
        &self,
        verb: &str,
        interface: &InterfaceName,
        addr: Ipv4Addr,
    ) -> Result<(), ReconcileError> {
        let target = format!("{addr}/32");
        let proto = self.proto_id.to_string();
        let dev = interface.as_str();
        let argv = args(["route", verb, "to", "local", &target, "dev", dev, "proto", &proto]);
        self.ip_route(argv).map(drop)
    }
}

impl<R: CommandRunner> AddressConfigurator for IpRoute<R> {
    fn configured(
        &mut self,
        interface: &InterfaceName,
    ) -> Result<BTreeSet<Ipv4Addr>, ReconcileError> {
        let proto = self.proto_id.to_string();
        let stdout = self.ip_route(args([
            "route",
            "ls",
            "table",
            "local",
            "type",
            "local",
            "dev",
            interface.as_str(),
            "scope",
            "host",
            "proto",
            &proto,
        ]))?;
        Ok(parse_route_addresses(&stdout))
    }

    fn add(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError> {
        self.change("add", interface, addr)
    }

    fn remove(&mut self, interface: &InterfaceName, addr: Ipv4Addr) -> Result<(), ReconcileError> {
        self.change("delete", interface, addr)
    }
}

/// Every IPv4 literal in `ip route ls` output; keywords are ignored.
pub fn parse_route_addresses(stdout: &str) -> BTreeSet<Ipv4Addr> {
    stdout
        .split_whitespace()
        .filter_map(|token| token.split('/').next()?.parse().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Sorted set differences for one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDiff {
    pub to_add: BTreeSet<Ipv4Addr>,
    pub to_remove: BTreeSet<Ipv4Addr>,
}

impl AddressDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

pub fn diff_addresses(
    wanted: &BTreeSet<Ipv4Addr>,
    configured: &BTreeSet<Ipv4Addr>,
) -> AddressDiff {
    AddressDiff {
        to_add: wanted.difference(configured).copied().collect(),
        to_remove: configured.difference(wanted).copied().collect(),
    }
}

/// Per-pass summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressReport {
    pub added: Vec<(InterfaceName, Ipv4Addr)>,
    pub removed: Vec<(InterfaceName, Ipv4Addr)>,
    pub failed: Vec<(InterfaceName, Ipv4Addr, String)>,
    /// Interfaces whose current routes could not be read; left untouched.
    pub unreadable: Vec<(InterfaceName, String)>,
}

impl AddressReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty() || !self.unreadable.is_empty()
    }
}

impl fmt::Display for AddressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} failed",
            self.added.len(),
            self.removed.len(),
            self.failed.len() + self.unreadable.len()
        )
    }
}

/// One reconciliation pass over every desired interface.
///
/// A fetch failure aborts the pass before anything changes. An interface
/// whose routes cannot be read is skipped, and add/remove failures are
/// isolated; both leave the report degraded.
pub fn sync_addresses<S, C>(
    source: &S,
    configurator: &mut C,
) -> Result<AddressReport, ReconcileError>
where
    S: AddressSource + ?Sized,
    C: AddressConfigurator + ?Sized,
{
    let desired = source.fetch_desired()?;
    let mut report = AddressReport::default();

    for assignment in desired.iter() {
        let interface = &assignment.interface;
        let configured = match configurator.configured(interface) {
            Ok(configured) => configured,
            Err(err) => {
                tracing::warn!("could not read addresses on {}: {}", interface, err);
                report.unreadable.push((interface.clone(), err.to_string()));
                continue;
            }
        };
        let diff = diff_addresses(&assignment.addresses, &configured);
        if diff.is_empty() {
            continue;
        }
        tracing::info!(
            "changing addresses on {} from {:?} to {:?} by adding {:?} and removing {:?}",
            interface,
            configured,
            assignment.addresses,
            diff.to_add,
            diff.to_remove
        );
        for addr in diff.to_add {
            match configurator.add(interface, addr) {
                Ok(()) => report.added.push((interface.clone(), addr)),
                Err(err) => {
                    tracing::warn!("could not add {} on {}: {}", addr, interface, err);
                    report.failed.push((interface.clone(), addr, err.to_string()));
                }
            }
        }
        for addr in diff.to_remove {
            match configurator.remove(interface, addr) {
                Ok(()) => report.removed.push((interface.clone(), addr)),
                Err(err) => {
                    tracing::warn!("could not remove {} from {}: {}", addr, interface, err);
                    report.failed.push((interface.clone(), addr, err.to_string()));
                }
            }
        }
    }

    if !report.added.is_empty() || !report.removed.is_empty() || report.is_degraded() {
        tracing::info!("addresses pass: {}", report);
    }
    Ok(report)
}
