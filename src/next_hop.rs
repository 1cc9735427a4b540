// FlowSim: Packet Flow Trace Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Next hops
//!
//! A [`NextHop`] is the resolved forwarding target of a route. The set of variants is closed,
//! and every address or interface name stored in a next hop is validated when the next hop is
//! constructed. Next hops are immutable and are shared between routes through the
//! [`NextHopInterner`].
//!
//! Older route representations describe the next hop with two optional fields (an interface
//! name and an IP). [`NextHop::from_legacy`] converts such a pair into a `NextHop`, and
//! [`NextHop::next_hop_interface`], [`NextHop::next_hop_ip`] and [`NextHop::next_vrf`]
//! decompose a `NextHop` back into that shape.

use std::{
    fmt::Display,
    net::Ipv4Addr,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
};

use lazy_static::lazy_static;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::types::{NextHopError, NULL_INTERFACE_NAME, UNSET_NEXT_HOP_INTERFACE};

/// Default number of distinct next hops kept by the global interner.
pub const DEFAULT_INTERNER_CAPACITY: usize = 1 << 16;

lazy_static! {
    static ref NEXT_HOPS: NextHopInterner = NextHopInterner::new();
}

/// A concrete IPv4 address. Neither the all-zeros address nor the broadcast address is
/// accepted.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "Ipv4Addr", into = "Ipv4Addr")]
pub struct ConcreteIp(Ipv4Addr);

impl ConcreteIp {
    /// Get the address.
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }
}

impl TryFrom<Ipv4Addr> for ConcreteIp {
    type Error = NextHopError;

    fn try_from(value: Ipv4Addr) -> Result<Self, Self::Error> {
        if value.is_unspecified() || value.is_broadcast() {
            Err(NextHopError::ReservedIp(value))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<ConcreteIp> for Ipv4Addr {
    fn from(value: ConcreteIp) -> Self {
        value.0
    }
}

impl Display for ConcreteIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Name of an interface that can be used as a next hop. The null interface and the unset
/// placeholder are rejected.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = NextHopError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || value == NULL_INTERFACE_NAME || value == UNSET_NEXT_HOP_INTERFACE {
            Err(NextHopError::ReservedInterfaceName(value))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Next Hop
///
/// Closed set of forwarding targets. Use the constructors ([`NextHop::ip`],
/// [`NextHop::interface`], [`NextHop::vrf`], [`NextHop::vtep`]) to build one from raw values.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum NextHop {
    /// Forward by recursively resolving the address in the FIB.
    Ip(ConcreteIp),
    /// Forward out of the named interface, optionally sending to (ARPing) the given address.
    Interface(InterfaceName, Option<ConcreteIp>),
    /// Drop the traffic (null route). Equivalent to the legacy next-hop interface
    /// [`NULL_INTERFACE_NAME`].
    Discard,
    /// Look up the destination (or the given address) in another VRF.
    Vrf(String, Option<ConcreteIp>),
    /// Encapsulate into VXLAN with the given VNI and send to the tunnel endpoint.
    Vtep(u32, ConcreteIp),
}

impl NextHop {
    /// Next hop that resolves `addr` in the FIB.
    pub fn ip(addr: Ipv4Addr) -> Result<Self, NextHopError> {
        Ok(Self::Ip(addr.try_into()?))
    }

    /// Next hop that forwards out of `name`, optionally ARPing for `arp_ip`.
    pub fn interface(
        name: impl Into<String>,
        arp_ip: Option<Ipv4Addr>,
    ) -> Result<Self, NextHopError> {
        let name = InterfaceName::try_from(name.into())?;
        let arp_ip = arp_ip.map(ConcreteIp::try_from).transpose()?;
        Ok(Self::Interface(name, arp_ip))
    }

    /// Null route.
    pub fn discard() -> Self {
        Self::Discard
    }

    /// Next hop that looks up the flow (or `ip`) in the VRF `name`.
    pub fn vrf(name: impl Into<String>, ip: Option<Ipv4Addr>) -> Result<Self, NextHopError> {
        let ip = ip.map(ConcreteIp::try_from).transpose()?;
        Ok(Self::Vrf(name.into(), ip))
    }

    /// Next hop that tunnels traffic to `vtep_ip` using `vni`.
    pub fn vtep(vni: u32, vtep_ip: Ipv4Addr) -> Result<Self, NextHopError> {
        Ok(Self::Vtep(vni, vtep_ip.try_into()?))
    }

    /// Convert the legacy two-field representation into a `NextHop`.
    ///
    /// The interface takes precedence over the IP. The interface [`NULL_INTERFACE_NAME`]
    /// yields [`NextHop::Discard`]. The interface [`UNSET_NEXT_HOP_INTERFACE`] is treated as
    /// absent. If neither an interface nor an IP is given, the conversion fails with
    /// [`NextHopError::MissingInterfaceAndIp`].
    pub fn from_legacy(interface: Option<&str>, ip: Option<Ipv4Addr>) -> Result<Self, NextHopError> {
        match interface.filter(|iface| *iface != UNSET_NEXT_HOP_INTERFACE) {
            Some(NULL_INTERFACE_NAME) => Ok(Self::Discard),
            Some(iface) => Self::interface(iface, ip),
            None => match ip {
                Some(ip) => Self::ip(ip),
                None => Err(NextHopError::MissingInterfaceAndIp),
            },
        }
    }

    /// The legacy next-hop interface. [`NextHop::Discard`] maps to [`NULL_INTERFACE_NAME`].
    pub fn next_hop_interface(&self) -> Option<&str> {
        match self {
            NextHop::Interface(name, _) => Some(name.as_str()),
            NextHop::Discard => Some(NULL_INTERFACE_NAME),
            NextHop::Ip(_) | NextHop::Vrf(_, _) | NextHop::Vtep(_, _) => None,
        }
    }

    /// The legacy next-hop IP. For [`NextHop::Interface`], this is the ARP IP (if any).
    pub fn next_hop_ip(&self) -> Option<Ipv4Addr> {
        match self {
            NextHop::Ip(ip) => Some(ip.addr()),
            NextHop::Interface(_, arp_ip) => arp_ip.map(|ip| ip.addr()),
            NextHop::Discard | NextHop::Vrf(_, _) | NextHop::Vtep(_, _) => None,
        }
    }

    /// The VRF in which the lookup continues.
    pub fn next_vrf(&self) -> Option<&str> {
        match self {
            NextHop::Vrf(name, _) => Some(name.as_str()),
            NextHop::Ip(_) | NextHop::Interface(_, _) | NextHop::Discard | NextHop::Vtep(_, _) => {
                None
            }
        }
    }

    /// Get the shared instance of this next hop from the global interner.
    pub fn interned(self) -> Arc<NextHop> {
        NEXT_HOPS.intern(self)
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextHop::Ip(ip) => write!(f, "ip {ip}"),
            NextHop::Interface(name, None) => write!(f, "interface {name}"),
            NextHop::Interface(name, Some(ip)) => write!(f, "interface {name} ip {ip}"),
            NextHop::Discard => f.write_str("discard"),
            NextHop::Vrf(name, None) => write!(f, "vrf {name}"),
            NextHop::Vrf(name, Some(ip)) => write!(f, "vrf {name} ip {ip}"),
            NextHop::Vtep(vni, ip) => write!(f, "vtep {ip} vni {vni}"),
        }
    }
}

/// # Next-hop interner
///
/// Large FIBs contain the same next hop many times. The interner keeps a bounded,
/// least-recently-used table from next-hop values to shared instances, such that equal next
/// hops of different routes point to the same allocation. Evicted entries stay valid for as
/// long as some route holds them; they are merely no longer shared with new routes.
#[derive(Debug)]
pub struct NextHopInterner {
    cache: Mutex<LruCache<NextHop, Arc<NextHop>>>,
}

impl Default for NextHopInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl NextHopInterner {
    /// Create an interner with [`DEFAULT_INTERNER_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INTERNER_CAPACITY)
    }

    /// Create an interner that keeps at most `capacity` next hops (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Get the shared instance of `next_hop`.
    pub fn intern(&self, next_hop: NextHop) -> Arc<NextHop> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(shared) = cache.get(&next_hop) {
            return shared.clone();
        }
        let shared = Arc::new(next_hop.clone());
        cache.put(next_hop, shared.clone());
        shared
    }

    /// Number of next hops currently cached.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no next hop is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
