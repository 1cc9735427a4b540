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

//! # Flows
//!
//! A [`Flow`] is a concrete packet header together with the location where it enters the
//! network. Flows are immutable values; transformations produce new flows.

use std::{fmt::Display, net::Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_VRF_NAME;

/// IP protocol of a flow. Serialized as the protocol number, such that deserializing `6`
/// or `17` always yields [`IpProtocol::Tcp`] or [`IpProtocol::Udp`].
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum IpProtocol {
    /// ICMP (1)
    Icmp,
    /// TCP (6)
    Tcp,
    /// UDP (17)
    Udp,
    /// Any other protocol number. Use [`IpProtocol::from`] to construct it, which maps the
    /// numbers of the named variants to those variants.
    Other(u8),
}

impl IpProtocol {
    /// The IANA protocol number.
    pub fn number(&self) -> u8 {
        match self {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Other(x) => *x,
        }
    }

    /// Returns `true` if the protocol carries port numbers.
    pub fn has_ports(&self) -> bool {
        matches!(self.number(), 6 | 17)
    }

    /// Map `Other(1)`, `Other(6)` and `Other(17)` to the named variants.
    pub fn normalized(self) -> Self {
        Self::from(self.number())
    }
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            x => IpProtocol::Other(x),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(value: IpProtocol) -> Self {
        value.number()
    }
}

impl Display for IpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpProtocol::Icmp => f.write_str("ICMP"),
            IpProtocol::Tcp => f.write_str("TCP"),
            IpProtocol::Udp => f.write_str("UDP"),
            IpProtocol::Other(x) => write!(f, "proto{x}"),
        }
    }
}

/// # Flow
///
/// A packet header plus its injection point. If `ingress_interface` is `None`, the flow
/// originates on `ingress_node` itself in `ingress_vrf`. Otherwise, it is received on that
/// interface, and the VRF of the interface is used.
///
/// Flows are totally ordered (field by field), which is used to order traces and to key the
/// result of batch simulations.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Node where the flow enters the network
    pub ingress_node: String,
    /// Interface on which the flow is received, if any.
    #[serde(default)]
    pub ingress_interface: Option<String>,
    /// VRF in which an originating flow starts.
    #[serde(default = "default_vrf")]
    pub ingress_vrf: String,
    /// Source address
    pub src_ip: Ipv4Addr,
    /// Destination address
    pub dst_ip: Ipv4Addr,
    /// IP protocol
    #[serde(default = "default_protocol")]
    pub ip_protocol: IpProtocol,
    /// Source port (zero for protocols without ports)
    #[serde(default)]
    pub src_port: u16,
    /// Destination port (zero for protocols without ports)
    #[serde(default)]
    pub dst_port: u16,
    /// Free-form tag to tell flows apart
    #[serde(default)]
    pub tag: String,
}

fn default_vrf() -> String {
    DEFAULT_VRF_NAME.to_string()
}

fn default_protocol() -> IpProtocol {
    IpProtocol::Tcp
}

impl Flow {
    /// Create a TCP flow originating at `node` in the default VRF.
    pub fn new(node: impl Into<String>, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Self {
        Self {
            ingress_node: node.into(),
            ingress_interface: None,
            ingress_vrf: default_vrf(),
            src_ip,
            dst_ip,
            ip_protocol: IpProtocol::Tcp,
            src_port: 49152,
            dst_port: 80,
            tag: String::new(),
        }
    }

    /// Receive the flow on the given interface instead of originating it.
    pub fn entering(mut self, interface: impl Into<String>) -> Self {
        self.ingress_interface = Some(interface.into());
        self
    }

    /// Originate the flow in a different VRF.
    pub fn in_vrf(mut self, vrf: impl Into<String>) -> Self {
        self.ingress_vrf = vrf.into();
        self
    }

    /// Set the protocol and the ports.
    pub fn with_protocol(mut self, protocol: IpProtocol, src_port: u16, dst_port: u16) -> Self {
        let protocol = protocol.normalized();
        self.ip_protocol = protocol;
        if protocol.has_ports() {
            self.src_port = src_port;
            self.dst_port = dst_port;
        } else {
            self.src_port = 0;
            self.dst_port = 0;
        }
        self
    }

    /// Set the tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Returns `true` if both flows have the same packet header (addresses, protocol, ports).
    pub fn same_header(&self, other: &Self) -> bool {
        self.src_ip == other.src_ip
            && self.dst_ip == other.dst_ip
            && self.ip_protocol == other.ip_protocol
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ingress_node)?;
        match &self.ingress_interface {
            Some(iface) => write!(f, "[{iface}]")?,
            None => write!(f, "@{}", self.ingress_vrf)?,
        }
        if self.ip_protocol.has_ports() {
            write!(
                f,
                " {}:{} -> {}:{} {}",
                self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.ip_protocol
            )
        } else {
            write!(f, " {} -> {} {}", self.src_ip, self.dst_ip, self.ip_protocol)
        }
    }
}
