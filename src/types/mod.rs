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

//! Module containing all shared type definitions

use std::{fmt::Display, net::Ipv4Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod prefix;
pub use prefix::Ipv4Prefix;

/// Name of the interface that discards all traffic sent to it.
pub const NULL_INTERFACE_NAME: &str = "null_interface";

/// Placeholder used by legacy route representations for "no next-hop interface".
pub const UNSET_NEXT_HOP_INTERFACE: &str = "dynamic";

/// Name of the VRF that every device has.
pub const DEFAULT_VRF_NAME: &str = "default";

/// An interface on a specific node.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct NodeInterfacePair {
    /// Hostname of the node
    pub node: String,
    /// Name of the interface on that node
    pub interface: String,
}

impl NodeInterfacePair {
    /// Create a new pair from a node and an interface name.
    pub fn new(node: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: interface.into(),
        }
    }
}

impl Display for NodeInterfacePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.node, self.interface)
    }
}

impl<N: Into<String>, I: Into<String>> From<(N, I)> for NodeInterfacePair {
    fn from((node, interface): (N, I)) -> Self {
        Self::new(node, interface)
    }
}

/// Errors raised when constructing a [`crate::next_hop::NextHop`] that violates its invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHopError {
    /// The address is a reserved placeholder (all-zeros or broadcast), not a concrete address.
    #[error("{0} is not a concrete next hop address")]
    ReservedIp(Ipv4Addr),
    /// The interface name is reserved and cannot be used as a next-hop interface.
    #[error("{0} is a reserved interface name and cannot be a next hop interface")]
    ReservedInterfaceName(String),
    /// Neither an interface nor an IP was given to the legacy converter.
    #[error("cannot construct a next hop without either an interface or an IP")]
    MissingInterfaceAndIp,
}

/// Errors of the trace engine. These are never used for ordinary non-reachability, which is
/// reported as a [`crate::trace::FlowDisposition`]. They indicate malformed input.
#[derive(Error, Debug)]
pub enum TraceError {
    /// Invalid next hop.
    #[error("Invalid next hop: {0}")]
    NextHop(#[from] NextHopError),
    /// Node name is not present in the snapshot
    #[error("Node {0} is not in the network, cannot perform traceroute")]
    NodeNotFound(String),
    /// Interface is not present on the node
    #[error("Interface {0} does not exist")]
    InterfaceNotFound(NodeInterfacePair),
    /// VRF is not present on the node
    #[error("VRF {1} does not exist on node {0}")]
    VrfNotFound(String, String),
    /// ACL is referenced but not defined
    #[error("ACL {1} is referenced but not defined on node {0}")]
    AclNotFound(String, String),
    /// Packet policy is referenced but not defined
    #[error("Packet policy {1} is referenced but not defined on node {0}")]
    PolicyNotFound(String, String),
    /// The node-interface pair is already connected to a different peer.
    #[error("Interface {0} is already connected")]
    AlreadyConnected(NodeInterfacePair),
    /// Json error
    #[error("{0}")]
    JsonError(Box<serde_json::Error>),
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TraceError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(Box::new(value))
    }
}

impl PartialEq for TraceError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NextHop(l0), Self::NextHop(r0)) => l0 == r0,
            (Self::NodeNotFound(l0), Self::NodeNotFound(r0)) => l0 == r0,
            (Self::InterfaceNotFound(l0), Self::InterfaceNotFound(r0)) => l0 == r0,
            (Self::VrfNotFound(l0, l1), Self::VrfNotFound(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::AclNotFound(l0, l1), Self::AclNotFound(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::PolicyNotFound(l0, l1), Self::PolicyNotFound(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::AlreadyConnected(l0), Self::AlreadyConnected(r0)) => l0 == r0,
            (Self::JsonError(l), Self::JsonError(r)) => l.to_string() == r.to_string(),
            (Self::Io(l), Self::Io(r)) => l.kind() == r.kind(),
            _ => false,
        }
    }
}
