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

//! # Data plane
//!
//! The trace engine does not compute forwarding state. It consumes a read-only snapshot
//! through the [`DataPlane`] trait. [`SimDataPlane`] is an in-memory snapshot that can be
//! built programmatically or loaded from JSON.

use std::{collections::BTreeMap, net::Ipv4Addr};

use ipnet::Ipv4Net;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    acl::{Acl, FilterResult},
    fib::{Fib, Route, RoutingProtocol},
    flow::Flow,
    next_hop::NextHop,
    policy::PacketPolicy,
    transformation::{Transformation, TransformationDirection},
    types::{NodeInterfacePair, TraceError, DEFAULT_VRF_NAME},
};

/// Read-only view on the forwarding state of a network.
///
/// Every method is a pure function of the snapshot. The snapshot is shared between worker
/// threads while tracing, hence the `Sync` bound.
pub trait DataPlane: Sync {
    /// Returns `true` if the node exists.
    fn has_node(&self, node: &str) -> bool;

    /// Returns `true` if the VRF exists on the node.
    fn has_vrf(&self, node: &str, vrf: &str) -> bool;

    /// Number of VRFs on the node.
    fn num_vrfs(&self, node: &str) -> usize;

    /// Total number of (node, VRF) pairs in the network.
    fn num_node_vrfs(&self) -> usize;

    /// VRF to which the interface belongs.
    fn interface_vrf(&self, iface: &NodeInterfacePair) -> Result<&str, TraceError>;

    /// Returns `true` if the interface is up. Unknown interfaces are down.
    fn is_interface_active(&self, iface: &NodeInterfacePair) -> bool;

    /// Name of the ACL applied to flows received on the interface.
    fn ingress_filter(&self, iface: &NodeInterfacePair) -> Result<Option<&str>, TraceError>;

    /// Name of the ACL applied to flows sent out of the interface.
    fn egress_filter(&self, iface: &NodeInterfacePair) -> Result<Option<&str>, TraceError>;

    /// Packet policy applied to flows received on the interface, replacing the FIB lookup.
    fn packet_policy(&self, iface: &NodeInterfacePair)
        -> Result<Option<&PacketPolicy>, TraceError>;

    /// Evaluate the ACL `acl` of `node` on the flow.
    fn evaluate_acl(&self, node: &str, acl: &str, flow: &Flow) -> Result<FilterResult, TraceError>;

    /// All routes in the FIB of (`node`, `vrf`) covering `addr`, most preferred first.
    fn covering_routes(&self, node: &str, vrf: &str, addr: Ipv4Addr)
        -> Result<Vec<&Route>, TraceError>;

    /// Apply the transformation of the interface in the given direction.
    fn apply_transformation(
        &self,
        iface: &NodeInterfacePair,
        direction: TransformationDirection,
        flow: &Flow,
    ) -> Result<Flow, TraceError>;

    /// Interface at the other end of the link, if any.
    fn lookup_edge(&self, iface: &NodeInterfacePair) -> Option<&NodeInterfacePair>;

    /// Returns `true` if the destination of the flow is owned by the VRF of the node.
    fn is_locally_owned(&self, node: &str, vrf: &str, flow: &Flow) -> bool;
}

/// An interface of a [`SimNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimInterface {
    /// Interface name
    pub name: String,
    /// VRF of the interface
    pub vrf: String,
    /// Whether the interface is up
    #[serde(default = "default_true")]
    pub active: bool,
    /// Configured addresses (address and subnet length)
    #[serde(default)]
    pub addresses: Vec<Ipv4Net>,
    /// ACL applied to received flows
    #[serde(default)]
    pub ingress_filter: Option<String>,
    /// ACL applied to sent flows
    #[serde(default)]
    pub egress_filter: Option<String>,
    /// Packet policy applied to received flows
    #[serde(default)]
    pub packet_policy: Option<String>,
    /// Transformation applied to received flows
    #[serde(default)]
    pub incoming_transformation: Option<Transformation>,
    /// Transformation applied to sent flows
    #[serde(default)]
    pub outgoing_transformation: Option<Transformation>,
}

fn default_true() -> bool {
    true
}

/// A VRF of a [`SimNode`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimVrf {
    /// Forwarding table
    #[serde(default)]
    pub fib: Fib,
    /// Additional addresses owned by the VRF that are not configured on an interface.
    #[serde(default)]
    pub owned_ips: Vec<Ipv4Addr>,
}

/// A device in a [`SimDataPlane`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimNode {
    /// Interfaces by name
    #[serde(default)]
    pub interfaces: BTreeMap<String, SimInterface>,
    /// VRFs by name
    #[serde(default)]
    pub vrfs: BTreeMap<String, SimVrf>,
    /// ACLs by name
    #[serde(default)]
    pub acls: BTreeMap<String, Acl>,
    /// Packet policies by name
    #[serde(default)]
    pub packet_policies: BTreeMap<String, PacketPolicy>,
}

/// # In-memory data plane snapshot
///
/// Nodes are created with a default VRF. Links are bidirectional and connect two existing
/// interfaces. Adding an interface with an address also installs the connected route of
/// its subnet.
///
/// ```
/// use flowsim::prelude::*;
/// # use std::net::Ipv4Addr;
///
/// let mut dp = SimDataPlane::new();
/// dp.add_node("r1");
/// dp.add_interface("r1", "eth0", DEFAULT_VRF_NAME, Some("10.0.0.1/24".parse().unwrap()))?;
/// let flow = Flow::new("r1", Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(10, 0, 0, 1));
/// assert!(dp.is_locally_owned("r1", DEFAULT_VRF_NAME, &flow));
/// # Ok::<(), TraceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimDataPlane {
    nodes: BTreeMap<String, SimNode>,
    #[serde(default, with = "edge_list")]
    edges: BTreeMap<NodeInterfacePair, NodeInterfacePair>,
}

impl SimDataPlane {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with an empty default VRF. Adding an existing node has no effect.
    pub fn add_node(&mut self, node: impl Into<String>) {
        self.nodes
            .entry(node.into())
            .or_default()
            .vrfs
            .entry(DEFAULT_VRF_NAME.to_string())
            .or_default();
    }

    /// Add a VRF to a node.
    pub fn add_vrf(&mut self, node: &str, vrf: impl Into<String>) -> Result<(), TraceError> {
        self.node_mut(node)?.vrfs.entry(vrf.into()).or_default();
        Ok(())
    }

    /// Add an interface to a node. If `address` is given, the connected route of the subnet
    /// is installed in the FIB of `vrf`.
    pub fn add_interface(
        &mut self,
        node: &str,
        iface: impl Into<String>,
        vrf: impl Into<String>,
        address: Option<Ipv4Net>,
    ) -> Result<(), TraceError> {
        let iface = iface.into();
        let vrf = vrf.into();
        let n = self.node_mut(node)?;
        let v = n
            .vrfs
            .get_mut(&vrf)
            .ok_or_else(|| TraceError::VrfNotFound(node.to_string(), vrf.clone()))?;
        if let Some(addr) = address {
            let connected = NextHop::interface(iface.clone(), None)?;
            v.fib.insert(Route::new(
                addr.trunc().into(),
                RoutingProtocol::Connected,
                connected,
            ));
        }
        n.interfaces.insert(
            iface.clone(),
            SimInterface {
                name: iface,
                vrf,
                active: true,
                addresses: address.into_iter().collect(),
                ingress_filter: None,
                egress_filter: None,
                packet_policy: None,
                incoming_transformation: None,
                outgoing_transformation: None,
            },
        );
        Ok(())
    }

    /// Mark an address as owned by the VRF, without configuring it on an interface.
    pub fn add_owned_ip(&mut self, node: &str, vrf: &str, addr: Ipv4Addr) -> Result<(), TraceError> {
        self.vrf_mut(node, vrf)?.owned_ips.push(addr);
        Ok(())
    }

    /// Bring an interface up or down.
    pub fn set_interface_active(
        &mut self,
        iface: &NodeInterfacePair,
        active: bool,
    ) -> Result<(), TraceError> {
        self.iface_mut(iface)?.active = active;
        Ok(())
    }

    /// Connect two interfaces with a bidirectional link.
    pub fn add_link(
        &mut self,
        a: impl Into<NodeInterfacePair>,
        b: impl Into<NodeInterfacePair>,
    ) -> Result<(), TraceError> {
        let a = a.into();
        let b = b.into();
        for iface in [&a, &b] {
            self.iface(iface)?;
            if self.edges.contains_key(iface) {
                return Err(TraceError::AlreadyConnected(iface.clone()));
            }
        }
        debug!("link {a} <-> {b}");
        self.edges.insert(a.clone(), b.clone());
        self.edges.insert(b, a);
        Ok(())
    }

    /// Install a route in the FIB of (`node`, `vrf`).
    pub fn add_route(&mut self, node: &str, vrf: &str, route: Route) -> Result<(), TraceError> {
        self.vrf_mut(node, vrf)?.fib.insert(route);
        Ok(())
    }

    /// Define an ACL on a node, replacing any ACL with the same name.
    pub fn add_acl(&mut self, node: &str, acl: Acl) -> Result<(), TraceError> {
        self.node_mut(node)?.acls.insert(acl.name.clone(), acl);
        Ok(())
    }

    /// Apply the ACL `acl` to flows received on the interface.
    pub fn set_ingress_filter(
        &mut self,
        iface: &NodeInterfacePair,
        acl: impl Into<String>,
    ) -> Result<(), TraceError> {
        let acl = self.check_acl(&iface.node, acl.into())?;
        self.iface_mut(iface)?.ingress_filter = Some(acl);
        Ok(())
    }

    /// Apply the ACL `acl` to flows sent out of the interface.
    pub fn set_egress_filter(
        &mut self,
        iface: &NodeInterfacePair,
        acl: impl Into<String>,
    ) -> Result<(), TraceError> {
        let acl = self.check_acl(&iface.node, acl.into())?;
        self.iface_mut(iface)?.egress_filter = Some(acl);
        Ok(())
    }

    /// Define a packet policy on a node, replacing any policy with the same name.
    pub fn add_packet_policy(&mut self, node: &str, policy: PacketPolicy) -> Result<(), TraceError> {
        self.node_mut(node)?
            .packet_policies
            .insert(policy.name.clone(), policy);
        Ok(())
    }

    /// Apply the packet policy `policy` to flows received on the interface.
    pub fn set_packet_policy(
        &mut self,
        iface: &NodeInterfacePair,
        policy: impl Into<String>,
    ) -> Result<(), TraceError> {
        let policy = policy.into();
        if !self.node(&iface.node)?.packet_policies.contains_key(&policy) {
            return Err(TraceError::PolicyNotFound(iface.node.clone(), policy));
        }
        self.iface_mut(iface)?.packet_policy = Some(policy);
        Ok(())
    }

    /// Set the transformation of the interface in the given direction.
    pub fn set_transformation(
        &mut self,
        iface: &NodeInterfacePair,
        direction: TransformationDirection,
        transformation: Transformation,
    ) -> Result<(), TraceError> {
        let i = self.iface_mut(iface)?;
        match direction {
            TransformationDirection::Incoming => i.incoming_transformation = Some(transformation),
            TransformationDirection::Outgoing => i.outgoing_transformation = Some(transformation),
        }
        Ok(())
    }

    /// Get a node.
    pub fn node(&self, node: &str) -> Result<&SimNode, TraceError> {
        self.nodes
            .get(node)
            .ok_or_else(|| TraceError::NodeNotFound(node.to_string()))
    }

    /// Iterate over all node names.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Get the FIB of (`node`, `vrf`).
    pub fn fib(&self, node: &str, vrf: &str) -> Result<&Fib, TraceError> {
        self.vrf(node, vrf).map(|v| &v.fib)
    }

    /// Read a snapshot from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the snapshot as a JSON string.
    pub fn as_json_str(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string(self)?)
    }

    fn node_mut(&mut self, node: &str) -> Result<&mut SimNode, TraceError> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| TraceError::NodeNotFound(node.to_string()))
    }

    fn vrf(&self, node: &str, vrf: &str) -> Result<&SimVrf, TraceError> {
        self.node(node)?
            .vrfs
            .get(vrf)
            .ok_or_else(|| TraceError::VrfNotFound(node.to_string(), vrf.to_string()))
    }

    fn vrf_mut(&mut self, node: &str, vrf: &str) -> Result<&mut SimVrf, TraceError> {
        self.node_mut(node)?
            .vrfs
            .get_mut(vrf)
            .ok_or_else(|| TraceError::VrfNotFound(node.to_string(), vrf.to_string()))
    }

    fn iface(&self, iface: &NodeInterfacePair) -> Result<&SimInterface, TraceError> {
        self.node(&iface.node)?
            .interfaces
            .get(&iface.interface)
            .ok_or_else(|| TraceError::InterfaceNotFound(iface.clone()))
    }

    fn iface_mut(&mut self, iface: &NodeInterfacePair) -> Result<&mut SimInterface, TraceError> {
        self.node_mut(&iface.node)?
            .interfaces
            .get_mut(&iface.interface)
            .ok_or_else(|| TraceError::InterfaceNotFound(iface.clone()))
    }

    fn check_acl(&self, node: &str, acl: String) -> Result<String, TraceError> {
        if self.node(node)?.acls.contains_key(&acl) {
            Ok(acl)
        } else {
            Err(TraceError::AclNotFound(node.to_string(), acl))
        }
    }
}

impl DataPlane for SimDataPlane {
    fn has_node(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    fn has_vrf(&self, node: &str, vrf: &str) -> bool {
        self.vrf(node, vrf).is_ok()
    }

    fn num_vrfs(&self, node: &str) -> usize {
        self.nodes.get(node).map(|n| n.vrfs.len()).unwrap_or_default()
    }

    fn num_node_vrfs(&self) -> usize {
        self.nodes.values().map(|n| n.vrfs.len()).sum()
    }

    fn interface_vrf(&self, iface: &NodeInterfacePair) -> Result<&str, TraceError> {
        self.iface(iface).map(|i| i.vrf.as_str())
    }

    fn is_interface_active(&self, iface: &NodeInterfacePair) -> bool {
        self.iface(iface).map(|i| i.active).unwrap_or(false)
    }

    fn ingress_filter(&self, iface: &NodeInterfacePair) -> Result<Option<&str>, TraceError> {
        Ok(self.iface(iface)?.ingress_filter.as_deref())
    }

    fn egress_filter(&self, iface: &NodeInterfacePair) -> Result<Option<&str>, TraceError> {
        Ok(self.iface(iface)?.egress_filter.as_deref())
    }

    fn packet_policy(
        &self,
        iface: &NodeInterfacePair,
    ) -> Result<Option<&PacketPolicy>, TraceError> {
        let Some(name) = &self.iface(iface)?.packet_policy else {
            return Ok(None);
        };
        self.node(&iface.node)?
            .packet_policies
            .get(name)
            .map(Some)
            .ok_or_else(|| TraceError::PolicyNotFound(iface.node.clone(), name.clone()))
    }

    fn evaluate_acl(&self, node: &str, acl: &str, flow: &Flow) -> Result<FilterResult, TraceError> {
        self.node(node)?
            .acls
            .get(acl)
            .map(|a| a.evaluate(flow))
            .ok_or_else(|| TraceError::AclNotFound(node.to_string(), acl.to_string()))
    }

    fn covering_routes(
        &self,
        node: &str,
        vrf: &str,
        addr: Ipv4Addr,
    ) -> Result<Vec<&Route>, TraceError> {
        Ok(self.fib(node, vrf)?.covering_routes(addr))
    }

    fn apply_transformation(
        &self,
        iface: &NodeInterfacePair,
        direction: TransformationDirection,
        flow: &Flow,
    ) -> Result<Flow, TraceError> {
        let i = self.iface(iface)?;
        let t = match direction {
            TransformationDirection::Incoming => i.incoming_transformation.as_ref(),
            TransformationDirection::Outgoing => i.outgoing_transformation.as_ref(),
        };
        Ok(t.map(|t| t.apply(flow)).unwrap_or_else(|| flow.clone()))
    }

    fn lookup_edge(&self, iface: &NodeInterfacePair) -> Option<&NodeInterfacePair> {
        self.edges.get(iface)
    }

    fn is_locally_owned(&self, node: &str, vrf: &str, flow: &Flow) -> bool {
        let Some(n) = self.nodes.get(node) else {
            return false;
        };
        let owned_by_iface = n
            .interfaces
            .values()
            .filter(|i| i.active && i.vrf == vrf)
            .flat_map(|i| i.addresses.iter())
            .any(|a| a.addr() == flow.dst_ip);
        owned_by_iface
            || n.vrfs
                .get(vrf)
                .map(|v| v.owned_ips.contains(&flow.dst_ip))
                .unwrap_or(false)
    }
}

/// JSON objects only have string keys, so the links are stored as a list of pairs.
mod edge_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::NodeInterfacePair;

    pub fn serialize<S>(
        edges: &BTreeMap<NodeInterfacePair, NodeInterfacePair>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        edges.iter().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<NodeInterfacePair, NodeInterfacePair>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(NodeInterfacePair, NodeInterfacePair)>::deserialize(deserializer)?;
        let mut edges = BTreeMap::new();
        for (a, b) in pairs {
            edges.insert(b.clone(), a.clone());
            edges.insert(a, b);
        }
        Ok(edges)
    }
}
