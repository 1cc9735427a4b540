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

//! # Steps
//!
//! A [`Step`] records one decision taken while processing a flow at a node. It consists of a
//! descriptive [`StepDetail`] and the outcome, a [`StepAction`]. Steps are immutable once
//! they are appended to a hop.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{acl::FilterResult, fib::Route, flow::Flow, types::NodeInterfacePair};

/// Outcome of a single step.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    /// The flow is delivered to the node.
    Accepted,
    /// The flow is dropped by the ingress filter.
    DeniedIn,
    /// The flow is dropped by the egress filter.
    DeniedOut,
    /// The flow is caught in a forwarding loop.
    Loop,
    /// The flow leaves an interface without a (reachable) neighbor.
    NeighborUnreachableOrExitsNetwork,
    /// No route matches the destination.
    NoRoute,
    /// The best route discards the flow.
    NullRouted,
    /// The flow was received and continues to be processed.
    SentIn,
    /// The flow was forwarded and continues to be processed.
    SentOut,
}

impl StepAction {
    /// Returns `true` if the action ends the trace.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepAction::SentIn | StepAction::SentOut)
    }
}

/// Forwarding decision taken by the routing step.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum ForwardingDecision {
    /// Send the flow out of an interface, optionally to the given ARP IP.
    OutInterface {
        /// Output interface
        interface: String,
        /// Address of the neighbor
        arp_ip: Option<Ipv4Addr>,
    },
    /// Continue the lookup in another VRF.
    NextVrf(String),
    /// Encapsulate the flow and send it to a VXLAN tunnel endpoint out of an interface.
    VxlanTunnel {
        /// VXLAN network identifier
        vni: u32,
        /// Tunnel endpoint
        vtep_ip: Ipv4Addr,
        /// Underlay output interface
        interface: String,
        /// Underlay neighbor address
        arp_ip: Option<Ipv4Addr>,
    },
    /// The flow is dropped.
    Discarded,
    /// There is no usable route.
    NoRoute,
}

impl ForwardingDecision {
    /// The output interface, if the decision sends the flow out of an interface.
    pub fn out_interface(&self) -> Option<&str> {
        match self {
            ForwardingDecision::OutInterface { interface, .. }
            | ForwardingDecision::VxlanTunnel { interface, .. } => Some(interface),
            ForwardingDecision::NextVrf(_)
            | ForwardingDecision::Discarded
            | ForwardingDecision::NoRoute => None,
        }
    }
}

/// Detail of receiving a flow on an interface.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct EnterInputIfaceDetail {
    /// Interface on which the flow is received
    pub input_interface: NodeInterfacePair,
    /// VRF of that interface
    pub input_vrf: String,
    /// Result of the ingress filter, if one was evaluated
    pub filter: Option<FilterResult>,
    /// Flow after the incoming transformation, if it changed the flow
    pub transformed_flow: Option<Flow>,
}

/// Detail of a FIB lookup.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDetail {
    /// VRF in which the lookup happened
    pub vrf: String,
    /// All routes covering the destination, most preferred first
    pub routes: Vec<Route>,
    /// Decision taken for this branch
    pub decision: ForwardingDecision,
}

/// Detail of sending a flow out of an interface.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct ExitOutputIfaceDetail {
    /// Interface out of which the flow is sent
    pub output_interface: NodeInterfacePair,
    /// Result of the egress filter, if one was evaluated
    pub filter: Option<FilterResult>,
    /// Flow before the outgoing transformation
    pub original_flow: Flow,
    /// Flow after the outgoing transformation
    pub transformed_flow: Flow,
}

/// Routing and exit of one hop fused into a single record.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingDetail {
    /// VRF in which the lookup happened
    pub vrf: String,
    /// All routes covering the destination, most preferred first
    pub routes: Vec<Route>,
    /// Decision taken for this branch
    pub decision: ForwardingDecision,
    /// Interface out of which the flow is sent
    pub output_interface: Option<NodeInterfacePair>,
    /// Result of the egress filter, if one was evaluated
    pub filter: Option<FilterResult>,
    /// Flow before the outgoing transformation
    pub original_flow: Option<Flow>,
    /// Flow after the outgoing transformation
    pub transformed_flow: Option<Flow>,
}

/// Accumulates a [`ForwardingDetail`] while a hop is processed.
#[derive(Debug, Clone)]
pub struct ForwardingDetailBuilder {
    detail: ForwardingDetail,
}

impl ForwardingDetailBuilder {
    /// Start from the result of the routing step.
    pub fn new(vrf: impl Into<String>, routes: Vec<Route>, decision: ForwardingDecision) -> Self {
        Self {
            detail: ForwardingDetail {
                vrf: vrf.into(),
                routes,
                decision,
                output_interface: None,
                filter: None,
                original_flow: None,
                transformed_flow: None,
            },
        }
    }

    /// Set the output interface.
    pub fn output_interface(&mut self, iface: NodeInterfacePair) -> &mut Self {
        self.detail.output_interface = Some(iface);
        self
    }

    /// Set the result of the egress filter.
    pub fn filter(&mut self, filter: Option<FilterResult>) -> &mut Self {
        self.detail.filter = filter;
        self
    }

    /// Set the flow before and after the outgoing transformation.
    pub fn flows(&mut self, original: Flow, transformed: Flow) -> &mut Self {
        self.detail.original_flow = Some(original);
        self.detail.transformed_flow = Some(transformed);
        self
    }

    /// Freeze the detail.
    pub fn build(self) -> ForwardingDetail {
        self.detail
    }
}

/// Detail of evaluating the packet policy of the input interface.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDetail {
    /// Name of the packet policy
    pub policy: String,
    /// VRF in which the destination is looked up, or `None` if the policy drops the flow
    pub lookup_vrf: Option<String>,
    /// Address looked up instead of the destination, if the policy overrides it
    pub lookup_ip: Option<Ipv4Addr>,
}

/// Detail without a dedicated structure, used for acceptance and loops.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct GenericDetail {
    /// VRF in which the step happened
    pub vrf: String,
    /// Description of the step
    pub message: String,
}

/// Closed set of step details.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum StepDetail {
    /// Receive the flow on an interface.
    EnterInputInterface(EnterInputIfaceDetail),
    /// Look up the destination in a FIB.
    Routing(RoutingDetail),
    /// Send the flow out of an interface.
    ExitOutputInterface(ExitOutputIfaceDetail),
    /// Routing and exit in one record.
    Forwarding(ForwardingDetail),
    /// Evaluate a packet policy. Actions: `SENT_IN` or `DENIED_IN`.
    Policy(PolicyDetail),
    /// Any other step.
    Generic(GenericDetail),
}

/// # Step
///
/// One recorded decision point of a hop.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// What happened
    pub detail: StepDetail,
    /// Outcome
    pub action: StepAction,
}

impl Step {
    /// Create a new step.
    pub fn new(detail: StepDetail, action: StepAction) -> Self {
        Self { detail, action }
    }

    /// Create a generic step.
    pub fn generic(vrf: impl Into<String>, message: impl Into<String>, action: StepAction) -> Self {
        Self::new(
            StepDetail::Generic(GenericDetail {
                vrf: vrf.into(),
                message: message.into(),
            }),
            action,
        )
    }
}
