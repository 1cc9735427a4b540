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

//! # Packet policies
//!
//! A [`PacketPolicy`] (policy-based routing) is attached to an interface and replaces the
//! regular FIB lookup for flows received on that interface. The first rule whose guard
//! matches the flow decides what happens; if no rule matches, the default action applies.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{acl::HeaderSpace, flow::Flow};

/// What a packet policy does with a flow.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum PolicyAction {
    /// Drop the flow.
    Drop,
    /// Look up the destination in the FIB of `vrf`, or of the interface's VRF if `None`.
    FibLookup {
        /// VRF to look up the destination in
        #[serde(default)]
        vrf: Option<String>,
    },
    /// Forward towards the first address in `ips` that has a route in `vrf` (or in the
    /// interface's VRF if `None`). The lookup of that address happens in the interface's VRF.
    /// If no address has a route, `default_action` applies.
    FibLookupOverrideIp {
        /// VRF in which the candidate addresses must have a route
        #[serde(default)]
        vrf: Option<String>,
        /// Candidate next-hop addresses, in order of preference
        ips: Vec<Ipv4Addr>,
        /// Only consider connected routes when checking the candidates.
        #[serde(default)]
        require_connected: bool,
        /// Action if no candidate has a route
        default_action: Box<PolicyAction>,
    },
}

impl PolicyAction {
    /// Look up the destination in another VRF.
    pub fn fib_lookup(vrf: Option<String>) -> Self {
        Self::FibLookup { vrf }
    }
}

/// A guarded rule of a [`PacketPolicy`].
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Flows to which the rule applies
    #[serde(default)]
    pub guard: HeaderSpace,
    /// Action for those flows
    pub action: PolicyAction,
}

impl PolicyRule {
    /// Create a new rule.
    pub fn new(guard: HeaderSpace, action: PolicyAction) -> Self {
        Self { guard, action }
    }
}

/// # Packet policy
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct PacketPolicy {
    /// Name of the policy
    pub name: String,
    /// Ordered rules
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Action if no rule matches
    pub default_action: PolicyAction,
}

impl PacketPolicy {
    /// Create a policy without rules.
    pub fn new(name: impl Into<String>, default_action: PolicyAction) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default_action,
        }
    }

    /// Append a rule.
    pub fn rule(mut self, guard: HeaderSpace, action: PolicyAction) -> Self {
        self.rules.push(PolicyRule::new(guard, action));
        self
    }

    /// The action of the first matching rule, or the default action.
    pub fn evaluate(&self, flow: &Flow) -> &PolicyAction {
        self.rules
            .iter()
            .find(|rule| rule.guard.matches(flow))
            .map(|rule| &rule.action)
            .unwrap_or(&self.default_action)
    }
}
