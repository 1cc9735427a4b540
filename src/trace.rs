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

//! # Traces
//!
//! A [`Trace`] is the sequence of [`TraceHop`]s a flow takes, together with its final
//! [`FlowDisposition`]. Traces are totally ordered: first by their hops (hop by hop, step by
//! step), and then by the disposition. A set of traces for the same flow is therefore always
//! reported in the same order.

use serde::{Deserialize, Serialize};

use crate::step::{Step, StepAction};

/// Final fate of a flow.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowDisposition {
    /// Delivered to the destination
    Accepted,
    /// Dropped by an ingress filter
    DeniedIn,
    /// Dropped by an egress filter
    DeniedOut,
    /// Caught in a forwarding loop
    Loop,
    /// Sent out of an interface without a reachable neighbor
    NeighborUnreachableOrExitsNetwork,
    /// No route for the destination
    NoRoute,
    /// Dropped by a null route
    NullRouted,
}

impl FlowDisposition {
    /// Disposition implied by the action of the final step. Returns `None` for the
    /// non-terminal actions [`StepAction::SentIn`] and [`StepAction::SentOut`].
    pub fn from_action(action: StepAction) -> Option<Self> {
        match action {
            StepAction::Accepted => Some(Self::Accepted),
            StepAction::DeniedIn => Some(Self::DeniedIn),
            StepAction::DeniedOut => Some(Self::DeniedOut),
            StepAction::Loop => Some(Self::Loop),
            StepAction::NeighborUnreachableOrExitsNetwork => {
                Some(Self::NeighborUnreachableOrExitsNetwork)
            }
            StepAction::NoRoute => Some(Self::NoRoute),
            StepAction::NullRouted => Some(Self::NullRouted),
            StepAction::SentIn | StepAction::SentOut => None,
        }
    }

    /// Returns `true` if the flow reached its destination.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<FlowDisposition> for StepAction {
    fn from(value: FlowDisposition) -> Self {
        match value {
            FlowDisposition::Accepted => StepAction::Accepted,
            FlowDisposition::DeniedIn => StepAction::DeniedIn,
            FlowDisposition::DeniedOut => StepAction::DeniedOut,
            FlowDisposition::Loop => StepAction::Loop,
            FlowDisposition::NeighborUnreachableOrExitsNetwork => {
                StepAction::NeighborUnreachableOrExitsNetwork
            }
            FlowDisposition::NoRoute => StepAction::NoRoute,
            FlowDisposition::NullRouted => StepAction::NullRouted,
        }
    }
}

/// Steps executed at one node.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct TraceHop {
    /// Name of the node
    pub node: String,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl TraceHop {
    /// Create a new hop.
    pub fn new(node: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            node: node.into(),
            steps,
        }
    }

    /// Action of the last step.
    pub fn last_action(&self) -> Option<StepAction> {
        self.steps.last().map(|s| s.action)
    }
}

/// # Trace
///
/// The field order matters: the derived ordering compares the hops before the disposition.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Hops in traversal order
    pub hops: Vec<TraceHop>,
    /// Final fate of the flow
    pub disposition: FlowDisposition,
}

impl Trace {
    /// Create a new trace.
    pub fn new(hops: Vec<TraceHop>, disposition: FlowDisposition) -> Self {
        Self { hops, disposition }
    }

    /// Build a trace whose disposition is derived from the last step of the last hop.
    /// Returns `None` if there is no step or the last step is not terminal.
    pub fn from_hops(hops: Vec<TraceHop>) -> Option<Self> {
        let action = hops.last()?.last_action()?;
        let disposition = FlowDisposition::from_action(action)?;
        Some(Self { hops, disposition })
    }

    /// Action of the last step of the last hop.
    pub fn last_action(&self) -> Option<StepAction> {
        self.hops.last().and_then(TraceHop::last_action)
    }

    /// Returns `true` if the disposition matches the last step, every hop has at least one
    /// step, and no step except the last one of the trace is terminal.
    pub fn is_consistent(&self) -> bool {
        let Some(last) = self.last_action() else {
            return false;
        };
        let num_steps: usize = self.hops.iter().map(|h| h.steps.len()).sum();
        FlowDisposition::from_action(last) == Some(self.disposition)
            && self.hops.iter().all(|h| !h.steps.is_empty())
            && self
                .hops
                .iter()
                .flat_map(|h| h.steps.iter())
                .take(num_steps - 1)
                .all(|s| !s.action.is_terminal())
    }

    /// Sequence of nodes visited by the trace.
    pub fn path(&self) -> Vec<&str> {
        self.hops.iter().map(|h| h.node.as_str()).collect()
    }
}
