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

//! Module that implements human-readable formatting of steps, hops and traces.

use std::fmt::{Display, Formatter, Result};

use itertools::Itertools;

use crate::{
    acl::{FilterResult, LineAction},
    fib::{Route, RoutingProtocol},
    step::{
        EnterInputIfaceDetail, ExitOutputIfaceDetail, ForwardingDecision, ForwardingDetail,
        PolicyDetail, RoutingDetail, Step, StepAction, StepDetail,
    },
    trace::{FlowDisposition, Trace, TraceHop},
};

//
// Enumerations
//
impl Display for StepAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(match self {
            StepAction::Accepted => "ACCEPTED",
            StepAction::DeniedIn => "DENIED_IN",
            StepAction::DeniedOut => "DENIED_OUT",
            StepAction::Loop => "LOOP",
            StepAction::NeighborUnreachableOrExitsNetwork => {
                "NEIGHBOR_UNREACHABLE_OR_EXITS_NETWORK"
            }
            StepAction::NoRoute => "NO_ROUTE",
            StepAction::NullRouted => "NULL_ROUTED",
            StepAction::SentIn => "SENT_IN",
            StepAction::SentOut => "SENT_OUT",
        })
    }
}

impl Display for FlowDisposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(&StepAction::from(*self), f)
    }
}

impl Display for RoutingProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(match self {
            RoutingProtocol::Connected => "connected",
            RoutingProtocol::Local => "local",
            RoutingProtocol::Static => "static",
            RoutingProtocol::Ebgp => "ebgp",
            RoutingProtocol::Ospf => "ospf",
            RoutingProtocol::Isis => "isis",
            RoutingProtocol::Ibgp => "ibgp",
            RoutingProtocol::Aggregate => "aggregate",
        })
    }
}

//
// Routes and filters
//
impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{} {} [{}/{}] via {}",
            self.protocol, self.prefix, self.admin_distance, self.metric, self.next_hop
        )
    }
}

impl Display for FilterResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let action = match self.action {
            LineAction::Permit => "permitted",
            LineAction::Deny => "denied",
        };
        write!(f, "{action} by {} ({})", self.filter, self.matched_line)
    }
}

impl Display for ForwardingDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ForwardingDecision::OutInterface { interface, arp_ip } => match arp_ip {
                Some(ip) => write!(f, "forward out {interface} to {ip}"),
                None => write!(f, "forward out {interface}"),
            },
            ForwardingDecision::NextVrf(vrf) => write!(f, "lookup in VRF {vrf}"),
            ForwardingDecision::VxlanTunnel {
                vni,
                vtep_ip,
                interface,
                ..
            } => write!(f, "tunnel to {vtep_ip} (vni {vni}) out {interface}"),
            ForwardingDecision::Discarded => f.write_str("discard"),
            ForwardingDecision::NoRoute => f.write_str("no route"),
        }
    }
}

fn fmt_routes(routes: &[Route]) -> String {
    if routes.is_empty() {
        String::from("[]")
    } else {
        format!("[{}]", routes.iter().join(", "))
    }
}

//
// Step details
//
impl Display for EnterInputIfaceDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "enter {} (vrf {})", self.input_interface, self.input_vrf)?;
        if let Some(filter) = &self.filter {
            write!(f, ", {filter}")?;
        }
        if let Some(flow) = &self.transformed_flow {
            write!(f, ", transformed to {flow}")?;
        }
        Ok(())
    }
}

impl Display for RoutingDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "routing in vrf {}: {}, routes {}",
            self.vrf,
            self.decision,
            fmt_routes(&self.routes)
        )
    }
}

impl Display for ExitOutputIfaceDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "exit {}", self.output_interface)?;
        if let Some(filter) = &self.filter {
            write!(f, ", {filter}")?;
        }
        if self.transformed_flow != self.original_flow {
            write!(f, ", transformed to {}", self.transformed_flow)?;
        }
        Ok(())
    }
}

impl Display for ForwardingDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "forwarding in vrf {}: {}, routes {}",
            self.vrf,
            self.decision,
            fmt_routes(&self.routes)
        )?;
        if let Some(filter) = &self.filter {
            write!(f, ", {filter}")?;
        }
        if let (Some(orig), Some(new)) = (&self.original_flow, &self.transformed_flow) {
            if orig != new {
                write!(f, ", transformed to {new}")?;
            }
        }
        Ok(())
    }
}

impl Display for PolicyDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "policy {}: ", self.policy)?;
        match (&self.lookup_vrf, self.lookup_ip) {
            (None, _) => f.write_str("drop"),
            (Some(vrf), None) => write!(f, "lookup in vrf {vrf}"),
            (Some(vrf), Some(ip)) => write!(f, "lookup {ip} in vrf {vrf}"),
        }
    }
}

impl Display for StepDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            StepDetail::EnterInputInterface(d) => Display::fmt(d, f),
            StepDetail::Routing(d) => Display::fmt(d, f),
            StepDetail::ExitOutputInterface(d) => Display::fmt(d, f),
            StepDetail::Forwarding(d) => Display::fmt(d, f),
            StepDetail::Policy(d) => Display::fmt(d, f),
            StepDetail::Generic(d) => write!(f, "vrf {}: {}", d.vrf, d.message),
        }
    }
}

//
// Steps, hops and traces
//
impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} => {}", self.detail, self.action)
    }
}

impl Display for TraceHop {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "{}:", self.node)?;
        for step in &self.steps {
            writeln!(f, "  - {step}")?;
        }
        Ok(())
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "{} ({})", self.disposition, self.path().join(" -> "))?;
        for (i, hop) in self.hops.iter().enumerate() {
            write!(f, "{}. {hop}", i + 1)?;
        }
        Ok(())
    }
}
