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

//! # Access control lists
//!
//! An [`Acl`] is an ordered list of [`AclLine`]s. The first line whose [`HeaderSpace`]
//! matches the flow decides. If no line matches, the flow is denied.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{
    flow::{Flow, IpProtocol},
    types::Ipv4Prefix,
};

/// Name recorded as matched line when no line of the ACL matches.
pub const IMPLICIT_DENY_LINE: &str = "implicit deny";

/// Action of an ACL line.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LineAction {
    /// Let the flow pass
    Permit,
    /// Drop the flow
    Deny,
}

impl LineAction {
    /// Returns `true` for [`LineAction::Permit`].
    pub fn is_permit(&self) -> bool {
        matches!(self, LineAction::Permit)
    }
}

/// Inclusive range of port numbers.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortRange {
    /// First port of the range
    pub start: u16,
    /// Last port of the range (inclusive)
    pub end: u16,
}

impl PortRange {
    /// Range containing exactly one port.
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Range from `start` to `end` (both inclusive).
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }
}

/// Set of packet headers. Every empty field matches any value; non-empty fields match if any
/// of their elements match. All fields must match.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderSpace {
    /// Source prefixes
    #[serde(default)]
    pub src_ips: Vec<Ipv4Prefix>,
    /// Destination prefixes
    #[serde(default)]
    pub dst_ips: Vec<Ipv4Prefix>,
    /// IP protocols
    #[serde(default)]
    pub ip_protocols: Vec<IpProtocol>,
    /// Source ports. A flow without ports never matches a non-empty port constraint.
    #[serde(default)]
    pub src_ports: Vec<PortRange>,
    /// Destination ports. A flow without ports never matches a non-empty port constraint.
    #[serde(default)]
    pub dst_ports: Vec<PortRange>,
}

impl HeaderSpace {
    /// Header space matching every flow.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict the source addresses.
    pub fn src(mut self, prefix: Ipv4Prefix) -> Self {
        self.src_ips.push(prefix);
        self
    }

    /// Restrict the destination addresses.
    pub fn dst(mut self, prefix: Ipv4Prefix) -> Self {
        self.dst_ips.push(prefix);
        self
    }

    /// Restrict the protocol.
    pub fn protocol(mut self, protocol: IpProtocol) -> Self {
        self.ip_protocols.push(protocol.normalized());
        self
    }

    /// Restrict the source ports.
    pub fn src_port(mut self, range: PortRange) -> Self {
        self.src_ports.push(range);
        self
    }

    /// Restrict the destination ports.
    pub fn dst_port(mut self, range: PortRange) -> Self {
        self.dst_ports.push(range);
        self
    }

    /// Check whether the flow's header is part of this header space.
    pub fn matches(&self, flow: &Flow) -> bool {
        matches_ip(&self.src_ips, flow.src_ip)
            && matches_ip(&self.dst_ips, flow.dst_ip)
            && matches_protocol(&self.ip_protocols, flow.ip_protocol)
            && matches_port(&self.src_ports, flow, flow.src_port)
            && matches_port(&self.dst_ports, flow, flow.dst_port)
    }
}

fn matches_ip(prefixes: &[Ipv4Prefix], addr: Ipv4Addr) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| p.contains_addr(&addr))
}

fn matches_protocol(protocols: &[IpProtocol], protocol: IpProtocol) -> bool {
    protocols.is_empty() || protocols.iter().any(|p| p.number() == protocol.number())
}

fn matches_port(ranges: &[PortRange], flow: &Flow, port: u16) -> bool {
    ranges.is_empty()
        || (flow.ip_protocol.has_ports() && ranges.iter().any(|r| r.contains(port)))
}

/// A single line of an ACL.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct AclLine {
    /// Name of the line, as shown in the trace
    pub name: String,
    /// What to do with matching flows
    pub action: LineAction,
    /// Flows matched by this line
    #[serde(default)]
    pub matches: HeaderSpace,
}

impl AclLine {
    /// Permit all flows in `matches`.
    pub fn permit(name: impl Into<String>, matches: HeaderSpace) -> Self {
        Self {
            name: name.into(),
            action: LineAction::Permit,
            matches,
        }
    }

    /// Deny all flows in `matches`.
    pub fn deny(name: impl Into<String>, matches: HeaderSpace) -> Self {
        Self {
            name: name.into(),
            action: LineAction::Deny,
            matches,
        }
    }
}

/// # Access control list
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Acl {
    /// Name of the ACL
    pub name: String,
    /// Ordered lines
    pub lines: Vec<AclLine>,
}

impl Acl {
    /// Create a new ACL.
    pub fn new(name: impl Into<String>, lines: Vec<AclLine>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Evaluate the ACL on the flow. The first matching line decides.
    pub fn evaluate(&self, flow: &Flow) -> FilterResult {
        match self.lines.iter().find(|line| line.matches.matches(flow)) {
            Some(line) => FilterResult {
                filter: self.name.clone(),
                action: line.action,
                matched_line: line.name.clone(),
            },
            None => FilterResult {
                filter: self.name.clone(),
                action: LineAction::Deny,
                matched_line: IMPLICIT_DENY_LINE.to_string(),
            },
        }
    }
}

/// Outcome of evaluating a filter, recorded in the step details.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    /// Name of the evaluated ACL
    pub filter: String,
    /// Resulting action
    pub action: LineAction,
    /// Name of the line that matched, or [`IMPLICIT_DENY_LINE`].
    pub matched_line: String,
}

impl FilterResult {
    /// Returns `true` if the flow is permitted.
    pub fn is_permit(&self) -> bool {
        self.action.is_permit()
    }
}
