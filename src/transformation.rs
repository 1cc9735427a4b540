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

//! # Packet transformations (NAT)
//!
//! An interface may carry one [`Transformation`] per [`TransformationDirection`]. A
//! transformation is a list of rules; the first rule whose guard matches the flow rewrites
//! it. Flows that match no rule are left unchanged.

use std::{fmt::Display, net::Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::{acl::HeaderSpace, flow::Flow};

/// Direction in which a transformation is applied on an interface.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TransformationDirection {
    /// Applied to flows received on the interface, after the ingress filter.
    Incoming,
    /// Applied to flows sent out of the interface, before the egress filter.
    Outgoing,
}

impl Display for TransformationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformationDirection::Incoming => f.write_str("incoming"),
            TransformationDirection::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// A single rewrite rule.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationRule {
    /// Flows to rewrite
    #[serde(default)]
    pub guard: HeaderSpace,
    /// New source address
    #[serde(default)]
    pub src_ip: Option<Ipv4Addr>,
    /// New source port (ignored for protocols without ports)
    #[serde(default)]
    pub src_port: Option<u16>,
    /// New destination address
    #[serde(default)]
    pub dst_ip: Option<Ipv4Addr>,
    /// New destination port (ignored for protocols without ports)
    #[serde(default)]
    pub dst_port: Option<u16>,
}

impl TransformationRule {
    /// Rule that matches the given header space and rewrites nothing yet.
    pub fn when(guard: HeaderSpace) -> Self {
        Self {
            guard,
            ..Default::default()
        }
    }

    /// Rewrite the source address (source NAT).
    pub fn src_nat(mut self, addr: Ipv4Addr) -> Self {
        self.src_ip = Some(addr);
        self
    }

    /// Rewrite the destination address (destination NAT).
    pub fn dst_nat(mut self, addr: Ipv4Addr) -> Self {
        self.dst_ip = Some(addr);
        self
    }

    /// Rewrite the source port.
    pub fn src_pat(mut self, port: u16) -> Self {
        self.src_port = Some(port);
        self
    }

    /// Rewrite the destination port.
    pub fn dst_pat(mut self, port: u16) -> Self {
        self.dst_port = Some(port);
        self
    }

    fn rewrite(&self, flow: &Flow) -> Flow {
        let mut new = flow.clone();
        if let Some(ip) = self.src_ip {
            new.src_ip = ip;
        }
        if let Some(ip) = self.dst_ip {
            new.dst_ip = ip;
        }
        if flow.ip_protocol.has_ports() {
            if let Some(port) = self.src_port {
                new.src_port = port;
            }
            if let Some(port) = self.dst_port {
                new.dst_port = port;
            }
        }
        new
    }
}

/// Ordered list of rewrite rules.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transformation {
    /// Rules, the first matching one applies
    pub rules: Vec<TransformationRule>,
}

impl Transformation {
    /// Create a transformation from rules.
    pub fn new(rules: Vec<TransformationRule>) -> Self {
        Self { rules }
    }

    /// Apply the first matching rule. Returns the flow unchanged if no rule matches.
    pub fn apply(&self, flow: &Flow) -> Flow {
        self.rules
            .iter()
            .find(|rule| rule.guard.matches(flow))
            .map(|rule| rule.rewrite(flow))
            .unwrap_or_else(|| flow.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Ipv4Prefix;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_matching_rule_applies() {
        let inside: Ipv4Prefix = "10.0.0.0/8".parse().unwrap();
        let t = Transformation::new(vec![
            TransformationRule::when(HeaderSpace::any().src(inside))
                .src_nat(Ipv4Addr::new(1, 1, 1, 1))
                .src_pat(4000),
            TransformationRule::when(HeaderSpace::any()).src_nat(Ipv4Addr::new(2, 2, 2, 2)),
        ]);
        let flow = Flow::new("r1", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(8, 8, 8, 8));
        let new = t.apply(&flow);
        assert_eq!(new.src_ip, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(new.src_port, 4000);
        assert_eq!(new.dst_ip, flow.dst_ip);

        let outside = Flow::new("r1", Ipv4Addr::new(11, 0, 0, 1), Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(t.apply(&outside).src_ip, Ipv4Addr::new(2, 2, 2, 2));
    }

    #[test]
    fn no_match_is_identity() {
        let t = Transformation::new(vec![TransformationRule::when(
            HeaderSpace::any().dst("192.168.0.0/16".parse().unwrap()),
        )
        .dst_nat(Ipv4Addr::new(192, 168, 0, 1))]);
        let flow = Flow::new("r1", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(t.apply(&flow), flow);
    }
}
