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

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::{
    dataplane::SimDataPlane,
    fib::{Route, RoutingProtocol},
    next_hop::NextHop,
    step::StepAction,
    trace::Trace,
    types::{Ipv4Prefix, NodeInterfacePair, DEFAULT_VRF_NAME},
};

mod test_acl;
mod test_next_hop;
mod test_trace;

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn pfx(s: &str) -> Ipv4Prefix {
    s.parse().unwrap()
}

fn net(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

fn iface(node: &str, interface: &str) -> NodeInterfacePair {
    NodeInterfacePair::new(node, interface)
}

fn static_route(prefix: &str, next_hop: NextHop) -> Route {
    Route::new(pfx(prefix), RoutingProtocol::Static, next_hop)
}

/// Actions of all steps, grouped by hop.
fn actions(trace: &Trace) -> Vec<(&str, Vec<StepAction>)> {
    trace
        .hops
        .iter()
        .map(|h| (h.node.as_str(), h.steps.iter().map(|s| s.action).collect()))
        .collect()
}

/// Two routers connected by a single link:
///
/// ```text
/// r1[eth9] 10.9.0.1/24
/// r1[eth0] 10.0.12.1/30 <---> r2[eth1] 10.0.12.2/30
///                             r2[lo]   10.0.0.2/32
/// ```
///
/// `r1` has a static route for `10.0.0.0/24` out of `eth0`.
fn two_routers() -> SimDataPlane {
    let mut dp = SimDataPlane::new();
    dp.add_node("r1");
    dp.add_node("r2");
    dp.add_interface("r1", "eth9", DEFAULT_VRF_NAME, Some(net("10.9.0.1/24")))
        .unwrap();
    dp.add_interface("r1", "eth0", DEFAULT_VRF_NAME, Some(net("10.0.12.1/30")))
        .unwrap();
    dp.add_interface("r2", "eth1", DEFAULT_VRF_NAME, Some(net("10.0.12.2/30")))
        .unwrap();
    dp.add_interface("r2", "lo", DEFAULT_VRF_NAME, Some(net("10.0.0.2/32")))
        .unwrap();
    dp.add_link(iface("r1", "eth0"), iface("r2", "eth1"))
        .unwrap();
    dp.add_route(
        "r1",
        DEFAULT_VRF_NAME,
        static_route("10.0.0.0/24", NextHop::interface("eth0", None).unwrap()),
    )
    .unwrap();
    dp
}

/// `r1` has two equal-cost routes for `10.0.0.0/24`, one out of `eth0` towards `r2`, and one
/// out of `eth1` towards `r3`. Both `r2` and `r3` own `10.0.0.100`.
fn ecmp_routers() -> SimDataPlane {
    let mut dp = SimDataPlane::new();
    for r in ["r1", "r2", "r3"] {
        dp.add_node(r);
    }
    dp.add_interface("r1", "eth0", DEFAULT_VRF_NAME, Some(net("10.0.12.1/30")))
        .unwrap();
    dp.add_interface("r1", "eth1", DEFAULT_VRF_NAME, Some(net("10.0.13.1/30")))
        .unwrap();
    dp.add_interface("r2", "eth1", DEFAULT_VRF_NAME, Some(net("10.0.12.2/30")))
        .unwrap();
    dp.add_interface("r3", "eth1", DEFAULT_VRF_NAME, Some(net("10.0.13.2/30")))
        .unwrap();
    dp.add_link(iface("r1", "eth0"), iface("r2", "eth1"))
        .unwrap();
    dp.add_link(iface("r1", "eth1"), iface("r3", "eth1"))
        .unwrap();
    for out in ["eth1", "eth0"] {
        dp.add_route(
            "r1",
            DEFAULT_VRF_NAME,
            static_route("10.0.0.0/24", NextHop::interface(out, None).unwrap()),
        )
        .unwrap();
    }
    dp.add_owned_ip("r2", DEFAULT_VRF_NAME, ip("10.0.0.100"))
        .unwrap();
    dp.add_owned_ip("r3", DEFAULT_VRF_NAME, ip("10.0.0.100"))
        .unwrap();
    dp
}
