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

#![deny(missing_docs, missing_debug_implementations)]

//! # FlowSim
//!
//! This is a library for tracing concrete packets (flows) through the forwarding state of a
//! network. Given a read-only snapshot of every device (FIBs, ACLs, NAT rules, and the links
//! between interfaces), it simulates the flow hop by hop and records every decision as a typed
//! step. The result is a set of traces, each ending in a disposition that explains what
//! happens to the flow.
//!
//! ## Main Concepts
//!
//! The [`tracer::TracerouteEngine`] is the main entry point. It operates on any type
//! implementing [`dataplane::DataPlane`]; [`dataplane::SimDataPlane`] is an in-memory snapshot
//! that can be built programmatically or loaded from JSON.
//!
//! Routes point to a [`next_hop::NextHop`], a closed set of forwarding targets (an IP that is
//! resolved recursively, an interface, a null route, another VRF, or a VXLAN tunnel endpoint).
//! Next hops are validated at construction and shared between routes.
//!
//! A [`trace::Trace`] consists of [`trace::TraceHop`]s, each holding the [`step::Step`]s
//! executed on one device. If multiple equal-cost routes exist, the engine explores every
//! branch. Traces are totally ordered, and the engine always returns them sorted, such that
//! the output is the same no matter in which order the branches were explored. Forwarding
//! loops always end a trace with [`trace::FlowDisposition::Loop`].
//!
//! ## Optional Features
//!
//! - `cli`: Build the `flowtrace` command-line tool, which reads a snapshot and a list of
//!   flows from JSON files and prints the traces.
//!
//! ## Example usage
//!
//! The following example connects two routers `r1` and `r2`, and traces a flow from `r1` to
//! an address owned by `r2`.
//!
//! ```
//! use flowsim::prelude::*;
//! use std::net::Ipv4Addr;
//!
//! fn main() -> Result<(), TraceError> {
//!     let mut dp = SimDataPlane::new();
//!     dp.add_node("r1");
//!     dp.add_node("r2");
//!     dp.add_interface("r1", "eth0", DEFAULT_VRF_NAME, Some("10.0.12.1/30".parse().unwrap()))?;
//!     dp.add_interface("r2", "eth1", DEFAULT_VRF_NAME, Some("10.0.12.2/30".parse().unwrap()))?;
//!     dp.add_interface("r2", "lo", DEFAULT_VRF_NAME, Some("10.0.0.2/32".parse().unwrap()))?;
//!     dp.add_link(("r1", "eth0"), ("r2", "eth1"))?;
//!     dp.add_route(
//!         "r1",
//!         DEFAULT_VRF_NAME,
//!         Route::new(
//!             "10.0.0.2/32".parse().unwrap(),
//!             RoutingProtocol::Static,
//!             NextHop::ip(Ipv4Addr::new(10, 0, 12, 2))?,
//!         ),
//!     )?;
//!
//!     let engine = TracerouteEngine::new(&dp);
//!     let flow = Flow::new("r1", Ipv4Addr::new(10, 0, 12, 1), Ipv4Addr::new(10, 0, 0, 2));
//!     let traces = engine.trace(&flow)?;
//!
//!     assert_eq!(traces.len(), 1);
//!     assert_eq!(traces[0].path(), vec!["r1", "r2"]);
//!     assert_eq!(traces[0].disposition, FlowDisposition::Accepted);
//!
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod dataplane;
pub mod fib;
pub mod flow;
pub mod formatter;
pub mod next_hop;
pub mod policy;
pub mod prelude;
pub mod step;
pub mod trace;
pub mod tracer;
pub mod transformation;
pub mod types;

#[cfg(test)]
mod test;
