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

//! # Forwarding information base
//!
//! A [`Fib`] stores the [`Route`]s of one VRF in a prefix trie. A lookup returns every route
//! whose prefix covers the address, and [`best_routes`] selects the equally preferred routes
//! among them.
//!
//! Routes are compared as follows:
//! 1. longest prefix,
//! 2. lowest administrative distance,
//! 3. lowest protocol preference rank (see [`RoutingProtocol::rank`]),
//! 4. lowest metric.
//!
//! All routes that tie on these four criteria are equal-cost (ECMP) routes. Candidates are
//! always listed in a total order that additionally compares the prefix and the next hop, such
//! that every lookup yields the same sequence no matter in which order the routes were added.

use std::{cmp::Reverse, net::Ipv4Addr, sync::Arc};

use prefix_trie::PrefixMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{next_hop::NextHop, types::Ipv4Prefix};

/// Source protocol of a route. The declaration order is the preference rank used to break
/// ties in administrative distance.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RoutingProtocol {
    /// Directly connected subnet
    Connected,
    /// Address of a local interface
    Local,
    /// Statically configured
    Static,
    /// External BGP
    Ebgp,
    /// OSPF
    Ospf,
    /// IS-IS
    Isis,
    /// Internal BGP
    Ibgp,
    /// Locally generated aggregate
    Aggregate,
}

impl RoutingProtocol {
    /// Default administrative distance of the protocol.
    pub fn default_admin_distance(&self) -> u8 {
        match self {
            RoutingProtocol::Connected | RoutingProtocol::Local => 0,
            RoutingProtocol::Static => 1,
            RoutingProtocol::Ebgp => 20,
            RoutingProtocol::Ospf => 110,
            RoutingProtocol::Isis => 115,
            RoutingProtocol::Ibgp | RoutingProtocol::Aggregate => 200,
        }
    }

    /// Preference rank of the protocol (lower is preferred).
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// A route installed in the FIB. The next hop is shared through the global interner.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix
    pub prefix: Ipv4Prefix,
    /// Source protocol
    pub protocol: RoutingProtocol,
    /// Administrative distance
    pub admin_distance: u8,
    /// Protocol-specific metric
    #[serde(default)]
    pub metric: u32,
    /// Forwarding target
    #[serde(deserialize_with = "deserialize_interned")]
    pub next_hop: Arc<NextHop>,
}

fn deserialize_interned<'de, D>(deserializer: D) -> Result<Arc<NextHop>, D::Error>
where
    D: Deserializer<'de>,
{
    NextHop::deserialize(deserializer).map(NextHop::interned)
}

impl Route {
    /// Create a route with the default administrative distance of `protocol` and metric 0.
    pub fn new(prefix: Ipv4Prefix, protocol: RoutingProtocol, next_hop: NextHop) -> Self {
        Self {
            prefix,
            protocol,
            admin_distance: protocol.default_admin_distance(),
            metric: 0,
            next_hop: next_hop.interned(),
        }
    }

    /// Set the administrative distance.
    pub fn with_admin_distance(mut self, admin_distance: u8) -> Self {
        self.admin_distance = admin_distance;
        self
    }

    /// Set the metric.
    pub fn with_metric(mut self, metric: u32) -> Self {
        self.metric = metric;
        self
    }

    /// Key on which routes are compared during best-route selection. Smaller is better.
    pub fn preference(&self) -> (Reverse<u8>, u8, u8, u32) {
        (
            Reverse(self.prefix.length()),
            self.admin_distance,
            self.protocol.rank(),
            self.metric,
        )
    }

    fn candidate_key(&self) -> ((Reverse<u8>, u8, u8, u32), Ipv4Prefix, &NextHop) {
        (self.preference(), self.prefix, self.next_hop.as_ref())
    }
}

/// # Forwarding table of a single VRF
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<Route>", into = "Vec<Route>")]
pub struct Fib {
    table: PrefixMap<Ipv4Prefix, Vec<Route>>,
    num_routes: usize,
}

impl PartialEq for Fib {
    fn eq(&self, other: &Self) -> bool {
        self.routes().collect::<Vec<_>>() == other.routes().collect::<Vec<_>>()
    }
}

impl Default for Fib {
    fn default() -> Self {
        Self::new()
    }
}

impl Fib {
    /// Create an empty FIB.
    pub fn new() -> Self {
        Self {
            table: PrefixMap::new(),
            num_routes: 0,
        }
    }

    /// Install a route. Installing the same route twice has no effect.
    pub fn insert(&mut self, route: Route) {
        let routes = self.table.entry(route.prefix).or_default();
        if let Err(pos) = routes.binary_search(&route) {
            routes.insert(pos, route);
            self.num_routes += 1;
        }
    }

    /// All routes whose prefix contains `addr`, most preferred first.
    pub fn covering_routes(&self, addr: Ipv4Addr) -> Vec<&Route> {
        let mut routes: Vec<&Route> = (0..=32u8)
            .rev()
            .filter_map(|len| Ipv4Prefix::new(addr, len))
            .filter_map(|prefix| self.table.get(&prefix))
            .flatten()
            .collect();
        routes.sort_by(|a, b| a.candidate_key().cmp(&b.candidate_key()));
        routes
    }

    /// Iterate over all installed routes, ordered by prefix.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.table.iter().flat_map(|(_, routes)| routes.iter())
    }

    /// Number of installed routes.
    pub fn len(&self) -> usize {
        self.num_routes
    }

    /// Returns `true` if no route is installed.
    pub fn is_empty(&self) -> bool {
        self.num_routes == 0
    }
}

impl From<Vec<Route>> for Fib {
    fn from(routes: Vec<Route>) -> Self {
        let mut fib = Fib::new();
        routes.into_iter().for_each(|r| fib.insert(r));
        fib
    }
}

impl From<Fib> for Vec<Route> {
    fn from(fib: Fib) -> Self {
        fib.routes().cloned().collect()
    }
}

impl FromIterator<Route> for Fib {
    fn from_iter<T: IntoIterator<Item = Route>>(iter: T) -> Self {
        let mut fib = Fib::new();
        iter.into_iter().for_each(|r| fib.insert(r));
        fib
    }
}

/// Select the equal-cost best routes out of candidates sorted by [`Fib::covering_routes`].
pub fn best_routes<'a, 'r>(candidates: &'a [&'r Route]) -> &'a [&'r Route] {
    match candidates.first() {
        Some(best) => {
            let pref = best.preference();
            let n = candidates
                .iter()
                .take_while(|r| r.preference() == pref)
                .count();
            &candidates[..n]
        }
        None => &[],
    }
}
