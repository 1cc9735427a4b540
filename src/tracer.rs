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

//! # Hop-simulation engine
//!
//! [`TracerouteEngine`] traces flows through a [`DataPlane`]. Each hop runs the following
//! phases:
//!
//! 1. Receive the flow on the ingress interface: evaluate the ingress filter, then apply the
//!    incoming transformation. If the interface has a packet policy, the policy either drops
//!    the flow or decides in which VRF (and for which address) phase 4 looks up the flow.
//!    Flows that originate at the node skip this phase.
//! 2. Accept the flow if its destination is owned by the VRF.
//! 3. Stop with [`FlowDisposition::Loop`] if the same (node, VRF, flow) was visited before
//!    in this branch, or if the branch has too many hops.
//! 4. Look up the destination in the FIB. Every distinct forwarding decision of the best
//!    routes starts its own branch. Lookups in another VRF continue at phase 4 in that VRF.
//! 5. Apply the outgoing transformation, evaluate the egress filter on the transformed flow,
//!    and follow the link to the neighbor, which starts the next hop at phase 1.
//!
//! Every branch is a tracer state paired with its next phase on a worklist. Forks push one
//! entry per forwarding decision, and moving to the neighbor pushes the next hop, so long
//! paths and large forwarding loops never grow the call stack.
//!
//! The traces of a flow are returned sorted and without duplicates.

use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    net::Ipv4Addr,
};

use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    acl::FilterResult,
    dataplane::DataPlane,
    fib::{best_routes, Route, RoutingProtocol},
    flow::Flow,
    next_hop::NextHop,
    policy::{PacketPolicy, PolicyAction},
    step::{
        EnterInputIfaceDetail, ExitOutputIfaceDetail, ForwardingDecision,
        ForwardingDetailBuilder, GenericDetail, PolicyDetail, RoutingDetail, Step, StepAction,
        StepDetail,
    },
    trace::{FlowDisposition, Trace, TraceHop},
    transformation::TransformationDirection,
    types::{NodeInterfacePair, TraceError},
};

/// Options of the trace engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Do not evaluate any ingress or egress filter.
    pub ignore_filters: bool,
    /// Record the routing step and the exit step of a hop as one [`StepDetail::Forwarding`].
    pub compact_steps: bool,
    /// Maximum number of hops per trace. Defaults to twice the number of (node, VRF) pairs.
    pub max_hops: Option<usize>,
    /// Stop exploring branches of a flow once this many traces are recorded.
    pub max_traces: Option<usize>,
}

/// # Traceroute engine
///
/// Traces flows through a read-only data plane snapshot.
///
/// ```
/// use flowsim::prelude::*;
/// # use std::net::Ipv4Addr;
///
/// let mut dp = SimDataPlane::new();
/// dp.add_node("r1");
/// let engine = TracerouteEngine::new(&dp);
/// let flow = Flow::new("r1", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 5));
/// let traces = engine.trace(&flow)?;
/// assert_eq!(traces.len(), 1);
/// assert_eq!(traces[0].disposition, FlowDisposition::NoRoute);
/// # Ok::<(), TraceError>(())
/// ```
#[derive(Debug)]
pub struct TracerouteEngine<'a, D> {
    dp: &'a D,
    settings: TraceSettings,
}

impl<'a, D: DataPlane> TracerouteEngine<'a, D> {
    /// Create an engine with the default settings.
    pub fn new(dp: &'a D) -> Self {
        Self::with_settings(dp, TraceSettings::default())
    }

    /// Create an engine with custom settings.
    pub fn with_settings(dp: &'a D, settings: TraceSettings) -> Self {
        Self { dp, settings }
    }

    /// Get the settings.
    pub fn settings(&self) -> &TraceSettings {
        &self.settings
    }

    fn max_hops(&self) -> usize {
        self.settings
            .max_hops
            .unwrap_or_else(|| 2 * self.dp.num_node_vrfs())
            .max(1)
    }

    /// Trace a single flow. Returns all traces, sorted.
    ///
    /// Branches are kept on an explicit worklist, so the depth of the call stack does not
    /// depend on the length of a path.
    ///
    /// Fails if the ingress node, the ingress interface, or the ingress VRF does not exist,
    /// or if the snapshot references an undefined interface, VRF, ACL, or packet policy along
    /// the way.
    pub fn trace(&self, flow: &Flow) -> Result<Vec<Trace>, TraceError> {
        debug!("trace {flow}");
        let node = &flow.ingress_node;
        if !self.dp.has_node(node) {
            return Err(TraceError::NodeNotFound(node.clone()));
        }
        let ingress = match &flow.ingress_interface {
            Some(iface) => {
                let iface = NodeInterfacePair::new(node.clone(), iface.clone());
                self.dp.interface_vrf(&iface)?;
                Some(iface)
            }
            None if self.dp.has_vrf(node, &flow.ingress_vrf) => None,
            None => {
                return Err(TraceError::VrfNotFound(
                    node.clone(),
                    flow.ingress_vrf.clone(),
                ))
            }
        };

        let mut recorder = TraceRecorder::new(self.settings.max_traces);
        let mut work = vec![(
            FlowTracer::new(self, node.clone()),
            Phase::Receive {
                ingress,
                flow: flow.clone(),
            },
        )];
        while let Some((tracer, phase)) = work.pop() {
            if recorder.is_full() {
                recorder.skip();
                break;
            }
            tracer.run(phase, &mut work, &mut recorder)?;
        }
        Ok(recorder.into_traces(flow))
    }

    /// Trace many flows in parallel. Fails if any flow fails.
    pub fn trace_all(&self, flows: &[Flow]) -> Result<BTreeMap<Flow, Vec<Trace>>, TraceError> {
        flows
            .par_iter()
            .map(|flow| self.trace(flow).map(|traces| (flow.clone(), traces)))
            .collect()
    }
}

/// Collects the traces of one flow.
#[derive(Debug)]
struct TraceRecorder {
    traces: BTreeSet<Trace>,
    max_traces: Option<usize>,
    truncated: bool,
}

impl TraceRecorder {
    fn new(max_traces: Option<usize>) -> Self {
        Self {
            traces: BTreeSet::new(),
            max_traces,
            truncated: false,
        }
    }

    fn is_full(&self) -> bool {
        self.max_traces.is_some_and(|max| self.traces.len() >= max)
    }

    fn record(&mut self, trace: Trace) {
        if self.is_full() {
            self.truncated = true;
        } else {
            self.traces.insert(trace);
        }
    }

    fn skip(&mut self) {
        self.truncated = true;
    }

    fn into_traces(self, flow: &Flow) -> Vec<Trace> {
        if self.truncated {
            warn!(
                "Stopped tracing {flow} after {} traces; more branches exist.",
                self.traces.len()
            );
        }
        self.traces.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Breadcrumb {
    node: String,
    vrf: String,
    flow: Flow,
}

/// Forwarding target after resolving a next hop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Resolved {
    Interface {
        interface: String,
        arp_ip: Option<Ipv4Addr>,
    },
    Vxlan {
        vni: u32,
        vtep_ip: Ipv4Addr,
        interface: String,
        arp_ip: Option<Ipv4Addr>,
    },
    Vrf {
        vrf: String,
        ip: Option<Ipv4Addr>,
    },
    Discard,
    Unresolved,
}

/// A FIB lookup that is about to happen.
#[derive(Debug)]
struct Lookup {
    vrf: String,
    dst: Ipv4Addr,
    /// Address to send to if the lookup ends at an interface without an ARP IP.
    via: Option<Ipv4Addr>,
    /// VRFs already visited during this hop
    vrf_chain: Vec<String>,
}

/// One forwarding decision of a FIB lookup.
#[derive(Debug)]
struct Branch {
    vrf: String,
    routes: Vec<Route>,
    resolved: Resolved,
    vrf_chain: Vec<String>,
}

/// Pending work of a branch.
#[derive(Debug)]
enum Phase {
    /// Receive the flow at the current node, on an interface or as originating flow.
    Receive {
        ingress: Option<NodeInterfacePair>,
        flow: Flow,
    },
    Route {
        lookup: Lookup,
        flow: Flow,
    },
    Forward {
        branch: Branch,
        flow: Flow,
    },
}

/// State of a single branch. Forking clones the tracer.
struct FlowTracer<'e, 'a, D> {
    engine: &'e TracerouteEngine<'a, D>,
    node: String,
    steps: Vec<Step>,
    hops: Vec<TraceHop>,
    breadcrumbs: Vec<Breadcrumb>,
}

impl<'e, 'a, D> Clone for FlowTracer<'e, 'a, D> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            node: self.node.clone(),
            steps: self.steps.clone(),
            hops: self.hops.clone(),
            breadcrumbs: self.breadcrumbs.clone(),
        }
    }
}

type Worklist<'e, 'a, D> = Vec<(FlowTracer<'e, 'a, D>, Phase)>;

impl<'e, 'a, D: DataPlane> FlowTracer<'e, 'a, D> {
    fn new(engine: &'e TracerouteEngine<'a, D>, node: String) -> Self {
        Self {
            engine,
            node,
            steps: Vec::new(),
            hops: Vec::new(),
            breadcrumbs: Vec::new(),
        }
    }

    fn run(
        self,
        phase: Phase,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        match phase {
            Phase::Receive { ingress, flow } => self.receive(ingress, flow, work, rec),
            Phase::Route { lookup, flow } => self.route(lookup, flow, work, rec),
            Phase::Forward { branch, flow } => self.forward(branch, flow, work, rec),
        }
    }

    fn push(&mut self, step: Step) {
        trace!("{}: {}", self.node, step);
        self.steps.push(step);
    }

    /// Close the current hop and continue at `node`.
    fn next_hop(&mut self, node: String) {
        let steps = mem::take(&mut self.steps);
        let prev = mem::replace(&mut self.node, node);
        self.hops.push(TraceHop::new(prev, steps));
    }

    /// Append the final step and record the trace.
    fn terminate(
        mut self,
        detail: StepDetail,
        disposition: FlowDisposition,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        self.push(Step::new(detail, disposition.into()));
        self.hops.push(TraceHop::new(self.node, self.steps));
        rec.record(Trace::new(self.hops, disposition));
        Ok(())
    }

    fn evaluate_filter(
        &self,
        acl: Option<&str>,
        flow: &Flow,
    ) -> Result<Option<FilterResult>, TraceError> {
        if self.engine.settings.ignore_filters {
            return Ok(None);
        }
        acl.map(|acl| self.engine.dp.evaluate_acl(&self.node, acl, flow))
            .transpose()
    }

    /// Resolve the action of a packet policy into the VRF and the address to look up.
    /// Returns `None` if the policy drops the flow.
    fn evaluate_policy(
        &self,
        policy: &PacketPolicy,
        iface_vrf: &str,
        flow: &Flow,
    ) -> Result<Option<(String, Option<Ipv4Addr>)>, TraceError> {
        let dp = self.engine.dp;
        let mut action = policy.evaluate(flow);
        loop {
            match action {
                PolicyAction::Drop => return Ok(None),
                PolicyAction::FibLookup { vrf } => {
                    let vrf = vrf.as_deref().unwrap_or(iface_vrf);
                    if !dp.has_vrf(&self.node, vrf) {
                        return Err(TraceError::VrfNotFound(self.node.clone(), vrf.to_string()));
                    }
                    return Ok(Some((vrf.to_string(), None)));
                }
                PolicyAction::FibLookupOverrideIp {
                    vrf,
                    ips,
                    require_connected,
                    default_action,
                } => {
                    let vrf = vrf.as_deref().unwrap_or(iface_vrf);
                    for ip in ips {
                        let routes = dp.covering_routes(&self.node, vrf, *ip)?;
                        if routes
                            .iter()
                            .any(|r| !*require_connected || r.protocol == RoutingProtocol::Connected)
                        {
                            // the override address is resolved in the VRF of the interface
                            return Ok(Some((iface_vrf.to_string(), Some(*ip))));
                        }
                    }
                    action = &**default_action;
                }
            }
        }
    }

    fn routing_detail(
        &self,
        vrf: String,
        routes: Vec<Route>,
        decision: ForwardingDecision,
    ) -> StepDetail {
        if self.engine.settings.compact_steps {
            StepDetail::Forwarding(ForwardingDetailBuilder::new(vrf, routes, decision).build())
        } else {
            StepDetail::Routing(RoutingDetail {
                vrf,
                routes,
                decision,
            })
        }
    }

    /// Start processing a hop, either on the ingress interface, or at the routing step if the
    /// flow originates at this node.
    fn receive(
        mut self,
        ingress: Option<NodeInterfacePair>,
        flow: Flow,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        let dp = self.engine.dp;
        let mut policy_lookup = None;
        let (vrf, flow) = match ingress {
            Some(iface) => {
                let vrf = dp.interface_vrf(&iface)?.to_string();
                let filter = self.evaluate_filter(dp.ingress_filter(&iface)?, &flow)?;
                if filter.as_ref().is_some_and(|f| !f.is_permit()) {
                    let detail = StepDetail::EnterInputInterface(EnterInputIfaceDetail {
                        input_interface: iface,
                        input_vrf: vrf,
                        filter,
                        transformed_flow: None,
                    });
                    return self.terminate(detail, FlowDisposition::DeniedIn, rec);
                }
                let transformed =
                    dp.apply_transformation(&iface, TransformationDirection::Incoming, &flow)?;
                let changed = (transformed != flow).then(|| transformed.clone());
                let policy = dp.packet_policy(&iface)?;
                self.push(Step::new(
                    StepDetail::EnterInputInterface(EnterInputIfaceDetail {
                        input_interface: iface,
                        input_vrf: vrf.clone(),
                        filter,
                        transformed_flow: changed,
                    }),
                    StepAction::SentIn,
                ));

                if let Some(policy) = policy {
                    let lookup = self.evaluate_policy(policy, &vrf, &transformed)?;
                    let (lookup_vrf, lookup_ip) = match &lookup {
                        Some((v, ip)) => (Some(v.clone()), *ip),
                        None => (None, None),
                    };
                    let detail = StepDetail::Policy(PolicyDetail {
                        policy: policy.name.clone(),
                        lookup_vrf,
                        lookup_ip,
                    });
                    if lookup.is_none() {
                        return self.terminate(detail, FlowDisposition::DeniedIn, rec);
                    }
                    self.push(Step::new(detail, StepAction::SentIn));
                    policy_lookup = lookup;
                }
                (vrf, transformed)
            }
            None => (flow.ingress_vrf.clone(), flow),
        };

        if dp.is_locally_owned(&self.node, &vrf, &flow) {
            let msg = format!("{} is owned by {}", flow.dst_ip, self.node);
            return self.terminate(generic(vrf, msg), FlowDisposition::Accepted, rec);
        }

        let crumb = Breadcrumb {
            node: self.node.clone(),
            vrf: vrf.clone(),
            flow: flow.clone(),
        };
        if self.breadcrumbs.contains(&crumb) {
            let msg = format!("{} already visited {} in VRF {vrf}", flow, self.node);
            return self.terminate(generic(vrf, msg), FlowDisposition::Loop, rec);
        }
        let max_hops = self.engine.max_hops();
        if self.hops.len() >= max_hops {
            let msg = format!("exceeded the maximum of {max_hops} hops");
            return self.terminate(generic(vrf, msg), FlowDisposition::Loop, rec);
        }
        self.breadcrumbs.push(crumb);

        let lookup = match policy_lookup {
            Some((vrf, ip)) => Lookup {
                vrf,
                dst: ip.unwrap_or(flow.dst_ip),
                via: ip,
                vrf_chain: Vec::new(),
            },
            None => Lookup {
                vrf,
                dst: flow.dst_ip,
                via: None,
                vrf_chain: Vec::new(),
            },
        };
        work.push((self, Phase::Route { lookup, flow }));
        Ok(())
    }

    /// Look up the destination in the FIB and fork one branch per forwarding decision.
    fn route(
        self,
        lookup: Lookup,
        flow: Flow,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        let Lookup {
            vrf,
            dst,
            via,
            vrf_chain,
        } = lookup;
        let dp = self.engine.dp;
        let candidates = dp.covering_routes(&self.node, &vrf, dst)?;
        let routes: Vec<Route> = candidates.iter().map(|r| (*r).clone()).collect();
        let best = best_routes(&candidates);
        if best.is_empty() {
            let detail = self.routing_detail(vrf, routes, ForwardingDecision::NoRoute);
            return self.terminate(detail, FlowDisposition::NoRoute, rec);
        }

        let mut decisions = BTreeSet::new();
        for route in best {
            decisions.extend(self.resolve(&vrf, &route.next_hop, via, &mut Vec::new())?);
        }
        if decisions.len() > 1 {
            debug!(
                "{}: {} equal-cost branches for {dst} in VRF {vrf}",
                self.node,
                decisions.len()
            );
        }

        // reversed, such that the first decision is explored first
        for resolved in decisions.into_iter().rev() {
            let branch = Branch {
                vrf: vrf.clone(),
                routes: routes.clone(),
                resolved,
                vrf_chain: vrf_chain.clone(),
            };
            let flow = flow.clone();
            work.push((self.clone(), Phase::Forward { branch, flow }));
        }
        Ok(())
    }

    /// Resolve a next hop into forwarding targets. `via` is the address whose resolution
    /// led to this next hop, and `visited` holds all addresses currently being resolved.
    fn resolve(
        &self,
        vrf: &str,
        next_hop: &NextHop,
        via: Option<Ipv4Addr>,
        visited: &mut Vec<Ipv4Addr>,
    ) -> Result<Vec<Resolved>, TraceError> {
        Ok(match next_hop {
            NextHop::Interface(name, arp_ip) => vec![Resolved::Interface {
                interface: name.to_string(),
                arp_ip: arp_ip.map(|ip| ip.addr()).or(via),
            }],
            NextHop::Discard => vec![Resolved::Discard],
            NextHop::Vrf(name, ip) => vec![Resolved::Vrf {
                vrf: name.clone(),
                ip: ip.map(|ip| ip.addr()).or(via),
            }],
            NextHop::Ip(ip) => self.resolve_ip(vrf, ip.addr(), visited)?,
            NextHop::Vtep(vni, vtep_ip) => self
                .resolve_ip(vrf, vtep_ip.addr(), visited)?
                .into_iter()
                .map(|r| match r {
                    Resolved::Interface { interface, arp_ip } => Resolved::Vxlan {
                        vni: *vni,
                        vtep_ip: vtep_ip.addr(),
                        interface,
                        arp_ip,
                    },
                    // the underlay must be reachable directly, without another tunnel or VRF
                    Resolved::Vxlan { .. } | Resolved::Vrf { .. } => Resolved::Unresolved,
                    Resolved::Discard => Resolved::Discard,
                    Resolved::Unresolved => Resolved::Unresolved,
                })
                .collect(),
        })
    }

    fn resolve_ip(
        &self,
        vrf: &str,
        ip: Ipv4Addr,
        visited: &mut Vec<Ipv4Addr>,
    ) -> Result<Vec<Resolved>, TraceError> {
        if visited.contains(&ip) {
            debug!("{}: recursive resolution of {ip} in VRF {vrf} is cyclic", self.node);
            return Ok(vec![Resolved::Unresolved]);
        }
        let candidates = self.engine.dp.covering_routes(&self.node, vrf, ip)?;
        let best = best_routes(&candidates);
        if best.is_empty() {
            return Ok(vec![Resolved::Unresolved]);
        }
        visited.push(ip);
        let mut result = Vec::new();
        for route in best {
            result.extend(self.resolve(vrf, &route.next_hop, Some(ip), visited)?);
        }
        visited.pop();
        Ok(result)
    }

    fn forward(
        self,
        branch: Branch,
        flow: Flow,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        let Branch {
            vrf,
            routes,
            resolved,
            vrf_chain,
        } = branch;
        match resolved {
            Resolved::Unresolved => {
                let detail = self.routing_detail(vrf, routes, ForwardingDecision::NoRoute);
                self.terminate(detail, FlowDisposition::NoRoute, rec)
            }
            Resolved::Discard => {
                let detail = self.routing_detail(vrf, routes, ForwardingDecision::Discarded);
                self.terminate(detail, FlowDisposition::NullRouted, rec)
            }
            Resolved::Vrf { vrf: next, ip } => {
                let lookup = Lookup {
                    vrf: next,
                    dst: ip.unwrap_or(flow.dst_ip),
                    via: None,
                    vrf_chain,
                };
                self.next_vrf(vrf, routes, lookup, flow, work, rec)
            }
            Resolved::Interface { interface, arp_ip } => {
                let decision = ForwardingDecision::OutInterface {
                    interface: interface.clone(),
                    arp_ip,
                };
                self.exit(vrf, routes, decision, interface, flow, work, rec)
            }
            Resolved::Vxlan {
                vni,
                vtep_ip,
                interface,
                arp_ip,
            } => {
                let decision = ForwardingDecision::VxlanTunnel {
                    vni,
                    vtep_ip,
                    interface: interface.clone(),
                    arp_ip,
                };
                self.exit(vrf, routes, decision, interface, flow, work, rec)
            }
        }
    }

    /// Delegate the lookup from `vrf` to the VRF of `lookup`.
    fn next_vrf(
        mut self,
        vrf: String,
        routes: Vec<Route>,
        mut lookup: Lookup,
        flow: Flow,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        let dp = self.engine.dp;
        let next = lookup.vrf.clone();
        if !dp.has_vrf(&self.node, &next) {
            return Err(TraceError::VrfNotFound(self.node.clone(), next));
        }
        let detail = self.routing_detail(
            vrf.clone(),
            routes,
            ForwardingDecision::NextVrf(next.clone()),
        );
        self.push(Step::new(detail, StepAction::SentOut));
        lookup.vrf_chain.push(vrf);

        if lookup.vrf_chain.contains(&next) || lookup.vrf_chain.len() > dp.num_vrfs(&self.node) {
            let msg = format!("VRF loop: {} -> {next}", lookup.vrf_chain.join(" -> "));
            return self.terminate(generic(next, msg), FlowDisposition::Loop, rec);
        }
        if dp.is_locally_owned(&self.node, &next, &flow) {
            let msg = format!("{} is owned by {}", flow.dst_ip, self.node);
            return self.terminate(generic(next, msg), FlowDisposition::Accepted, rec);
        }

        work.push((self, Phase::Route { lookup, flow }));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn exit(
        mut self,
        vrf: String,
        routes: Vec<Route>,
        decision: ForwardingDecision,
        interface: String,
        flow: Flow,
        work: &mut Worklist<'e, 'a, D>,
        rec: &mut TraceRecorder,
    ) -> Result<(), TraceError> {
        let dp = self.engine.dp;
        let out = NodeInterfacePair::new(self.node.clone(), interface);
        dp.interface_vrf(&out)?;

        let builder = if self.engine.settings.compact_steps {
            Some(ForwardingDetailBuilder::new(vrf, routes, decision))
        } else {
            let detail = StepDetail::Routing(RoutingDetail {
                vrf,
                routes,
                decision,
            });
            self.push(Step::new(detail, StepAction::SentOut));
            None
        };

        let transformed = dp.apply_transformation(&out, TransformationDirection::Outgoing, &flow)?;
        let filter = self.evaluate_filter(dp.egress_filter(&out)?, &transformed)?;
        let denied = filter.as_ref().is_some_and(|f| !f.is_permit());

        let detail = match builder {
            Some(mut builder) => {
                builder
                    .output_interface(out.clone())
                    .filter(filter)
                    .flows(flow, transformed.clone());
                StepDetail::Forwarding(builder.build())
            }
            None => StepDetail::ExitOutputInterface(ExitOutputIfaceDetail {
                output_interface: out.clone(),
                filter,
                original_flow: flow,
                transformed_flow: transformed.clone(),
            }),
        };
        if denied {
            return self.terminate(detail, FlowDisposition::DeniedOut, rec);
        }

        let peer = dp
            .lookup_edge(&out)
            .filter(|peer| dp.is_interface_active(&out) && dp.is_interface_active(peer))
            .cloned();
        let Some(peer) = peer else {
            return self.terminate(
                detail,
                FlowDisposition::NeighborUnreachableOrExitsNetwork,
                rec,
            );
        };

        self.push(Step::new(detail, StepAction::SentOut));
        self.next_hop(peer.node.clone());
        let phase = Phase::Receive {
            ingress: Some(peer),
            flow: transformed,
        };
        work.push((self, phase));
        Ok(())
    }
}

fn generic(vrf: String, message: String) -> StepDetail {
    StepDetail::Generic(GenericDetail { vrf, message })
}
