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

use pretty_assertions::assert_eq;

use super::{actions, ecmp_routers, iface, ip, static_route, two_routers};
use crate::{
    acl::{Acl, AclLine, HeaderSpace},
    dataplane::SimDataPlane,
    flow::Flow,
    next_hop::NextHop,
    step::{Step, StepAction},
    trace::{FlowDisposition, Trace, TraceHop},
    tracer::{TraceSettings, TracerouteEngine},
    types::DEFAULT_VRF_NAME,
};

fn step(action: StepAction) -> Step {
    Step::generic(DEFAULT_VRF_NAME, "test", action)
}

#[test]
fn ordering_compares_hops_first() {
    let a = Trace::new(
        vec![TraceHop::new("a", vec![step(StepAction::NoRoute)])],
        FlowDisposition::NoRoute,
    );
    let b = Trace::new(
        vec![TraceHop::new("b", vec![step(StepAction::Accepted)])],
        FlowDisposition::Accepted,
    );
    // hops decide, even though the disposition of `b` is smaller
    assert!(FlowDisposition::Accepted < FlowDisposition::NoRoute);
    assert!(a < b);

    // equal hops are ordered by disposition
    let hops = vec![TraceHop::new("a", vec![step(StepAction::SentOut)])];
    let c = Trace::new(hops.clone(), FlowDisposition::Accepted);
    let d = Trace::new(hops, FlowDisposition::Loop);
    assert!(c < d);

    // a trace that is a prefix of another one is smaller
    let e = Trace::new(
        vec![
            TraceHop::new("a", vec![step(StepAction::NoRoute)]),
            TraceHop::new("b", vec![step(StepAction::NoRoute)]),
        ],
        FlowDisposition::NoRoute,
    );
    assert!(a < e);
}

#[test]
fn disposition_from_last_step() {
    for (action, disposition) in [
        (StepAction::Accepted, Some(FlowDisposition::Accepted)),
        (StepAction::DeniedIn, Some(FlowDisposition::DeniedIn)),
        (StepAction::DeniedOut, Some(FlowDisposition::DeniedOut)),
        (StepAction::Loop, Some(FlowDisposition::Loop)),
        (
            StepAction::NeighborUnreachableOrExitsNetwork,
            Some(FlowDisposition::NeighborUnreachableOrExitsNetwork),
        ),
        (StepAction::NoRoute, Some(FlowDisposition::NoRoute)),
        (StepAction::NullRouted, Some(FlowDisposition::NullRouted)),
        (StepAction::SentIn, None),
        (StepAction::SentOut, None),
    ] {
        assert_eq!(FlowDisposition::from_action(action), disposition);
        assert_eq!(action.is_terminal(), disposition.is_some());
        if let Some(d) = disposition {
            assert_eq!(StepAction::from(d), action);
        }
        let trace = Trace::from_hops(vec![TraceHop::new("r1", vec![step(action)])]);
        assert_eq!(trace.map(|t| t.disposition), disposition);
    }
    assert_eq!(Trace::from_hops(vec![]), None);
    assert_eq!(Trace::from_hops(vec![TraceHop::new("r1", vec![])]), None);
}

#[test]
fn consistency_check() {
    let good = Trace::from_hops(vec![
        TraceHop::new("r1", vec![step(StepAction::SentOut)]),
        TraceHop::new("r2", vec![step(StepAction::SentIn), step(StepAction::Accepted)]),
    ])
    .unwrap();
    assert!(good.is_consistent());

    let wrong_disposition = Trace::new(good.hops.clone(), FlowDisposition::Loop);
    assert!(!wrong_disposition.is_consistent());

    let early_terminal = Trace::new(
        vec![
            TraceHop::new("r1", vec![step(StepAction::NoRoute)]),
            TraceHop::new("r2", vec![step(StepAction::Accepted)]),
        ],
        FlowDisposition::Accepted,
    );
    assert!(!early_terminal.is_consistent());

    let empty_hop = Trace::new(
        vec![
            TraceHop::new("r1", vec![]),
            TraceHop::new("r2", vec![step(StepAction::Accepted)]),
        ],
        FlowDisposition::Accepted,
    );
    assert!(!empty_hop.is_consistent());
}

/// Every trace the engine produces in a variety of networks is consistent.
#[test]
fn engine_produces_consistent_traces() {
    let mut looping = two_routers();
    looping
        .add_route(
            "r1",
            DEFAULT_VRF_NAME,
            static_route("0.0.0.0/0", NextHop::interface("eth0", None).unwrap()),
        )
        .unwrap();
    looping
        .add_route(
            "r2",
            DEFAULT_VRF_NAME,
            static_route("0.0.0.0/0", NextHop::interface("eth1", None).unwrap()),
        )
        .unwrap();

    let mut filtered = two_routers();
    filtered
        .add_acl("r2", Acl::new("deny", vec![AclLine::deny("all", HeaderSpace::any())]))
        .unwrap();
    filtered
        .set_ingress_filter(&iface("r2", "eth1"), "deny")
        .unwrap();

    let networks: Vec<(SimDataPlane, Vec<Flow>)> = vec![
        (
            two_routers(),
            vec![
                Flow::new("r1", ip("10.0.12.1"), ip("10.0.0.2")),
                Flow::new("r1", ip("10.0.12.1"), ip("10.0.0.3")),
                Flow::new("r1", ip("10.9.0.10"), ip("10.0.12.2")).entering("eth9"),
                Flow::new("r2", ip("10.0.0.2"), ip("10.9.0.10")),
            ],
        ),
        (
            looping,
            vec![
                Flow::new("r1", ip("10.0.12.1"), ip("8.8.8.8")),
                Flow::new("r2", ip("10.0.12.2"), ip("8.8.8.8")),
            ],
        ),
        (
            filtered,
            vec![Flow::new("r1", ip("10.0.12.1"), ip("10.0.0.2"))],
        ),
        (
            ecmp_routers(),
            vec![Flow::new("r1", ip("10.0.12.1"), ip("10.0.0.100"))],
        ),
    ];

    for compact_steps in [false, true] {
        let settings = TraceSettings {
            compact_steps,
            ..Default::default()
        };
        for (dp, flows) in &networks {
            let engine = TracerouteEngine::with_settings(dp, settings.clone());
            for traces in engine.trace_all(flows).unwrap().values() {
                assert!(!traces.is_empty());
                for t in traces {
                    assert!(t.is_consistent(), "inconsistent trace: {t}");
                    assert_eq!(
                        Some(t.disposition),
                        t.last_action().and_then(FlowDisposition::from_action)
                    );
                }
            }
        }
    }
}

#[test]
fn denied_by_peer() {
    let mut dp = two_routers();
    dp.add_acl("r2", Acl::new("deny", vec![AclLine::deny("all", HeaderSpace::any())]))
        .unwrap();
    dp.set_ingress_filter(&iface("r2", "eth1"), "deny").unwrap();
    let flow = Flow::new("r1", ip("10.0.12.1"), ip("10.0.0.2"));
    let traces = TracerouteEngine::new(&dp).trace(&flow).unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].disposition, FlowDisposition::DeniedIn);
    assert_eq!(
        actions(&traces[0]),
        vec![
            ("r1", vec![StepAction::SentOut, StepAction::SentOut]),
            ("r2", vec![StepAction::DeniedIn]),
        ]
    );
}

#[test]
fn serialized_names() {
    assert_eq!(
        serde_json::to_string(&StepAction::NeighborUnreachableOrExitsNetwork).unwrap(),
        "\"NEIGHBOR_UNREACHABLE_OR_EXITS_NETWORK\""
    );
    assert_eq!(
        serde_json::to_string(&FlowDisposition::DeniedIn).unwrap(),
        "\"DENIED_IN\""
    );
    assert_eq!(StepAction::NullRouted.to_string(), "NULL_ROUTED");
    assert_eq!(FlowDisposition::Loop.to_string(), "LOOP");
}
