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

use super::{ip, pfx};
use crate::{
    acl::{Acl, AclLine, FilterResult, HeaderSpace, LineAction, PortRange, IMPLICIT_DENY_LINE},
    flow::{Flow, IpProtocol},
};

fn acl() -> Acl {
    Acl::new(
        "edge-in",
        vec![
            AclLine::deny(
                "deny-telnet",
                HeaderSpace::any()
                    .protocol(IpProtocol::Tcp)
                    .dst_port(PortRange::single(23)),
            ),
            AclLine::permit(
                "permit-web",
                HeaderSpace::any()
                    .dst(pfx("10.0.0.0/24"))
                    .protocol(IpProtocol::Tcp)
                    .dst_port(PortRange::new(80, 443)),
            ),
            AclLine::permit(
                "permit-icmp",
                HeaderSpace::any()
                    .src(pfx("192.168.0.0/16"))
                    .protocol(IpProtocol::Icmp),
            ),
        ],
    )
}

fn flow(src: &str, dst: &str) -> Flow {
    Flow::new("r1", ip(src), ip(dst))
}

#[test]
fn first_match_wins() {
    let acl = acl();
    let web = flow("1.1.1.1", "10.0.0.5");
    assert_eq!(
        acl.evaluate(&web),
        FilterResult {
            filter: "edge-in".to_string(),
            action: LineAction::Permit,
            matched_line: "permit-web".to_string(),
        }
    );

    let telnet = web.with_protocol(IpProtocol::Tcp, 40000, 23);
    let result = acl.evaluate(&telnet);
    assert_eq!(result.action, LineAction::Deny);
    assert_eq!(result.matched_line, "deny-telnet");
    assert!(!result.is_permit());
}

#[test]
fn implicit_deny() {
    let acl = acl();
    let result = acl.evaluate(&flow("1.1.1.1", "10.0.1.5"));
    assert_eq!(result.action, LineAction::Deny);
    assert_eq!(result.matched_line, IMPLICIT_DENY_LINE);

    let empty = Acl::new("empty", vec![]);
    assert!(!empty.evaluate(&flow("1.1.1.1", "10.0.0.5")).is_permit());
}

#[test]
fn protocol_and_ports() {
    let acl = acl();
    let ping = flow("192.168.1.1", "10.0.0.5").with_protocol(IpProtocol::Icmp, 1, 80);
    assert_eq!((ping.src_port, ping.dst_port), (0, 0));
    assert_eq!(acl.evaluate(&ping).matched_line, "permit-icmp");

    let foreign_ping = flow("172.16.0.1", "10.0.0.5").with_protocol(IpProtocol::Icmp, 0, 0);
    assert_eq!(acl.evaluate(&foreign_ping).matched_line, IMPLICIT_DENY_LINE);

    let udp = flow("1.1.1.1", "10.0.0.5").with_protocol(IpProtocol::Udp, 1000, 443);
    assert_eq!(acl.evaluate(&udp).matched_line, IMPLICIT_DENY_LINE);
    // a flow without ports never matches a port constraint
    let gre = flow("1.1.1.1", "10.0.0.5").with_protocol(IpProtocol::from(47), 0, 0);
    assert!(!HeaderSpace::any().dst_port(PortRange::new(0, 65535)).matches(&gre));
    assert!(HeaderSpace::any().matches(&gre));
}

#[test]
fn protocol_numbers_are_normalized() {
    assert_eq!(serde_json::from_str::<IpProtocol>("6").unwrap(), IpProtocol::Tcp);
    assert_eq!(serde_json::from_str::<IpProtocol>("17").unwrap(), IpProtocol::Udp);
    assert_eq!(serde_json::from_str::<IpProtocol>("47").unwrap(), IpProtocol::Other(47));
    assert_eq!(serde_json::to_string(&IpProtocol::Udp).unwrap(), "17");
    assert_eq!(IpProtocol::Other(6).normalized(), IpProtocol::Tcp);

    let json = r#"{
        "ingress_node": "r1",
        "src_ip": "1.1.1.1",
        "dst_ip": "10.0.0.5",
        "ip_protocol": 6,
        "src_port": 40000,
        "dst_port": 23
    }"#;
    let telnet: Flow = serde_json::from_str(json).unwrap();
    assert_eq!(telnet.ip_protocol, IpProtocol::Tcp);
    assert_eq!(acl().evaluate(&telnet).matched_line, "deny-telnet");

    // a hand-built `Other(6)` still carries ports and matches TCP lines
    let mut raw = flow("1.1.1.1", "10.0.0.5");
    raw.ip_protocol = IpProtocol::Other(6);
    raw.dst_port = 23;
    assert!(raw.ip_protocol.has_ports());
    assert_eq!(acl().evaluate(&raw).matched_line, "deny-telnet");

    let udp = flow("1.1.1.1", "10.0.0.5").with_protocol(IpProtocol::Other(17), 1000, 53);
    assert_eq!(udp.ip_protocol, IpProtocol::Udp);
    assert_eq!((udp.src_port, udp.dst_port), (1000, 53));
}
