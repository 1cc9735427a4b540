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

use std::{net::Ipv4Addr, sync::Arc};

use pretty_assertions::assert_eq;

use super::ip;
use crate::{
    next_hop::{NextHop, NextHopInterner},
    types::{NextHopError, NULL_INTERFACE_NAME, UNSET_NEXT_HOP_INTERFACE},
};

#[test]
fn reserved_ips_are_rejected() {
    for reserved in [Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST] {
        assert_eq!(NextHop::ip(reserved), Err(NextHopError::ReservedIp(reserved)));
        assert_eq!(
            NextHop::interface("eth0", Some(reserved)),
            Err(NextHopError::ReservedIp(reserved))
        );
        assert_eq!(
            NextHop::vrf("mgmt", Some(reserved)),
            Err(NextHopError::ReservedIp(reserved))
        );
        assert_eq!(
            NextHop::vtep(5000, reserved),
            Err(NextHopError::ReservedIp(reserved))
        );
    }
    assert!(NextHop::ip(ip("10.0.0.1")).is_ok());
    assert!(NextHop::vtep(5000, ip("10.0.0.1")).is_ok());
}

#[test]
fn reserved_interface_names_are_rejected() {
    for name in [NULL_INTERFACE_NAME, UNSET_NEXT_HOP_INTERFACE, ""] {
        assert_eq!(
            NextHop::interface(name, None),
            Err(NextHopError::ReservedInterfaceName(name.to_string()))
        );
    }
}

#[test]
fn deserialization_validates() {
    let good: NextHop = serde_json::from_str(r#"{"Ip":"10.0.0.1"}"#).unwrap();
    assert_eq!(good, NextHop::ip(ip("10.0.0.1")).unwrap());
    assert!(serde_json::from_str::<NextHop>(r#"{"Ip":"0.0.0.0"}"#).is_err());
    assert!(serde_json::from_str::<NextHop>(r#"{"Interface":["null_interface",null]}"#).is_err());
}

#[test]
fn legacy_precedence() {
    // interface wins over the ip
    assert_eq!(
        NextHop::from_legacy(Some("eth0"), Some(ip("10.0.0.1"))),
        NextHop::interface("eth0", Some(ip("10.0.0.1")))
    );
    assert_eq!(
        NextHop::from_legacy(Some("eth0"), None),
        NextHop::interface("eth0", None)
    );
    // the null interface is a discard route, no matter the ip
    assert_eq!(
        NextHop::from_legacy(Some(NULL_INTERFACE_NAME), Some(ip("10.0.0.1"))),
        Ok(NextHop::Discard)
    );
    assert_eq!(
        NextHop::from_legacy(Some(NULL_INTERFACE_NAME), None),
        Ok(NextHop::Discard)
    );
    // unset interface is ignored
    assert_eq!(
        NextHop::from_legacy(Some(UNSET_NEXT_HOP_INTERFACE), Some(ip("10.0.0.1"))),
        NextHop::ip(ip("10.0.0.1"))
    );
    assert_eq!(
        NextHop::from_legacy(None, Some(ip("10.0.0.1"))),
        NextHop::ip(ip("10.0.0.1"))
    );
}

#[test]
fn legacy_requires_interface_or_ip() {
    assert_eq!(
        NextHop::from_legacy(None, None),
        Err(NextHopError::MissingInterfaceAndIp)
    );
    assert_eq!(
        NextHop::from_legacy(Some(UNSET_NEXT_HOP_INTERFACE), None),
        Err(NextHopError::MissingInterfaceAndIp)
    );
    assert_eq!(
        NextHopError::MissingInterfaceAndIp.to_string(),
        "cannot construct a next hop without either an interface or an IP"
    );
}

#[test]
fn legacy_round_trip() {
    let interfaces = [None, Some("eth0"), Some("Ethernet1/1"), Some(NULL_INTERFACE_NAME)];
    let ips = [None, Some(ip("10.0.0.1")), Some(ip("192.168.1.254"))];
    for iface in interfaces {
        for addr in ips {
            let Ok(nh) = NextHop::from_legacy(iface, addr) else {
                assert_eq!((iface, addr), (None, None));
                continue;
            };
            assert_eq!(nh.next_vrf(), None);
            if iface == Some(NULL_INTERFACE_NAME) {
                assert_eq!(nh, NextHop::Discard);
                assert_eq!(nh.next_hop_interface(), Some(NULL_INTERFACE_NAME));
                assert_eq!(nh.next_hop_ip(), None);
            } else {
                assert_eq!((nh.next_hop_interface(), nh.next_hop_ip()), (iface, addr));
            }
        }
    }
}

#[test]
fn extractors() {
    let vrf = NextHop::vrf("mgmt", Some(ip("10.0.0.1"))).unwrap();
    assert_eq!(vrf.next_vrf(), Some("mgmt"));
    assert_eq!(vrf.next_hop_interface(), None);
    assert_eq!(vrf.next_hop_ip(), None);

    let vtep = NextHop::vtep(5000, ip("10.0.0.1")).unwrap();
    assert_eq!(vtep.next_vrf(), None);
    assert_eq!(vtep.next_hop_interface(), None);
    assert_eq!(vtep.next_hop_ip(), None);

    let iface = NextHop::interface("eth0", Some(ip("10.0.0.1"))).unwrap();
    assert_eq!(iface.next_hop_interface(), Some("eth0"));
    assert_eq!(iface.next_hop_ip(), Some(ip("10.0.0.1")));
    assert_eq!(iface.next_vrf(), None);
}

#[test]
fn interned_next_hops_are_shared() {
    let interner = NextHopInterner::with_capacity(16);
    let a = interner.intern(NextHop::ip(ip("10.0.0.1")).unwrap());
    let b = interner.intern(NextHop::ip(ip("10.0.0.1")).unwrap());
    let c = interner.intern(NextHop::ip(ip("10.0.0.2")).unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(interner.len(), 2);

    let x = NextHop::interface("eth0", None).unwrap().interned();
    let y = NextHop::interface("eth0", None).unwrap().interned();
    assert!(Arc::ptr_eq(&x, &y));
}

#[test]
fn interner_is_bounded() {
    let interner = NextHopInterner::with_capacity(4);
    let first = interner.intern(NextHop::ip(ip("10.0.0.1")).unwrap());
    for i in 2..=10u8 {
        interner.intern(NextHop::ip(Ipv4Addr::new(10, 0, 0, i)).unwrap());
    }
    assert_eq!(interner.len(), 4);
    // evicted entries stay valid, but are no longer shared
    assert_eq!(*first, NextHop::ip(ip("10.0.0.1")).unwrap());
    let again = interner.intern(NextHop::ip(ip("10.0.0.1")).unwrap());
    assert!(!Arc::ptr_eq(&first, &again));

    assert_eq!(NextHopInterner::with_capacity(0).len(), 0);
}
