use crate::error::Result;
use std::net::Ipv4Addr;

/// A local IPv4 interface that can carry multicast traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Lists the non-loopback IPv4 interfaces of this host.
pub fn ipv4_interfaces() -> Result<Vec<Interface>> {
    let mut out = vec![];
    for iface in if_addrs::get_if_addrs()? {
        if iface.is_loopback() {
            continue;
        }
        if let if_addrs::IfAddr::V4(v4) = &iface.addr {
            out.push(Interface {
                name: iface.name.clone(),
                addr: v4.ip,
            });
        }
    }
    Ok(out)
}

/// Returns the first non-loopback IPv4 address, if the host has one.
pub fn first_ipv4() -> Option<Ipv4Addr> {
    ipv4_interfaces()
        .ok()
        .and_then(|ifaces| ifaces.into_iter().next())
        .map(|iface| iface.addr)
}
