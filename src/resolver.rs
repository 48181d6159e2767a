//! One-shot ARP resolution of the default gateway's MAC address.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info};

use crate::arp::ArpPacket;
use crate::error::Result;
use crate::ethernet::{EthernetFrame, ETHERTYPE_ARP};
use crate::socket::RawLink;

pub const BROADCAST_MAC: [u8; 6] = [0xFF; 6];

/// Broadcasts one ARP REQUEST for `gateway_ip` and blocks, reading frames
/// off `link`, until an ARP frame is observed. Deliberately permissive per
/// spec: any Ethernet frame with EtherType 0x0806 is accepted as the
/// reply, without checking opcode or the sender protocol address.
pub fn resolve_gateway_mac<L: RawLink>(
    link: &mut L,
    local_mac: [u8; 6],
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
    tick: Duration,
) -> Result<[u8; 6]> {
    let arp_request = ArpPacket::request(local_mac, local_ip.octets(), gateway_ip.octets());
    let eth_frame = EthernetFrame::new(BROADCAST_MAC, local_mac, ETHERTYPE_ARP, arp_request.pack());

    debug!(%arp_request, %eth_frame, "sending ARP REQUEST for gateway MAC");
    info!(gateway_ip = %gateway_ip, "querying gateway MAC address");
    link.send_frame(&eth_frame.pack())?;

    loop {
        let frame = match link.recv_frame(tick, 1500)? {
            Some(frame) => frame,
            None => continue,
        };
        let Some(eth) = EthernetFrame::unpack(&frame) else {
            continue;
        };
        if eth.ethertype != ETHERTYPE_ARP {
            continue;
        }
        let Some(reply) = ArpPacket::unpack(&eth.payload) else {
            continue;
        };
        debug!(%reply, %eth, "received ARP frame");
        info!(gateway_mac = %crate::ethernet::format_mac(&reply.sender_hw), "resolved gateway MAC address");
        return Ok(reply.sender_hw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arp::OPCODE_REPLY;
    use crate::socket::test_support::SyntheticLink;

    #[test]
    fn adopts_sender_hw_of_first_arp_frame_seen() {
        let local_mac = [0x02, 0, 0, 0, 0, 1];
        let local_ip = Ipv4Addr::new(10, 0, 0, 5);
        let gateway_ip = Ipv4Addr::new(10, 0, 0, 1);
        let gateway_mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

        let mut link = SyntheticLink::default();
        // A non-ARP frame first; the loop must skip it.
        link.inbox.push_back(
            EthernetFrame::new(local_mac, gateway_mac, crate::ethernet::ETHERTYPE_IPV4, vec![1, 2, 3])
                .pack(),
        );
        let reply = ArpPacket {
            opcode: OPCODE_REPLY,
            ..ArpPacket::request(gateway_mac, gateway_ip.octets(), local_ip.octets())
        };
        link.inbox.push_back(
            EthernetFrame::new(local_mac, gateway_mac, ETHERTYPE_ARP, reply.pack()).pack(),
        );

        let resolved =
            resolve_gateway_mac(&mut link, local_mac, local_ip, gateway_ip, Duration::from_millis(1))
                .unwrap();
        assert_eq!(resolved, gateway_mac);
        assert_eq!(link.sent.len(), 1);
    }
}
