//! ARP packet codec: RFC 826 IPv4-over-Ethernet, fixed 28-byte layout.

use std::fmt;

use crate::ethernet::format_mac;

pub const PACKET_LEN: usize = 28;

pub const HTYPE_ETHERNET: u16 = 0x0001;
pub const PTYPE_IPV4: u16 = 0x0800;

pub const OPCODE_REQUEST: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub htype: u16,
    pub ptype: u16,
    pub hlen: u8,
    pub plen: u8,
    pub opcode: u16,
    pub sender_hw: [u8; 6],
    pub sender_proto: [u8; 4],
    pub target_hw: [u8; 6],
    pub target_proto: [u8; 4],
}

impl ArpPacket {
    pub fn request(sender_hw: [u8; 6], sender_proto: [u8; 4], target_proto: [u8; 4]) -> Self {
        Self {
            htype: HTYPE_ETHERNET,
            ptype: PTYPE_IPV4,
            hlen: 6,
            plen: 4,
            opcode: OPCODE_REQUEST,
            sender_hw,
            sender_proto,
            target_hw: [0u8; 6],
            target_proto,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_LEN);
        buf.extend_from_slice(&self.htype.to_be_bytes());
        buf.extend_from_slice(&self.ptype.to_be_bytes());
        buf.push(self.hlen);
        buf.push(self.plen);
        buf.extend_from_slice(&self.opcode.to_be_bytes());
        buf.extend_from_slice(&self.sender_hw);
        buf.extend_from_slice(&self.sender_proto);
        buf.extend_from_slice(&self.target_hw);
        buf.extend_from_slice(&self.target_proto);
        buf
    }

    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < PACKET_LEN {
            return None;
        }
        let mut sender_hw = [0u8; 6];
        let mut sender_proto = [0u8; 4];
        let mut target_hw = [0u8; 6];
        let mut target_proto = [0u8; 4];
        sender_hw.copy_from_slice(&data[8..14]);
        sender_proto.copy_from_slice(&data[14..18]);
        target_hw.copy_from_slice(&data[18..24]);
        target_proto.copy_from_slice(&data[24..28]);
        Some(Self {
            htype: u16::from_be_bytes([data[0], data[1]]),
            ptype: u16::from_be_bytes([data[2], data[3]]),
            hlen: data[4],
            plen: data[5],
            opcode: u16::from_be_bytes([data[6], data[7]]),
            sender_hw,
            sender_proto,
            target_hw,
            target_proto,
        })
    }
}

impl fmt::Display for ArpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ArpPacket[op={}, sha={}, spa={}.{}.{}.{}, tha={}, tpa={}.{}.{}.{}]",
            if self.opcode == OPCODE_REQUEST { "REQUEST" } else { "REPLY" },
            format_mac(&self.sender_hw),
            self.sender_proto[0], self.sender_proto[1], self.sender_proto[2], self.sender_proto[3],
            format_mac(&self.target_hw),
            self.target_proto[0], self.target_proto[1], self.target_proto[2], self.target_proto[3],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let req = ArpPacket::request(
            [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            [10, 0, 0, 5],
            [10, 0, 0, 1],
        );
        let packed = req.pack();
        assert_eq!(packed.len(), PACKET_LEN);
        let unpacked = ArpPacket::unpack(&packed).unwrap();
        assert_eq!(unpacked, req);
    }

    #[test]
    fn unpack_rejects_short_buffer() {
        assert!(ArpPacket::unpack(&[0u8; 10]).is_none());
    }
}
