//! IPv4 datagram codec: 20-byte header, no options emitted, tolerant of
//! options on receive (skipped, not parsed).

use std::fmt;
use std::net::Ipv4Addr;

use crate::checksum::checksum;

pub const HEADER_LEN: usize = 20;
pub const PROTO_TCP: u8 = 6;
pub const DEFAULT_IDENTIFICATION: u16 = 54321;
pub const DEFAULT_TTL: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_len: u16,
    pub identification: u16,
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Vec<u8>,
}

impl Ipv4Datagram {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, payload: Vec<u8>) -> Self {
        let total_len = (4 * 5 + payload.len()) as u16;
        Self {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len,
            identification: DEFAULT_IDENTIFICATION,
            frag_offset: 0,
            ttl: DEFAULT_TTL,
            protocol: PROTO_TCP,
            header_checksum: 0,
            src,
            dst,
            payload,
        }
    }

    /// Packs the header with the checksum computed over the header with
    /// the checksum field zeroed, then written back into place.
    pub fn pack(&self) -> Vec<u8> {
        let mut hdr = [0u8; HEADER_LEN];
        hdr[0] = (self.version << 4) | self.ihl;
        hdr[1] = self.tos;
        hdr[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        hdr[4..6].copy_from_slice(&self.identification.to_be_bytes());
        hdr[6..8].copy_from_slice(&self.frag_offset.to_be_bytes());
        hdr[8] = self.ttl;
        hdr[9] = self.protocol;
        hdr[10..12].copy_from_slice(&0u16.to_be_bytes());
        hdr[12..16].copy_from_slice(&self.src.octets());
        hdr[16..20].copy_from_slice(&self.dst.octets());

        let cksum = checksum(&hdr);
        hdr[10..12].copy_from_slice(&cksum.to_be_bytes());

        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&hdr);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Unpacks a received datagram. Options beyond the base 20 bytes are
    /// skipped (not parsed) when `ihl > 5`. `header_checksum` is left
    /// holding the recomputed checksum of the as-received header bytes;
    /// callers must use `verify_checksum` rather than comparing fields.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let ver_ihl = data[0];
        let version = ver_ihl >> 4;
        let ihl = ver_ihl & 0x0F;
        let tos = data[1];
        let total_len = u16::from_be_bytes([data[2], data[3]]);
        let identification = u16::from_be_bytes([data[4], data[5]]);
        let frag_offset = u16::from_be_bytes([data[6], data[7]]);
        let ttl = data[8];
        let protocol = data[9];
        let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

        let mut header_size = HEADER_LEN;
        if ihl > 5 {
            header_size += (ihl as usize - 5) * 4;
        }
        if data.len() < header_size {
            return None;
        }
        let header_checksum = checksum(&data[..header_size]);

        let payload_end = (total_len as usize).min(data.len());
        let payload = if header_size < payload_end {
            data[header_size..payload_end].to_vec()
        } else {
            Vec::new()
        };

        Some(Self {
            version,
            ihl,
            tos,
            total_len,
            identification,
            frag_offset,
            ttl,
            protocol,
            header_checksum,
            src,
            dst,
            payload,
        })
    }

    /// True when the checksum recomputed over the as-received header
    /// bytes (checksum field in place) sums to zero.
    pub fn verify_checksum(&self) -> bool {
        self.header_checksum == 0
    }
}

impl fmt::Display for Ipv4Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ipv4Datagram[ver={}, ihl={}, tlen={}, id={}, ttl={}, proto={}, src={}, dst={}, cksum=0x{:04x}]",
            self.version, self.ihl, self.total_len, self.identification, self.ttl,
            self.protocol, self.src, self.dst, self.header_checksum
        )
    }
}
