//! TCP segment codec: 20-byte real header (no options emitted), checksum
//! over the RFC 793 pseudo-header + header + payload.

use std::fmt;
use std::net::Ipv4Addr;

use crate::checksum::checksum;
use crate::flags::TcpFlags;
use crate::ipv4::PROTO_TCP;

pub const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8,
    pub reserved: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset: 5,
            reserved: 0,
            flags,
            window,
            checksum: 0,
            urgent_ptr: 0,
            payload,
        }
    }

    fn header_bytes(&self) -> [u8; HEADER_LEN] {
        let mut hdr = [0u8; HEADER_LEN];
        hdr[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        hdr[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        hdr[4..8].copy_from_slice(&self.seq.to_be_bytes());
        hdr[8..12].copy_from_slice(&self.ack.to_be_bytes());
        hdr[12] = (self.data_offset << 4) | (self.reserved & 0x0F);
        hdr[13] = self.flags.bits();
        hdr[14..16].copy_from_slice(&self.window.to_be_bytes());
        hdr[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        hdr[18..20].copy_from_slice(&self.urgent_ptr.to_be_bytes());
        hdr
    }

    fn pseudo_header(src: Ipv4Addr, dst: Ipv4Addr, tcp_len: u16) -> [u8; 12] {
        let mut psh = [0u8; 12];
        psh[0..4].copy_from_slice(&src.octets());
        psh[4..8].copy_from_slice(&dst.octets());
        psh[8] = 0;
        psh[9] = PROTO_TCP;
        psh[10..12].copy_from_slice(&tcp_len.to_be_bytes());
        psh
    }

    /// Packs the segment with the checksum computed over pseudo-header +
    /// header + payload (checksum field zeroed first), then patched in.
    pub fn pack(&mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        self.checksum = 0;
        let hdr = self.header_bytes();
        let tcp_len = (hdr.len() + self.payload.len()) as u16;
        let psh = Self::pseudo_header(src, dst, tcp_len);

        let mut for_checksum = Vec::with_capacity(psh.len() + hdr.len() + self.payload.len());
        for_checksum.extend_from_slice(&psh);
        for_checksum.extend_from_slice(&hdr);
        for_checksum.extend_from_slice(&self.payload);
        self.checksum = checksum(&for_checksum);

        let mut out = Vec::with_capacity(hdr.len() + self.payload.len());
        out.extend_from_slice(&self.header_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Unpacks a received segment. If `data_offset > 5` the extra option
    /// bytes are skipped, not parsed. The `checksum` field on the returned
    /// segment holds the recomputed pseudo-header checksum; use
    /// `verify_checksum` to check it.
    pub fn unpack(data: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let src_port = u16::from_be_bytes([data[0], data[1]]);
        let dst_port = u16::from_be_bytes([data[2], data[3]]);
        let seq = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ack = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let data_offset = data[12] >> 4;
        let reserved = data[12] & 0x0F;
        let flags = TcpFlags::from_bits_truncate(data[13]);
        let window = u16::from_be_bytes([data[14], data[15]]);
        let urgent_ptr = u16::from_be_bytes([data[18], data[19]]);

        let mut header_size = HEADER_LEN;
        if data_offset > 5 {
            header_size += (data_offset as usize - 5) * 4;
        }
        if data.len() < header_size {
            return None;
        }
        let payload = data[header_size..].to_vec();

        let tcp_len = (header_size + payload.len()) as u16;
        let psh = Self::pseudo_header(src, dst, tcp_len);
        let mut for_checksum = Vec::with_capacity(psh.len() + header_size + payload.len());
        for_checksum.extend_from_slice(&psh);
        for_checksum.extend_from_slice(&data[..header_size]);
        for_checksum.extend_from_slice(&payload);
        let checksum = checksum(&for_checksum);

        Some(Self {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset,
            reserved,
            flags,
            window,
            checksum,
            urgent_ptr,
            payload,
        })
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == 0
    }
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TcpSegment[src_port={}, dst_port={}, seq={}, ack={}, flags={}, window={}, len(payload)={}]",
            self.src_port, self.dst_port, self.seq, self.ack, self.flags, self.window,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (Ipv4Addr, Ipv4Addr) {
        (Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
    }

    #[test]
    fn round_trip_with_pseudo_header_checksum() {
        let (src, dst) = addrs();
        let mut seg = TcpSegment::new(30000, 80, 1000, 0, TcpFlags::SYN, 65535, vec![]);
        let packed = seg.pack(src, dst);
        let unpacked = TcpSegment::unpack(&packed, src, dst).unwrap();
        assert!(unpacked.verify_checksum());
        assert_eq!(unpacked.src_port, seg.src_port);
        assert_eq!(unpacked.seq, seg.seq);
        assert_eq!(unpacked.flags, TcpFlags::SYN);
    }

    #[test]
    fn round_trip_with_payload() {
        let (src, dst) = addrs();
        let mut seg = TcpSegment::new(
            40000,
            443,
            12345,
            54321,
            TcpFlags::ACK | TcpFlags::PSH,
            65535,
            b"GET / HTTP/1.1\r\n\r\n".to_vec(),
        );
        let packed = seg.pack(src, dst);
        let unpacked = TcpSegment::unpack(&packed, src, dst).unwrap();
        assert!(unpacked.verify_checksum());
        assert_eq!(unpacked.payload, seg.payload);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let (src, dst) = addrs();
        let mut seg = TcpSegment::new(1, 2, 0, 0, TcpFlags::ACK, 1024, b"hello".to_vec());
        let mut packed = seg.pack(src, dst);
        let last = packed.len() - 1;
        packed[last] ^= 0xFF;
        let unpacked = TcpSegment::unpack(&packed, src, dst).unwrap();
        assert!(!unpacked.verify_checksum());
    }

    #[test]
    fn options_are_skipped_not_parsed() {
        let (src, dst) = addrs();
        let mut seg = TcpSegment::new(1, 2, 0, 0, TcpFlags::SYN, 1024, vec![]);
        let packed = seg.pack(src, dst);
        // Splice in a 4-byte option word and bump data_offset to 6.
        let mut with_opts = packed[..HEADER_LEN].to_vec();
        with_opts[12] = (6 << 4) | (with_opts[12] & 0x0F);
        with_opts.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        with_opts.extend_from_slice(b"payload");
        let unpacked = TcpSegment::unpack(&with_opts, src, dst).unwrap();
        assert_eq!(unpacked.payload, b"payload".to_vec());
        assert_eq!(unpacked.data_offset, 6);
    }

    proptest::proptest! {
        #[test]
        fn round_trip_verifies_over_arbitrary_fields_and_payloads(
            src_port in proptest::prelude::any::<u16>(),
            dst_port in proptest::prelude::any::<u16>(),
            seq in proptest::prelude::any::<u32>(),
            ack in proptest::prelude::any::<u32>(),
            flag_bits in 0u8..64,
            window in proptest::prelude::any::<u16>(),
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
        ) {
            let (src, dst) = addrs();
            let flags = TcpFlags::from_bits_truncate(flag_bits);
            let mut seg = TcpSegment::new(src_port, dst_port, seq, ack, flags, window, payload.clone());
            let packed = seg.pack(src, dst);
            let unpacked = TcpSegment::unpack(&packed, src, dst).unwrap();
            proptest::prop_assert!(unpacked.verify_checksum());
            proptest::prop_assert_eq!(unpacked.src_port, src_port);
            proptest::prop_assert_eq!(unpacked.dst_port, dst_port);
            proptest::prop_assert_eq!(unpacked.seq, seq);
            proptest::prop_assert_eq!(unpacked.ack, ack);
            proptest::prop_assert_eq!(unpacked.flags, flags);
            proptest::prop_assert_eq!(unpacked.payload, payload);
        }
    }
}
