//! Interface facts: local IPv4/MAC and the default gateway's IPv4, pulled
//! from OS facilities and hidden behind a trait so tests can inject
//! synthetic link facts instead of touching real interfaces.

use std::net::Ipv4Addr;

use crate::error::{Result, StackError};

/// OS-facility lookups needed before the stack can send its first frame.
pub trait LinkFacts {
    fn local_ipv4(&self, iface: &str) -> Result<Ipv4Addr>;
    fn local_mac(&self, iface: &str) -> Result<[u8; 6]>;
    fn gateway_ipv4(&self, iface: &str) -> Result<Ipv4Addr>;
}

/// Fixed facts for tests, avoiding any dependency on real interfaces.
#[derive(Debug, Clone)]
pub struct StaticLinkFacts {
    pub local_ipv4: Ipv4Addr,
    pub local_mac: [u8; 6],
    pub gateway_ipv4: Ipv4Addr,
}

impl LinkFacts for StaticLinkFacts {
    fn local_ipv4(&self, _iface: &str) -> Result<Ipv4Addr> {
        Ok(self.local_ipv4)
    }

    fn local_mac(&self, _iface: &str) -> Result<[u8; 6]> {
        Ok(self.local_mac)
    }

    fn gateway_ipv4(&self, _iface: &str) -> Result<Ipv4Addr> {
        Ok(self.gateway_ipv4)
    }
}

#[cfg(target_os = "linux")]
pub use linux::SystemLinkFacts;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::ffi::CString;
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    const SIOCGIFADDR: libc::c_ulong = 0x8915;
    const SIOCGIFHWADDR: libc::c_ulong = 0x8927;

    #[repr(C)]
    struct IfReq {
        ifr_name: [libc::c_char; libc::IFNAMSIZ],
        ifr_addr: libc::sockaddr,
    }

    fn ifreq_named(iface: &str) -> Result<IfReq> {
        if iface.len() >= libc::IFNAMSIZ {
            return Err(StackError::Config(format!("interface name too long: {iface}")));
        }
        let c_name = CString::new(iface)
            .map_err(|_| StackError::Config(format!("invalid interface name: {iface}")))?;
        let mut ifr_name = [0 as libc::c_char; libc::IFNAMSIZ];
        for (dst, src) in ifr_name.iter_mut().zip(c_name.as_bytes_with_nul()) {
            *dst = *src as libc::c_char;
        }
        Ok(IfReq { ifr_name, ifr_addr: unsafe { std::mem::zeroed() } })
    }

    fn ioctl_query(iface: &str, request: libc::c_ulong) -> Result<IfReq> {
        let mut req = ifreq_named(iface)?;
        // A throwaway UDP socket is the conventional fd to issue
        // interface-info ioctls on; it never sends anything.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(StackError::Io(std::io::Error::last_os_error()));
        }
        let rc = unsafe { libc::ioctl(fd, request, &mut req as *mut IfReq) };
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        if rc < 0 {
            return Err(StackError::Config(format!(
                "cannot query interface {iface}: {err}"
            )));
        }
        Ok(req)
    }

    /// Interface-info and routing-table facts read straight from the
    /// kernel, analogous to the original's `fcntl.ioctl` calls.
    pub struct SystemLinkFacts;

    impl LinkFacts for SystemLinkFacts {
        fn local_ipv4(&self, iface: &str) -> Result<Ipv4Addr> {
            let req = ioctl_query(iface, SIOCGIFADDR)?;
            let sa_data = req.ifr_addr.sa_data;
            // sin_port occupies sa_data[0..2]; sin_addr follows at [2..6].
            let bytes: [u8; 4] = [
                sa_data[2] as u8,
                sa_data[3] as u8,
                sa_data[4] as u8,
                sa_data[5] as u8,
            ];
            Ok(Ipv4Addr::from(bytes))
        }

        fn local_mac(&self, iface: &str) -> Result<[u8; 6]> {
            let req = ioctl_query(iface, SIOCGIFHWADDR)?;
            let sa_data = req.ifr_addr.sa_data;
            let mut mac = [0u8; 6];
            for i in 0..6 {
                mac[i] = sa_data[i] as u8;
            }
            Ok(mac)
        }

        fn gateway_ipv4(&self, iface: &str) -> Result<Ipv4Addr> {
            let file = File::open("/proc/net/route").map_err(StackError::Io)?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(StackError::Io)?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 3 {
                    continue;
                }
                if fields[0] == iface && fields[1] == "00000000" {
                    let raw = u32::from_str_radix(fields[2], 16).map_err(|e| {
                        StackError::Config(format!("malformed route entry: {e}"))
                    })?;
                    return Ok(Ipv4Addr::from(raw.to_le_bytes()));
                }
            }
            Err(StackError::Config(format!(
                "no default gateway found for interface {iface} in /proc/net/route"
            )))
        }
    }
}
