//! The raw link-layer socket: a small trait over "send one frame" / "wait
//! up to `tick` then receive one frame", so the TCP engine can run against
//! either a real `AF_PACKET` socket or a synthetic in-memory link in tests.

use std::time::Duration;

use crate::error::Result;

pub trait RawLink {
    /// Sends one Ethernet frame (header + payload), returning the number
    /// of bytes accepted by the socket.
    fn send_frame(&mut self, frame: &[u8]) -> Result<usize>;

    /// Waits up to `tick` for readability. Returns `Ok(None)` on timeout,
    /// `Ok(Some(frame))` with the received bytes (header + payload,
    /// truncated to `bufsize`) on readability.
    fn recv_frame(&mut self, tick: Duration, bufsize: usize) -> Result<Option<Vec<u8>>>;
}

#[cfg(target_os = "linux")]
pub use linux::PacketSocket;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use crate::error::StackError;
    use std::ffi::CString;
    use std::mem;
    use std::os::unix::io::{AsRawFd, RawFd};

    const ETH_P_ALL: u16 = 0x0003;

    /// A bound `AF_PACKET`/`SOCK_RAW` socket capturing every Ethernet
    /// frame on the given interface, sends included.
    pub struct PacketSocket {
        fd: RawFd,
    }

    impl PacketSocket {
        pub fn bind(iface: &str) -> Result<Self> {
            let fd = unsafe {
                libc::socket(libc::AF_PACKET, libc::SOCK_RAW, ETH_P_ALL.to_be() as i32)
            };
            if fd < 0 {
                return Err(StackError::Io(std::io::Error::last_os_error()));
            }

            let if_index = interface_index(iface).map_err(|e| {
                unsafe { libc::close(fd) };
                e
            })?;

            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = ETH_P_ALL.to_be();
            addr.sll_ifindex = if_index;

            let rc = unsafe {
                libc::bind(
                    fd,
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_ll>() as u32,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(StackError::Io(err));
            }
            Ok(Self { fd })
        }
    }

    fn interface_index(iface: &str) -> Result<i32> {
        let c_name = CString::new(iface)
            .map_err(|_| StackError::Config(format!("invalid interface name: {iface}")))?;
        let idx = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if idx == 0 {
            return Err(StackError::Config(format!("unknown interface: {iface}")));
        }
        Ok(idx as i32)
    }

    impl RawLink for PacketSocket {
        fn send_frame(&mut self, frame: &[u8]) -> Result<usize> {
            let rc = unsafe {
                libc::send(self.fd, frame.as_ptr() as *const libc::c_void, frame.len(), 0)
            };
            if rc < 0 {
                return Err(StackError::Io(std::io::Error::last_os_error()));
            }
            Ok(rc as usize)
        }

        fn recv_frame(&mut self, tick: Duration, bufsize: usize) -> Result<Option<Vec<u8>>> {
            let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
            let timeout_ms = tick.as_millis().min(i32::MAX as u128) as i32;
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                return Err(StackError::Io(std::io::Error::last_os_error()));
            }
            if rc == 0 {
                return Ok(None);
            }
            let mut buf = vec![0u8; bufsize];
            let n = unsafe {
                libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
            };
            if n < 0 {
                return Err(StackError::Io(std::io::Error::last_os_error()));
            }
            buf.truncate(n as usize);
            Ok(Some(buf))
        }
    }

    impl Drop for PacketSocket {
        fn drop(&mut self) {
            unsafe { libc::close(self.fd) };
        }
    }

    impl AsRawFd for PacketSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.fd
        }
    }
}
