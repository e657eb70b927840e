//! AF_PACKET socket implementation

use super::Capture;
use crate::{Error, Result};
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::debug;

/// Non-blocking AF_PACKET raw socket bound to one interface
pub struct AfPacketSocket {
    async_fd: AsyncFd<RawFd>,
    ifindex: i32,
    name: String,
}

impl AfPacketSocket {
    /// Create a new AF_PACKET socket bound to the specified interface
    pub fn bind(ifname: &str) -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };

        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let ifindex = match Self::get_ifindex(fd, ifname) {
            Ok(ifindex) => ifindex,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };

        let ret = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };

        if ret < 0 {
            unsafe { libc::close(fd) };
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        // Frames addressed to other hosts' MACs are filtered in userspace
        if let Err(e) = Self::set_promisc(fd, ifindex, true) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let async_fd = match AsyncFd::new(fd) {
            Ok(async_fd) => async_fd,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(Error::Io(e));
            }
        };

        debug!(interface = ifname, ifindex, "AF_PACKET socket bound");
        Ok(Self {
            async_fd,
            ifindex,
            name: ifname.to_string(),
        })
    }

    fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
        let ifname_c = CString::new(ifname).map_err(|_| Error::InterfaceNotFound {
            name: ifname.to_string(),
        })?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let name_bytes = ifname_c.as_bytes_with_nul();
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }
        ifr.ifr_name[..name_bytes.len()].copy_from_slice(unsafe {
            std::slice::from_raw_parts(name_bytes.as_ptr() as *const libc::c_char, name_bytes.len())
        });

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }

        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };

        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &mreq as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::packet_mreq>() as u32,
            )
        };

        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Receive one frame, returning its length
    ///
    /// Copies of frames this host sent (PACKET_OUTGOING) are skipped.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.readable().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
                let mut addr_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
                let n = unsafe {
                    libc::recvfrom(
                        fd,
                        buf.as_mut_ptr() as *mut _,
                        buf.len(),
                        0,
                        &mut addr as *mut _ as *mut libc::sockaddr,
                        &mut addr_len,
                    )
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok((n as usize, addr.sll_pkttype))
                }
            }) {
                Ok(Ok((_, pkttype))) if pkttype == libc::PACKET_OUTGOING => continue,
                Ok(Ok((len, _))) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Send one complete frame
    pub async fn send(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.writable().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let n = unsafe { libc::send(fd, buf.as_ptr() as *const _, buf.len(), 0) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        *self.async_fd.get_ref()
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        let _ = Self::set_promisc(*self.async_fd.get_ref(), self.ifindex, false);
        unsafe { libc::close(*self.async_fd.get_ref()) };
    }
}

impl Capture for AfPacketSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        AfPacketSocket::send(self, buf).await
    }
}
