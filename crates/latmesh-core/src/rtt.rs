//! Kernel round-trip-time extraction.
//!
//! The RTT reported for a ping is the TCP stack's own smoothed estimate for
//! the connection, read after the handshake lines have crossed. There is no
//! fallback to a user-space timer: a platform without a supported socket
//! option reports `UnsupportedPlatform`.

use std::sync::Arc;

use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum RttError {
    #[error("kernel RTT is not available on this platform")]
    UnsupportedPlatform,
    #[error("getsockopt(TCP_INFO) failed: {0}")]
    Sockopt(#[source] std::io::Error),
}

/// Source of the smoothed RTT for an established connection, in microseconds.
pub trait RttProbe: Send + Sync {
    fn smoothed_rtt(&self, stream: &TcpStream) -> Result<u32, RttError>;

    /// Whether `smoothed_rtt` can ever succeed on this host.
    fn is_supported(&self) -> bool {
        true
    }
}

/// Reads the RTT straight from the kernel's per-socket TCP state.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelRtt;

/// The probe for the platform this binary was built for.
pub fn platform_probe() -> Arc<dyn RttProbe> {
    Arc::new(KernelRtt)
}

#[cfg(target_os = "linux")]
impl RttProbe for KernelRtt {
    fn smoothed_rtt(&self, stream: &TcpStream) -> Result<u32, RttError> {
        use std::os::fd::AsRawFd;
        linux::tcp_info_rtt(stream.as_raw_fd())
    }
}

#[cfg(not(target_os = "linux"))]
impl RttProbe for KernelRtt {
    fn smoothed_rtt(&self, _stream: &TcpStream) -> Result<u32, RttError> {
        Err(RttError::UnsupportedPlatform)
    }

    fn is_supported(&self) -> bool {
        false
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::os::fd::RawFd;

    use super::RttError;

    /// `tcpi_rtt` from getsockopt(IPPROTO_TCP, TCP_INFO). Already in µs.
    pub(super) fn tcp_info_rtt(fd: RawFd) -> Result<u32, RttError> {
        // SAFETY: tcp_info is plain old data, all-zero is a valid value.
        let mut info: libc::tcp_info = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::tcp_info>() as libc::socklen_t;

        // SAFETY: `info` and `len` outlive the call and `len` holds the
        // buffer size. The kernel writes at most `len` bytes.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_INFO,
                &mut info as *mut libc::tcp_info as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(RttError::Sockopt(std::io::Error::last_os_error()));
        }
        Ok(info.tcpi_rtt)
    }
}
