//! Liveness check: does anything accept TCP connections on a port.

use std::io::ErrorKind as IoErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{ErrorKind, WardenError};

pub trait PortCheck: Send + Sync {
    /// `Ok(false)` when the connection is refused or times out; an error
    /// only when the check itself could not be performed.
    fn is_listening(&self, port: u16) -> Result<bool, WardenError>;
}

/// Connects to the port on the loopback interface.
#[derive(Debug, Clone)]
pub struct TcpPortCheck {
    timeout: Duration,
}

impl TcpPortCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPortCheck {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl PortCheck for TcpPortCheck {
    fn is_listening(&self, port: u16) -> Result<bool, WardenError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        match TcpStream::connect_timeout(&addr, self.timeout) {
            Ok(_) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    IoErrorKind::ConnectionRefused
                        | IoErrorKind::TimedOut
                        | IoErrorKind::WouldBlock
                        | IoErrorKind::ConnectionReset
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(WardenError::reconcile(
                ErrorKind::ProbeUnavailable,
                format!("cannot check port {}: {}", port, e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(TcpPortCheck::default().is_listening(port).unwrap());
    }

    #[test]
    fn test_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!TcpPortCheck::default().is_listening(port).unwrap());
    }
}
