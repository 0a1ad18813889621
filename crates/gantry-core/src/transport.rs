//! Transport abstraction for pluggable I/O.
//!
//! Nodes share one half-duplex medium; the framing layer above carries the
//! addressing, so a transport only moves raw byte runs. Implementations must
//! be callable concurrently from the transmitter and receiver threads.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// Low-level byte-run transport abstraction.
///
/// This trait allows various transports (UDP datagram, serial line, in-memory
/// loopback) to be plugged into the interface without coupling to a concrete
/// implementation.
pub trait Transport: Send + Sync + 'static {
    /// Sends a single byte run over the shared medium.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Receives a single byte run, blocking up to `timeout`.
    ///
    /// Returns the number of bytes written into `buffer`. An idle medium
    /// yields `WouldBlock` or `TimedOut`, which callers treat as "no data".
    fn receive(&self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Transport over a connected UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds a local socket and connects it to the node network's address.
    pub fn connect<B: ToSocketAddrs, R: ToSocketAddrs>(bind: B, remote: R) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.connect(remote)?;
        Ok(Self { socket })
    }

    /// Wraps an already-connected socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Returns the local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send(payload)
    }

    fn receive(&self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.recv(buffer)
    }
}

/// In-memory transport pair for tests and simulated nodes.
///
/// Bytes sent on one end arrive at the other; each end is itself a valid
/// [`Transport`].
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl LoopbackTransport {
    /// Creates a connected pair of loopback transports.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (Self { tx: a_tx, rx: b_rx }, Self { tx: b_tx, rx: a_rx })
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer dropped"))?;
        Ok(payload.len())
    }

    fn receive(&self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => {
                let len = bytes.len().min(buffer.len());
                buffer[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Err(RecvTimeoutError::Timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer dropped"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_round_trip() {
        let (a, b) = LoopbackTransport::pair();
        a.send(&[1, 2, 3]).unwrap();

        let mut buffer = [0u8; 16];
        let len = b.receive(&mut buffer, Duration::from_millis(100)).unwrap();
        assert_eq!(&buffer[..len], &[1, 2, 3]);
    }

    #[test]
    fn test_loopback_times_out_when_idle() {
        let (a, _b) = LoopbackTransport::pair();
        let mut buffer = [0u8; 16];
        let err = a.receive(&mut buffer, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_loopback_both_directions() {
        let (a, b) = LoopbackTransport::pair();
        a.send(b"ping").unwrap();
        b.send(b"pong").unwrap();

        let mut buffer = [0u8; 16];
        let len = b.receive(&mut buffer, Duration::from_millis(100)).unwrap();
        assert_eq!(&buffer[..len], b"ping");
        let len = a.receive(&mut buffer, Duration::from_millis(100)).unwrap();
        assert_eq!(&buffer[..len], b"pong");
    }
}
