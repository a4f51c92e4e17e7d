//! Socket I/O for the tunnel and TLS stages.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

/// How often a blocked stage read wakes up to check for cancellation.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reads and writes a socket until a deadline, giving up early on cancel.
///
/// The socket's read timeout is shortened to [`POLL_INTERVAL`] while this
/// exists and restored on drop.
pub(crate) struct StageIo<'a> {
    socket: &'a TcpStream,
    cancel: &'a CancelToken,
    deadline: Instant,
    restore: Option<Duration>,
}

impl<'a> StageIo<'a> {
    pub(crate) fn new(
        socket: &'a TcpStream,
        cancel: &'a CancelToken,
        timeout: Duration,
    ) -> io::Result<Self> {
        let restore = socket.read_timeout()?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(Self {
            socket,
            cancel,
            deadline: Instant::now() + timeout,
            restore,
        })
    }
}

/// The call was canceled while a stage waited on the peer.
#[derive(Debug)]
struct StageCanceled;

impl std::fmt::Display for StageCanceled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("canceled while waiting on the peer")
    }
}

impl std::error::Error for StageCanceled {}

/// Check if an I/O error came from a canceled stage.
pub(crate) fn is_canceled_error(error: &io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|inner| inner.downcast_ref::<StageCanceled>().is_some())
}

impl Read for StageIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut socket = self.socket;
        loop {
            match socket.read(buf) {
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    if self.cancel.is_canceled() {
                        return Err(io::Error::other(StageCanceled));
                    }
                    if Instant::now() >= self.deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "peer did not answer before the handshake timeout",
                        ));
                    }
                }
                other => return other,
            }
        }
    }
}

impl Write for StageIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut socket = self.socket;
        socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut socket = self.socket;
        socket.flush()
    }
}

impl Drop for StageIo<'_> {
    fn drop(&mut self) {
        let _ = self.socket.set_read_timeout(self.restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_read_times_out_at_deadline() {
        let (client, _server) = pair();
        let cancel = CancelToken::new();
        let started = Instant::now();

        let mut io = StageIo::new(&client, &cancel, Duration::from_millis(200)).unwrap();
        let err = io.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!is_canceled_error(&err));
    }

    #[test]
    fn test_read_stops_on_cancel() {
        let (client, _server) = pair();
        let cancel = CancelToken::new();
        let canceler = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceler.cancel();
        });

        let started = Instant::now();
        let mut io = StageIo::new(&client, &cancel, Duration::from_secs(30)).unwrap();
        let err = io.read(&mut [0u8; 8]).unwrap_err();
        assert!(is_canceled_error(&err));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_passes_data_and_restores_timeout() {
        let (client, mut server) = pair();
        client.set_read_timeout(Some(Duration::from_secs(7))).unwrap();
        let cancel = CancelToken::new();

        {
            let mut io = StageIo::new(&client, &cancel, Duration::from_secs(1)).unwrap();
            server.write_all(b"hi").unwrap();
            let mut buf = [0u8; 2];
            io.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"hi");
            assert_eq!(client.read_timeout().unwrap(), Some(POLL_INTERVAL));
        }

        assert_eq!(client.read_timeout().unwrap(), Some(Duration::from_secs(7)));
    }
}
