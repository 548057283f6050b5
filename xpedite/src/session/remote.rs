//! Remote profiler session over TCP.
//!
//! One listener, at most one accepted client at a time. Frames are read
//! non-blocking at the poll cadence; an incomplete frame simply waits for
//! the next tick. A disconnect or framing corruption ends the session and
//! restores process state through the handler.

use super::Handler;
use crate::domain::InitError;
use crate::request::{self, Response};
use crate::transport::{write_response, FrameReader, ReadState};
use log::{info, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Error text returned to a remote peer while another session holds the
/// runtime.
const SESSION_BUSY: &str = "another profiling session is active";

struct Client {
    stream: TcpStream,
    reader: FrameReader,
    peer: SocketAddr,
}

pub struct RemoteSession {
    listener: TcpListener,
    port: u16,
    client: Option<Client>,
    /// True while this session holds the runtime (drives cleanup on
    /// disconnect).
    engaged: bool,
}

impl RemoteSession {
    /// Bind the control listener. An empty `listener_ip` binds every
    /// interface; port 0 lets the OS pick (the bound port lands in the
    /// app-info file).
    pub fn bind(listener_ip: &str, port: u16) -> Result<Self, InitError> {
        let ip = if listener_ip.is_empty() { "0.0.0.0" } else { listener_ip };
        let addr = format!("{ip}:{port}");
        let bind_err =
            |source: io::Error| InitError::ListenerBind { addr: addr.clone(), source };
        let listener = TcpListener::bind(&addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let port = listener.local_addr().map_err(bind_err)?.port();
        info!("profiler listener bound on {ip}:{port}");
        Ok(Self { listener, port, client: None, engaged: false })
    }

    pub fn listener_port(&self) -> u16 {
        self.port
    }

    /// Accept/read/respond for one tick. Returns whether the remote
    /// session is engaged: a client is connected and `can_accept` grants
    /// it the runtime.
    ///
    /// With `can_accept` false the connection stays open but every
    /// request is answered with an error instead of executing.
    pub fn poll(&mut self, can_accept: bool, handler: &mut Handler) -> bool {
        if self.client.is_none() {
            self.try_accept();
        }

        if self.client.is_some() && !self.serve_client(can_accept, handler) {
            self.disconnect(handler);
        }

        self.engaged = self.client.is_some() && can_accept;
        self.engaged
    }

    fn try_accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("failed to make client socket non-blocking: {e}");
                    return;
                }
                let _ = stream.set_nodelay(true);
                info!("profiler connected from {peer}");
                self.client = Some(Client { stream, reader: FrameReader::new(), peer });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }
    }

    /// Returns false when the connection must close.
    fn serve_client(&mut self, can_accept: bool, handler: &mut Handler) -> bool {
        let client = self.client.as_mut().expect("serve_client without client");

        if client.reader.fill(&mut client.stream) == ReadState::Closed {
            return false;
        }

        loop {
            let payload = match client.reader.next_frame() {
                Ok(Some(payload)) => payload,
                Ok(None) => return true,
                Err(e) => {
                    warn!("framing corruption from {}: {e}", client.peer);
                    return false;
                }
            };

            let text = String::from_utf8_lossy(&payload);
            let response = if can_accept {
                match request::parse(&text) {
                    Ok(request) => request.execute(handler),
                    Err(e) => Response::Error(e.to_string()),
                }
            } else {
                Response::Error(SESSION_BUSY.to_string())
            };

            if let Err(e) = write_response(&mut client.stream, &response) {
                warn!("failed to respond to {}: {e}", client.peer);
                return false;
            }
        }
    }

    fn disconnect(&mut self, handler: &mut Handler) {
        if let Some(client) = self.client.take() {
            info!("profiler at {} disconnected", client.peer);
        }
        if self.engaged {
            warn!("remote session ended, restoring process state");
            handler.terminate_session();
        }
        self.engaged = false;
    }

    /// Close the active client, restoring state if it held the runtime.
    /// The listener itself closes on drop.
    pub fn shutdown(&mut self, handler: &mut Handler) {
        self.disconnect(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{read_frame, write_frame, STATUS_ERROR, STATUS_OK};
    use std::net::TcpStream;
    use std::time::Duration;

    fn connect(session: &mut RemoteSession, handler: &mut Handler) -> TcpStream {
        let stream =
            TcpStream::connect(("127.0.0.1", session.listener_port())).expect("connect failed");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        // let the listener pick the connection up
        for _ in 0..100 {
            session.poll(true, handler);
            if session.client.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(session.client.is_some(), "client never accepted");
        stream
    }

    fn roundtrip(
        stream: &mut TcpStream,
        session: &mut RemoteSession,
        handler: &mut Handler,
        can_accept: bool,
        request: &str,
    ) -> (u8, String) {
        write_frame(stream, request.as_bytes()).unwrap();
        for _ in 0..100 {
            session.poll(can_accept, handler);
            std::thread::sleep(Duration::from_millis(1));
            stream.set_nonblocking(true).unwrap();
            let mut probe = [0u8; 1];
            let ready = matches!(stream.peek(&mut probe), Ok(n) if n > 0);
            stream.set_nonblocking(false).unwrap();
            if ready {
                break;
            }
        }
        let payload = read_frame(stream).unwrap();
        (payload[0], String::from_utf8_lossy(&payload[1..]).into_owned())
    }

    #[test]
    fn test_ping_round_trip() {
        let mut session = RemoteSession::bind("127.0.0.1", 0).unwrap();
        let mut handler = Handler::new();
        let mut stream = connect(&mut session, &mut handler);

        let (status, text) = roundtrip(&mut stream, &mut session, &mut handler, true, "Ping");
        assert_eq!(status, STATUS_OK);
        assert_eq!(text, "");
    }

    #[test]
    fn test_empty_frame_yields_error() {
        let mut session = RemoteSession::bind("127.0.0.1", 0).unwrap();
        let mut handler = Handler::new();
        let mut stream = connect(&mut session, &mut handler);

        let (status, text) = roundtrip(&mut stream, &mut session, &mut handler, true, "");
        assert_eq!(status, STATUS_ERROR);
        assert!(text.contains("empty request"));
    }

    #[test]
    fn test_rejected_while_other_session_active() {
        let mut session = RemoteSession::bind("127.0.0.1", 0).unwrap();
        let mut handler = Handler::new();
        let mut stream = connect(&mut session, &mut handler);

        let (status, text) =
            roundtrip(&mut stream, &mut session, &mut handler, false, "Ping");
        assert_eq!(status, STATUS_ERROR);
        assert_eq!(text, SESSION_BUSY);
        // connection stays open and the session never engages
        assert!(session.client.is_some());
        assert!(!session.engaged);
    }

    #[test]
    fn test_disconnect_releases_session() {
        let mut session = RemoteSession::bind("127.0.0.1", 0).unwrap();
        let mut handler = Handler::new();
        let stream = connect(&mut session, &mut handler);
        assert!(session.poll(true, &mut handler));

        drop(stream);
        for _ in 0..100 {
            if !session.poll(true, &mut handler) && session.client.is_none() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(session.client.is_none());
        assert!(!session.engaged);
    }
}
