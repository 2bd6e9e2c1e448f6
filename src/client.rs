//! A socket-backed connection: an embedded [`UserCore`] plus the I/O state
//! needed to read whole messages off the wire and write replies back to it.

use std::io::Write;
use std::net::SocketAddr;

use mio::net::TcpStream;

use irczt_reader::LineReader;

use crate::user::UserCore;

pub struct Client {
    socket: TcpStream,
    addr: SocketAddr,
    reader: LineReader,
    core: UserCore,
    /// Set when a write to this client's socket has failed; the server
    /// reaps clients carrying this flag once the current event finishes
    /// processing, rather than destroying them mid-broadcast.
    dead: bool,
}

impl Client {
    pub fn new(socket: TcpStream, addr: SocketAddr) -> Self {
        Client {
            socket,
            addr,
            reader: LineReader::new(),
            core: UserCore::default(),
            dead: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn core(&self) -> &UserCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut UserCore {
        &mut self.core
    }

    pub fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Reads once off the socket, dispatching each whole message found to
    /// `on_message`. Mirrors [`irczt_reader::LineReader::fill`]; kept as a
    /// thin wrapper so the server doesn't reach into `reader`/`socket`
    /// directly (which would fight the borrow checker once the event loop
    /// also needs `&mut self` on other fields to dispatch commands).
    pub fn fill<F>(&mut self, on_message: F) -> Result<(), irczt_reader::ReassembleError>
    where
        F: FnMut(&[u8]),
    {
        self.reader.fill(&mut self.socket, on_message)
    }

    /// Writes `line` to the socket. A failure marks this client dead rather
    /// than propagating: one recipient's broken pipe must not abort a
    /// broadcast to the rest of a channel.
    pub fn send_line(&mut self, line: &str) {
        if self.dead {
            return;
        }
        if let Err(e) = self.socket.write_all(line.as_bytes()) {
            log::warn!("{}: write failed: {}", self.addr, e);
            self.dead = true;
        }
    }

    /// Used by the QUIT/malformed-message paths, which write `ERROR :...`
    /// and then tear the connection down regardless of whether the write
    /// itself succeeded.
    pub fn send_line_best_effort(&mut self, line: &str) {
        let _ = self.socket.write_all(line.as_bytes());
    }

    pub fn shutdown(&mut self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}
