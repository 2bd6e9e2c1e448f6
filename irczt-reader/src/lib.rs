//! Line reassembly for the IRC wire format.
//!
//! A [`LineReader`] accumulates bytes read from a socket (or anything
//! implementing [`std::io::Read`]) into complete `\r\n`-terminated messages,
//! one readiness notification at a time. It never reads more than once per
//! call, and never yields a partial message: callers drive it from an event
//! loop by calling [`LineReader::fill`] whenever the underlying descriptor is
//! reported readable.

use std::io::{self, Read};

/// Maximum size of a message, including the trailing `\r\n`.
pub const BUFFER_SIZE: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ReassembleError {
    /// A `read` returned zero bytes: the peer closed its side of the connection.
    #[error("end of file")]
    EndOfFile,

    /// A lone `\r` not followed by `\n`, or a message that doesn't fit in
    /// [`BUFFER_SIZE`] bytes.
    #[error("{0}")]
    Malformed(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    SawCr,
}

/// Reassembles whole `\r\n`-terminated messages out of a byte stream.
pub struct LineReader {
    buf: [u8; BUFFER_SIZE],
    /// Number of valid bytes at the front of `buf`.
    fill: usize,
    /// Start of the message currently being accumulated.
    msg_start: usize,
    state: ScanState,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    pub fn new() -> Self {
        LineReader {
            buf: [0; BUFFER_SIZE],
            fill: 0,
            msg_start: 0,
            state: ScanState::Normal,
        }
    }

    /// Reads once from `socket` and dispatches every complete message found
    /// in the newly arrived bytes to `on_message`, in arrival order.
    ///
    /// `on_message` is never called with a slice longer than
    /// `BUFFER_SIZE - 2` bytes. A zero-byte read is reported as
    /// [`ReassembleError::EndOfFile`]; anything that would make the buffer
    /// overflow without completing a message is reported as
    /// [`ReassembleError::Malformed`] and the reader should be discarded (its
    /// internal state is no longer meaningful).
    pub fn fill<R, F>(&mut self, socket: &mut R, mut on_message: F) -> Result<(), ReassembleError>
    where
        R: Read,
        F: FnMut(&[u8]),
    {
        let n = socket.read(&mut self.buf[self.fill..])?;
        if n == 0 {
            return Err(ReassembleError::EndOfFile);
        }

        let scan_from = self.fill;
        let new_fill = self.fill + n;
        let mut i = scan_from;

        while i < new_fill {
            match self.state {
                ScanState::Normal => match memchr::memchr(b'\r', &self.buf[i..new_fill]) {
                    Some(rel) => {
                        i += rel + 1;
                        self.state = ScanState::SawCr;
                    }
                    None => i = new_fill,
                },
                ScanState::SawCr => {
                    if self.buf[i] == b'\n' {
                        let msg_end = i - 1;
                        on_message(&self.buf[self.msg_start..msg_end]);
                        self.state = ScanState::Normal;
                        self.msg_start = i + 1;
                        i += 1;
                    } else {
                        return Err(ReassembleError::Malformed("Lone CR in message"));
                    }
                }
            }
        }

        self.fill = new_fill;
        if self.msg_start == self.fill {
            self.msg_start = 0;
            self.fill = 0;
        } else if self.msg_start == 0 && self.fill == self.buf.len() {
            return Err(ReassembleError::Malformed("Message is too long"));
        } else if self.msg_start != 0 {
            self.buf.copy_within(self.msg_start..self.fill, 0);
            self.fill -= self.msg_start;
            self.msg_start = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &[u8]) -> (Vec<Vec<u8>>, Option<ReassembleError>) {
        let mut reader = LineReader::new();
        let mut cursor = Cursor::new(input);
        let mut messages = Vec::new();
        loop {
            match reader.fill(&mut cursor, |m| messages.push(m.to_vec())) {
                Ok(()) => {}
                Err(e) => return (messages, Some(e)),
            }
        }
    }

    #[test]
    fn single_message_one_read() {
        let (msgs, err) = collect(b"NICK alice\r\n");
        assert_eq!(msgs, vec![b"NICK alice".to_vec()]);
        assert!(matches!(err, Some(ReassembleError::EndOfFile)));
    }

    #[test]
    fn several_messages_one_read() {
        let (msgs, _) = collect(b"NICK alice\r\nUSER alice x x :Alice A\r\n");
        assert_eq!(
            msgs,
            vec![
                b"NICK alice".to_vec(),
                b"USER alice x x :Alice A".to_vec(),
            ]
        );
    }

    #[test]
    fn message_split_across_reads() {
        // Cursor gives us one `read` per `fill` call worth of data only if we
        // feed the reader byte-by-byte through repeated small reads.
        let mut reader = LineReader::new();
        let mut messages = Vec::new();
        for chunk in [&b"NI"[..], b"CK al", b"ice\r", b"\nUSER", b" a b c :d\r\n"] {
            let mut cursor = Cursor::new(chunk);
            reader.fill(&mut cursor, |m| messages.push(m.to_vec())).unwrap();
        }
        assert_eq!(
            messages,
            vec![b"NICK alice".to_vec(), b"USER a b c :d".to_vec()]
        );
    }

    #[test]
    fn lone_cr_is_malformed() {
        let (msgs, err) = collect(b"NICK alice\rx");
        assert!(msgs.is_empty());
        assert!(matches!(err, Some(ReassembleError::Malformed(_))));
    }

    #[test]
    fn oversize_message_is_malformed() {
        let mut data = vec![b'a'; BUFFER_SIZE];
        data.extend_from_slice(b"\r\n");
        let (msgs, err) = collect(&data);
        assert!(msgs.is_empty());
        assert!(matches!(err, Some(ReassembleError::Malformed(_))));
    }

    #[test]
    fn empty_read_is_eof() {
        let (msgs, err) = collect(b"");
        assert!(msgs.is_empty());
        assert!(matches!(err, Some(ReassembleError::EndOfFile)));
    }

    #[test]
    fn partial_message_survives_until_terminator() {
        let mut reader = LineReader::new();
        let mut messages = Vec::new();
        let mut cursor = Cursor::new(&b"PING"[..]);
        reader.fill(&mut cursor, |m| messages.push(m.to_vec())).unwrap();
        assert!(messages.is_empty());
        let mut cursor = Cursor::new(&b" :x\r\n"[..]);
        reader.fill(&mut cursor, |m| messages.push(m.to_vec())).unwrap();
        assert_eq!(messages, vec![b"PING :x".to_vec()]);
    }
}
