use std::io::{self, ErrorKind};
use std::sync::Arc;

use framechan_transport::Pinned;
use tracing::trace;

use crate::clock::ActivityClock;
use crate::codec::{decode_header, BUFFER_CAPACITY, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// A non-blocking byte source.
///
/// Both methods return `ErrorKind::WouldBlock` when nothing is pending and
/// `Ok(0)` at end of stream.
pub trait FrameSource {
    /// Copy pending bytes into `buf` without consuming them.
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume up to `buf.len()` pending bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether the writer has gone away, so pending bytes are all that is left.
    fn is_hung_up(&mut self) -> io::Result<bool> {
        Ok(false)
    }
}

impl FrameSource for Pinned<'_> {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Pinned::peek(self, buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Pinned::recv(self, buf)
    }

    fn is_hung_up(&mut self) -> io::Result<bool> {
        Pinned::peer_hung_up(self)
    }
}

/// Reassembly progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// No frame in progress; the next call reads a header.
    Idle,
    /// `cursor` of `len` payload bytes received.
    Assembling { len: usize, cursor: usize },
}

/// Reassembles one frame at a time from a non-blocking source.
///
/// The payload lands in a fixed 4096-byte buffer; a frame whose header
/// declares more than [`MAX_PAYLOAD`] bytes is rejected before any payload
/// byte is read.
pub struct FrameReader {
    buf: Box<[u8; BUFFER_CAPACITY]>,
    state: ReadState,
    completed: usize,
    clock: Arc<ActivityClock>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(ActivityClock::new()))
    }

    /// Reader that records header arrivals on a shared clock.
    pub fn with_clock(clock: Arc<ActivityClock>) -> Self {
        Self {
            buf: Box::new([0u8; BUFFER_CAPACITY]),
            state: ReadState::Idle,
            completed: 0,
            clock,
        }
    }

    /// Make as much progress as the source allows without blocking.
    ///
    /// Returns `Ok(Some(len))` when a frame completes; its payload is then
    /// available from [`FrameReader::payload`] until the next call. Returns
    /// `Ok(None)` when more bytes are needed. Errors leave the stream out of
    /// sync; the connection should be dropped.
    pub fn poll_frame<S: FrameSource + ?Sized>(&mut self, src: &mut S) -> Result<Option<usize>> {
        if self.state == ReadState::Idle {
            let Some(len) = self.read_header(src)? else {
                return Ok(None);
            };
            self.completed = 0;
            self.state = ReadState::Assembling { len, cursor: 0 };
            self.clock.touch();
            trace!(payload_len = len, "frame header parsed");
        }

        let ReadState::Assembling { len, mut cursor } = self.state else {
            return Ok(None);
        };

        while cursor < len {
            let requested = len - cursor;
            match src.read(&mut self.buf[cursor..len]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) if n > requested => {
                    return Err(FrameError::InvalidReadLength { got: n, requested })
                }
                Ok(n) => cursor += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.state = ReadState::Assembling { len, cursor };
                    return Ok(None);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.state = ReadState::Idle;
        self.completed = len;
        Ok(Some(len))
    }

    fn read_header<S: FrameSource + ?Sized>(&mut self, src: &mut S) -> Result<Option<usize>> {
        let mut header = [0u8; HEADER_SIZE];
        match peek_header(src, &mut header)? {
            None => return Ok(None),
            Some(n) if n < HEADER_SIZE => {
                if !src.is_hung_up()? {
                    return Ok(None);
                }
                // Bytes sent before the hangup are already buffered.
                if peek_header(src, &mut header)? != Some(HEADER_SIZE) {
                    return Err(FrameError::ConnectionClosed);
                }
            }
            Some(_) => {}
        }

        match src.read(&mut header)? {
            HEADER_SIZE => {}
            got => return Err(FrameError::ShortHeader { got }),
        }

        decode_header(header, MAX_PAYLOAD).map(Some)
    }

    /// Payload of the most recently completed frame.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.completed]
    }

    /// Current reassembly progress.
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// The clock refreshed on every parsed header.
    pub fn clock(&self) -> &Arc<ActivityClock> {
        &self.clock
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = ReadState::Idle;
        self.completed = 0;
    }
}

/// Peek up to a header's worth of bytes; `None` when nothing is pending.
fn peek_header<S: FrameSource + ?Sized>(
    src: &mut S,
    header: &mut [u8; HEADER_SIZE],
) -> Result<Option<usize>> {
    match src.peek(header) {
        Ok(0) => Err(FrameError::ConnectionClosed),
        Ok(n) => Ok(Some(n)),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(err) => Err(FrameError::Io(err)),
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("state", &self.state)
            .field("completed", &self.completed)
            .finish()
    }
}
