use std::io::{self, IoSlice};

use framechan_transport::Pinned;

use crate::codec::{encode_header, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// A destination that accepts one scatter-gather message per call.
pub trait FrameSink {
    /// Transmit `bufs` back to back as one message; returns the byte count accepted.
    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;
}

impl FrameSink for Pinned<'_> {
    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        Pinned::send_vectored(self, bufs)
    }
}

/// Send one frame: length field and payload in a single call.
///
/// Partial transmission is reported as [`FrameError::ShortWrite`] and not
/// retried; a retry would interleave with other writers on the same socket.
pub fn write_frame<S: FrameSink + ?Sized>(sink: &mut S, payload: &[u8]) -> Result<()> {
    let header = encode_header(payload.len())?;
    let expected = HEADER_SIZE + payload.len();

    let sent = sink.send_vectored(&[IoSlice::new(&header), IoSlice::new(payload)])?;
    if sent != expected {
        return Err(FrameError::ShortWrite { sent, expected });
    }
    Ok(())
}
