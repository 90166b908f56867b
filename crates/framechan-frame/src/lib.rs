//! Length-prefixed framing for framechan.
//!
//! Every frame is a 4-byte little-endian length that counts itself, followed
//! by an opaque payload. The reader reassembles frames from a non-blocking
//! socket one call at a time; the writer sends each frame as a single
//! scatter-gather message so concurrent writers never interleave bytes.

pub mod clock;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use clock::ActivityClock;
pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, BUFFER_CAPACITY, HEADER_SIZE,
    MAX_ENCODABLE_PAYLOAD, MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use reader::{FrameReader, FrameSource, ReadState};
pub use writer::{write_frame, FrameSink};
