//! Framed TCP transport for the control protocol.

pub mod framer;

pub use framer::{read_frame, write_frame, write_response, FrameReader, ReadState};
pub use framer::{MAX_FRAME_BYTES, STATUS_ERROR, STATUS_OK};
