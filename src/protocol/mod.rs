//! Native-messaging protocol: framing and message codec.

mod error;
mod framing;
mod message;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameReader, FrameWriter, MAX_FRAME_LEN, PREFIX_LEN};
pub use message::{
    MSG_DIRECTORY_SELECT, MSG_RELOAD, MSG_START, MSG_STOP, MSG_STOP_ALL, MSG_VERSION, Request,
    Response, StartRequest,
};
