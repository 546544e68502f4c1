pub mod codec;
pub mod negotiate;
pub mod origin;

use std::fmt;

pub use codec::{CodecError, FrameCodec};
pub use negotiate::Negotiation;
pub use origin::OriginPolicy;

/// Lifecycle of one upgraded connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Negotiating,
    Streaming,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
