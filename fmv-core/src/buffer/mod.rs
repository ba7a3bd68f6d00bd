//! Frame boundary buffering and rollover policy.

mod packet_buffer;
mod rollover;

pub use packet_buffer::{
    BufferConfig, BufferStats, PacketBuffer, DEFAULT_MAX_FRAMESET_SIZE,
    DEFAULT_MAX_INCOMPLETE_FRAME_BYTES,
};
pub use rollover::{RolloverCondition, RolloverState, RolloverVisitor, BYTES_PER_MEGABYTE};
