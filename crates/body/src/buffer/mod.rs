//! Request body buffering.
//!
//! - [`WriteBuffer`]: the segmented copy of a request body kept for resubmission
//! - [`SplitWrites`]: batches a list of slices for vectored writes

mod split_writes;
mod write_buffer;

pub use split_writes::{SPLIT_WRITE_SIZE, SplitWrites};
pub use write_buffer::{SEGMENT_SIZE, WriteBuffer};
