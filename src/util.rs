//! Integer encodings shared by the codecs.

pub mod block_packed;
pub mod packed;
pub mod varint;
