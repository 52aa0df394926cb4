//! MAVLink framing: checksum and byte-stream frame extraction

pub mod crc;
mod parser;

pub use parser::FrameParser;
