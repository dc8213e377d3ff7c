// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

//! Binary protocol layer: frame codec, record decoder and command encoder.

pub mod frame;
pub mod param;
pub mod reader;
pub mod result;

pub use frame::{Decoded, Frame, FrameCodec, decode_frame, encode_frame, encode_heartbeat};
pub use param::Param;
pub use result::{GatewayResult, ResultBody, StatusRecord, decode_result};
