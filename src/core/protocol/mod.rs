// src/core/protocol/mod.rs

pub mod command;
pub mod resp_frame;
pub use command::Cmd;
pub use resp_frame::{RespFrame, RespFrameCodec};
