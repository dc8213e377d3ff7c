// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

pub mod command;
pub mod direct;

pub use command::CommandEngine;
pub use direct::DirectTcpTransport;
