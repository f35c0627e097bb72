//! Ferry: bidirectional file-transfer client for a framed sync protocol
//!
//! A session speaks length-prefixed request/response messages over one
//! duplex byte stream to a remote filesystem service. Four user-level
//! operations sit on top: list, push, pull, and push-with-skip.

pub mod codec;
pub mod commands;
pub mod framing;
pub mod fsio;
pub mod log;
pub mod printer;
pub mod protocol;
pub mod pull;
pub mod push;
pub mod session;
pub mod transport;
pub mod walk;
