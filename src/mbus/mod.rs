//! # M-Bus Long-Frame Synchronization
//!
//! Wired M-Bus side of the bridge: a stateful framer that picks complete
//! EN 13757-2 long frames out of an arbitrary byte stream. Smart meters
//! push their DLMS notifications unsolicited over this link, so the framer
//! has to tolerate noise, gaps, and partially seen frames at any point.

pub mod framer;

pub use framer::MbusFramer;
