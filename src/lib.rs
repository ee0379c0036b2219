//! A driver for Zaber linear-motion stages, built for microscope-automation
//! hosts.
//!
//! The host's generic "stage" operations (move, home, get position, stop,
//! query limits) are translated into Zaber's wire protocols. Both the
//! fixed-length [`binary`] protocol and the text-based [`ascii`] protocol are
//! supported as interchangeable [`Protocol`](protocol::Protocol) engines,
//! selected when a link is opened.
//!
//! The layers, from the wire up:
//!   * [`backend`]: the raw byte channel (serial port, TCP stream or a mock),
//!   * [`transport`]: writes whole frames and reassembles responses within a deadline,
//!   * [`dispatch`]: executes one request/response cycle per semantic operation,
//!   * [`timing`]: the post-send sleep heuristic for long moves,
//!   * [`stage`]: the host-facing façade working in physical units.

#![deny(rustdoc::missing_crate_level_docs)]
#![cfg_attr(all(doc, feature = "doc_cfg"), feature(doc_cfg))]

#[cfg(feature = "ascii")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "ascii")))]
pub mod ascii;
pub mod backend;
pub mod binary;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod setting;
pub mod stage;
pub mod timing;
pub mod transport;
pub mod units;
