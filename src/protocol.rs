//! The wire protocols a link can speak.
//!
//! A [`Protocol`] turns a semantic [`Request`] into bytes, decides when enough
//! bytes have arrived to form a response, and decodes that response into
//! either the reply data or a device-reported fault. Two engines exist:
//! [`Binary`](crate::binary::Binary) and, with the `ascii` feature,
//! [`Ascii`](crate::ascii::Ascii). The engine is picked when a link is opened.

use crate::{error::DispatchError, setting::Setting};

/// The kind of move to perform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Motion {
	/// Move to an absolute position, in steps.
	Absolute,
	/// Move by a signed distance, in steps.
	Relative,
	/// Move at a constant signed speed, in device speed units.
	Velocity,
}

/// What a request asks the device to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
	/// Move to the home position.
	Home,
	/// Stop any motion.
	Stop,
	/// Report the device's id.
	Identify,
	/// Start a move.
	Move(Motion, i32),
	/// Read a setting.
	Get(Setting),
	/// Change a setting.
	Set(Setting, i32),
}

/// A single request addressed to one device and axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Request {
	/// The device address (0 addresses all devices).
	pub device: u8,
	/// The axis number. Protocols that address axes as devices ignore it.
	pub axis: u8,
	/// What to do.
	pub instruction: Instruction,
}

impl Request {
	/// Create a new request.
	pub const fn new(device: u8, axis: u8, instruction: Instruction) -> Self {
		Request {
			device,
			axis,
			instruction,
		}
	}
}

/// A wire protocol engine.
pub trait Protocol: private::Sealed {
	/// Whether the device withholds its reply to a move until the move is done.
	///
	/// When it does, the dispatcher sleeps before reading the reply to a long
	/// move (see [`timing`](crate::timing)).
	const REPLIES_AFTER_MOTION: bool;

	/// The baud rate devices use for this protocol out of the box.
	const DEFAULT_BAUD_RATE: u32;

	/// Encode a request into the bytes to transmit.
	fn encode(&self, request: &Request) -> Vec<u8>;

	/// Get the length of the complete response at the start of `buffer`, if
	/// one has fully arrived.
	fn frame_len(&self, buffer: &[u8]) -> Option<usize>;

	/// Decode a complete response into its signed data value.
	///
	/// A device-reported fault is returned as [`DispatchError::Device`] and an
	/// undecodable response as [`DispatchError::Framing`].
	fn decode(&self, frame: &[u8]) -> Result<i32, DispatchError>;

	/// Whether the complete `frame` answers `request`.
	///
	/// Frames that do not, such as a late reply to an earlier request or an
	/// unsolicited message, are dropped while the response is awaited. Frames
	/// too malformed to tell are accepted so that [`decode`](Protocol::decode)
	/// can report them.
	fn is_reply(&self, request: &Request, frame: &[u8]) -> bool;
}

mod private {
	pub trait Sealed {}

	impl Sealed for crate::binary::Binary {}
	#[cfg(feature = "ascii")]
	impl Sealed for crate::ascii::Ascii {}
}
