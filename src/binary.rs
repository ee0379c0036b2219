//! Zaber's [Binary protocol](https://www.zaber.com/protocol-manual?protocol=Binary).
//!
//! Every message, in both directions, is exactly six bytes:
//!
//! | byte | meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | device address (0 addresses all devices)              |
//! | 1    | command code (see [`command`])                        |
//! | 2..6 | signed 32-bit data, least-significant byte first      |
//!
//! There is no terminator or checksum, so framing is purely by length. A reply
//! whose command code is [`ERROR`](command::ERROR) (`255`) reports a failure,
//! and byte 2 then holds the device's error code.
//!
//! ```
//! use zstage::binary::{self, command};
//!
//! let frame = binary::encode(1, command::MOVE_ABSOLUTE, -2);
//! assert_eq!(frame, [1, 20, 254, 255, 255, 255]);
//! assert_eq!(binary::decode(&frame).value(), Some(-2));
//! ```

pub mod command;

use crate::{
	error::{DeviceError, DispatchError, FramingError},
	protocol::{Instruction, Motion, Protocol, Request},
};

/// The length of every Binary message.
pub const FRAME_LEN: usize = 6;

/// A raw Binary message.
pub type Frame = [u8; FRAME_LEN];

/// 2^32, added to negative data to produce its unsigned wire representation.
const WRAP: i64 = 1 << 32;

/// Encode a command frame.
///
/// `data` is clamped to the signed 32-bit range. Negative values are carried
/// on the wire as `data + 2^32`.
pub fn encode(device: u8, command: u8, data: i64) -> Frame {
	let mut unsigned = data.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
	if unsigned < 0 {
		unsigned += WRAP;
	}
	let mut frame = [device, command, 0, 0, 0, 0];
	for (i, byte) in frame[2..].iter_mut().enumerate() {
		*byte = ((unsigned >> (8 * i)) & 0xFF) as u8;
	}
	frame
}

/// Whether `frame` answers command `code` sent to `device`.
///
/// A reply must come from the addressed device (any device may answer address
/// 0) and carry either the same command code, [`ERROR`](command::ERROR), or
/// the generic code 0. Frames that are not six bytes long are accepted so that
/// decoding reports them.
pub fn is_reply_to(device: u8, code: u8, frame: &[u8]) -> bool {
	if frame.len() != FRAME_LEN {
		return true;
	}
	let reply_code = frame[1];
	(device == 0 || frame[0] == device)
		&& (reply_code == code || reply_code == command::ERROR || reply_code == 0)
}

/// Decode a response frame.
///
/// This never fails: any six bytes form a message, and whether it carries data
/// or an error code is left to [`DeviceMessage::reply`].
pub const fn decode(frame: &Frame) -> DeviceMessage {
	DeviceMessage::from_bytes(frame)
}

/// A Binary message received from a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceMessage {
	/// The replying device
	target: u8,
	/// The command code
	command: u8,
	/// The command data
	data: [u8; 4],
}

impl DeviceMessage {
	/// Parse an array of 6 bytes into a [`DeviceMessage`].
	pub const fn from_bytes(bytes: &Frame) -> DeviceMessage {
		DeviceMessage {
			target: bytes[0],
			command: bytes[1],
			data: [bytes[2], bytes[3], bytes[4], bytes[5]],
		}
	}

	/// Get the message target.
	pub const fn target(&self) -> u8 {
		self.target
	}

	/// Get the message command code.
	pub const fn command(&self) -> u8 {
		self.command
	}

	/// Get the raw message data without decoding it.
	pub const fn raw_data(&self) -> [u8; 4] {
		self.data
	}

	/// Whether the device reported an error.
	pub const fn is_error(&self) -> bool {
		self.command == command::ERROR
	}

	/// Get the error code, if the device reported an error.
	pub const fn error_code(&self) -> Option<u8> {
		if self.is_error() {
			Some(self.data[0])
		} else {
			None
		}
	}

	/// Get the signed data, unless the device reported an error.
	pub fn value(&self) -> Option<i32> {
		if self.is_error() {
			return None;
		}
		let unsigned = self
			.data
			.iter()
			.rev()
			.fold(0i64, |acc, byte| (acc << 8) | i64::from(*byte));
		let signed = if unsigned > i64::from(i32::MAX) {
			unsigned - WRAP
		} else {
			unsigned
		};
		// Four bytes always land back in range once the wrap is removed.
		Some(signed as i32)
	}

	/// Get the signed data or, if the device reported an error, its error code.
	pub fn reply(&self) -> Result<i32, u8> {
		match self.error_code() {
			Some(code) => Err(code),
			None => Ok(self.value().unwrap_or_default()),
		}
	}
}

impl std::fmt::Display for DeviceMessage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"[{}, {}, {}]",
			self.target,
			self.command,
			i32::from_le_bytes(self.data)
		)
	}
}

/// The Binary protocol engine.
///
/// Axes are addressed as separate device numbers in this protocol, so a
/// [`Request`]'s axis is ignored. Devices only reply to a move once it has
/// finished.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Binary;

impl Binary {
	/// Get the command code for an instruction.
	pub const fn command(instruction: &Instruction) -> u8 {
		match instruction {
			Instruction::Home => command::HOME,
			Instruction::Stop => command::STOP,
			Instruction::Identify => command::RETURN_DEVICE_ID,
			Instruction::Move(Motion::Absolute, _) => command::MOVE_ABSOLUTE,
			Instruction::Move(Motion::Relative, _) => command::MOVE_RELATIVE,
			Instruction::Move(Motion::Velocity, _) => command::MOVE_AT_CONSTANT_SPEED,
			Instruction::Get(setting) | Instruction::Set(setting, _) => setting.command(),
		}
	}

	/// Get the data for an instruction.
	pub const fn data(instruction: &Instruction) -> i32 {
		match instruction {
			Instruction::Home | Instruction::Stop | Instruction::Identify | Instruction::Get(_) => {
				0
			}
			Instruction::Move(_, data) | Instruction::Set(_, data) => *data,
		}
	}
}

impl Protocol for Binary {
	const REPLIES_AFTER_MOTION: bool = true;
	const DEFAULT_BAUD_RATE: u32 = 9_600;

	fn encode(&self, request: &Request) -> Vec<u8> {
		let instruction = &request.instruction;
		encode(
			request.device,
			Binary::command(instruction),
			i64::from(Binary::data(instruction)),
		)
		.to_vec()
	}

	fn frame_len(&self, buffer: &[u8]) -> Option<usize> {
		(buffer.len() >= FRAME_LEN).then_some(FRAME_LEN)
	}

	fn decode(&self, frame: &[u8]) -> Result<i32, DispatchError> {
		let frame: &Frame = frame
			.try_into()
			.map_err(|_| FramingError::new(frame, Some(FRAME_LEN)))?;
		decode(frame)
			.reply()
			.map_err(|code| DeviceError::from_code(code).into())
	}

	fn is_reply(&self, request: &Request, frame: &[u8]) -> bool {
		is_reply_to(request.device, Binary::command(&request.instruction), frame)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::setting::{self, SETTINGS};

	#[test]
	fn replies_match_device_and_command() {
		assert!(is_reply_to(1, command::HOME, &[1, 1, 0, 0, 0, 0]));
		assert!(is_reply_to(1, command::HOME, &[1, 255, 2, 0, 0, 0]));
		assert!(is_reply_to(1, 45, &[1, 0, 100, 0, 0, 0]));
		// Another command's late reply.
		assert!(!is_reply_to(1, 45, &[1, 1, 0, 0, 0, 0]));
		// Another device.
		assert!(!is_reply_to(1, 45, &[2, 45, 0, 0, 0, 0]));
		// Every device answers address 0.
		assert!(is_reply_to(0, command::RENUMBER, &[3, 2, 3, 0, 0, 0]));
		// Left for decode to reject.
		assert!(is_reply_to(1, 45, &[9, 9]));

		let request = Request::new(2, 1, Instruction::Stop);
		assert!(Binary.is_reply(&request, &[2, command::STOP, 0, 1, 0, 0]));
		assert!(!Binary.is_reply(&request, &[2, command::MOVE_ABSOLUTE, 0, 1, 0, 0]));
	}

	#[test]
	fn encode_positive_little_endian() {
		assert_eq!(encode(1, 20, 0x0102_0304), [1, 20, 4, 3, 2, 1]);
		assert_eq!(encode(0, 1, 0), [0, 1, 0, 0, 0, 0]);
	}

	#[test]
	fn encode_negative_wraps() {
		assert_eq!(encode(1, 21, -1), [1, 21, 255, 255, 255, 255]);
		assert_eq!(encode(1, 21, i64::from(i32::MIN)), [1, 21, 0, 0, 0, 128]);
	}

	#[test]
	fn encode_clamps_out_of_range() {
		assert_eq!(encode(1, 20, i64::MAX), encode(1, 20, i64::from(i32::MAX)));
		assert_eq!(encode(1, 20, i64::MIN), encode(1, 20, i64::from(i32::MIN)));
		assert_eq!(encode(1, 20, 1 << 40), [1, 20, 255, 255, 255, 127]);
	}

	#[test]
	fn decode_inverts_encode() {
		for value in [
			i32::MIN,
			i32::MIN + 1,
			-65_536,
			-256,
			-1,
			0,
			1,
			255,
			256,
			100_000,
			i32::MAX - 1,
			i32::MAX,
		] {
			let frame = encode(3, 60, i64::from(value));
			assert_eq!(decode(&frame).value(), Some(value), "value {value}");
			assert_eq!(decode(&frame).target(), 3);
			assert_eq!(decode(&frame).command(), 60);
		}
	}

	#[test]
	fn decode_error_sentinel() {
		// The data bytes past the error code are never consulted.
		for frame in [[1, 255, 20, 0, 0, 0], [7, 255, 64, 9, 9, 9]] {
			let message = decode(&frame);
			assert!(message.is_error());
			assert_eq!(message.error_code(), Some(frame[2]));
			assert_eq!(message.value(), None);
			assert_eq!(message.reply(), Err(frame[2]));
		}
	}

	#[test]
	fn protocol_encodes_instructions() {
		let pos = SETTINGS.get(setting::POSITION).unwrap();
		let request = Request::new(1, 1, Instruction::Get(pos));
		assert_eq!(Binary.encode(&request), vec![1, 45, 0, 0, 0, 0]);

		let request = Request::new(2, 1, Instruction::Move(Motion::Relative, -5));
		assert_eq!(Binary.encode(&request), vec![2, 21, 251, 255, 255, 255]);

		let request = Request::new(2, 1, Instruction::Stop);
		assert_eq!(Binary.encode(&request), vec![2, 23, 0, 0, 0, 0]);
	}

	#[test]
	fn protocol_decodes_replies() {
		assert_eq!(Binary.decode(&[1, 45, 100, 0, 0, 0]).unwrap(), 100);

		let err = Binary.decode(&[1, 255, 45, 0, 0, 0]).unwrap_err();
		if let DispatchError::Device(err) = err {
			assert_eq!(err.code(), Some(45));
		} else {
			panic!("unexpected error {err:?}");
		}

		let err = Binary.decode(&[1, 45, 100]).unwrap_err();
		if let DispatchError::Framing(err) = err {
			assert_eq!(err.frame(), &[1, 45, 100]);
		} else {
			panic!("unexpected error {err:?}");
		}
	}

	#[test]
	fn frame_len_is_fixed() {
		assert_eq!(Binary.frame_len(&[1, 2, 3, 4, 5]), None);
		assert_eq!(Binary.frame_len(&[1, 2, 3, 4, 5, 6]), Some(6));
		assert_eq!(Binary.frame_len(&[1, 2, 3, 4, 5, 6, 7]), Some(6));
	}

	#[test]
	fn display() {
		let message = decode(&[1, 20, 255, 255, 255, 255]);
		assert_eq!(message.to_string(), "[1, 20, -1]");
	}
}
