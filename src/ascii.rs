//! Zaber's [ASCII protocol](https://www.zaber.com/protocol-manual?protocol=ASCII).
//!
//! Requests are single lines of text, `/{device} {axis} {command}`, optionally
//! followed by a `:XX` checksum, and terminated by a newline. Replies take the
//! form
//!
//! ```text
//! @01 1 OK IDLE -- 1000
//! ```
//!
//! where the fields are the device address, the axis number, the reply flag
//! (`OK` or `RJ`), the device status, the highest priority warning and the data.
//! A trailing `:XX` checksum, when present, is verified and stripped before the
//! reply is tokenized.
//!
//! Unlike Binary, ASCII devices reply to a move as soon as it starts, so no
//! post-send delay is ever applied.
//!
//! ```
//! use zstage::{
//!     ascii::Ascii,
//!     protocol::{Instruction, Motion, Protocol, Request},
//! };
//!
//! let request = Request::new(1, 1, Instruction::Move(Motion::Absolute, 1000));
//! assert_eq!(Ascii::default().encode(&request), b"/1 1 move abs 1000\n");
//! assert_eq!(Ascii::default().decode(b"@01 1 OK BUSY -- 0\r\n").unwrap(), 0);
//! ```

mod checksum;

use crate::{
	error::{DeviceError, DispatchError, FramingError},
	protocol::{Instruction, Motion, Protocol, Request},
};
use checksum::Lrc;

/// The reply flag of a rejected command.
const REJECTED: &str = "RJ";
/// The reply flag of an accepted command.
const ACCEPTED: &str = "OK";
/// The data field of a reply that carries no data.
const NO_DATA: &str = "--";
/// The first byte of a reply.
const REPLY_MARKER: u8 = b'@';
/// The first byte of an info message, which continues a reply.
const INFO_MARKER: u8 = b'#';
/// The first byte of an unsolicited alert.
const ALERT_MARKER: u8 = b'!';

/// The ASCII protocol engine.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Ascii {
	/// Whether requests carry a checksum
	checksums: bool,
}

impl Ascii {
	/// Create an engine that appends a checksum to every request.
	pub const fn with_checksums() -> Self {
		Ascii { checksums: true }
	}

	/// Whether requests carry a checksum.
	pub const fn checksums(&self) -> bool {
		self.checksums
	}

	/// Write the command portion of a request.
	fn write_body(out: &mut String, instruction: &Instruction) {
		match instruction {
			Instruction::Home => out.push_str("home"),
			Instruction::Stop => out.push_str("stop"),
			Instruction::Identify => out.push_str("get deviceid"),
			Instruction::Move(motion, value) => {
				let kind = match motion {
					Motion::Absolute => "abs",
					Motion::Relative => "rel",
					Motion::Velocity => "vel",
				};
				out.push_str(&format!("move {kind} {value}"));
			}
			Instruction::Get(setting) => out.push_str(&format!("get {}", setting.name())),
			Instruction::Set(setting, value) => {
				out.push_str(&format!("set {} {}", setting.name(), value));
			}
		}
	}
}

/// Split a `:XX` checksum off the end of a message, verifying it if present.
///
/// `message` excludes the leading `@` and the line terminator.
fn strip_checksum(message: &[u8]) -> Result<&[u8], ()> {
	let len = message.len();
	if len < 3 || message[len - 3] != b':' {
		return Ok(message);
	}
	let body = &message[..len - 3];
	let hash = std::str::from_utf8(&message[len - 2..])
		.ok()
		.and_then(|hex| u8::from_str_radix(hex, 16).ok())
		.ok_or(())?;
	if Lrc::verify(body, hash) {
		Ok(body)
	} else {
		Err(())
	}
}

impl Protocol for Ascii {
	const REPLIES_AFTER_MOTION: bool = false;
	const DEFAULT_BAUD_RATE: u32 = 115_200;

	fn encode(&self, request: &Request) -> Vec<u8> {
		let mut body = format!("{} {} ", request.device, request.axis);
		Ascii::write_body(&mut body, &request.instruction);
		let mut line = String::with_capacity(body.len() + 5);
		line.push('/');
		line.push_str(&body);
		if self.checksums {
			line.push_str(&format!(":{:02X}", Lrc::hash(body.as_bytes())));
		}
		line.push('\n');
		line.into_bytes()
	}

	fn frame_len(&self, buffer: &[u8]) -> Option<usize> {
		buffer
			.iter()
			.position(|byte| *byte == b'\n')
			.map(|i| i + 1)
	}

	fn decode(&self, frame: &[u8]) -> Result<i32, DispatchError> {
		let malformed = || FramingError::new(frame, None);

		let mut end = frame.len();
		while end > 0 && matches!(frame[end - 1], b'\r' | b'\n') {
			end -= 1;
		}
		let message = match frame[..end].split_first() {
			Some((&REPLY_MARKER, rest)) => rest,
			_ => return Err(malformed().into()),
		};
		let message = strip_checksum(message).map_err(|_| malformed())?;
		let message = std::str::from_utf8(message).map_err(|_| malformed())?;

		let mut tokens = message.split_ascii_whitespace();
		// Address and axis.
		tokens.next().ok_or_else(malformed)?;
		tokens.next().ok_or_else(malformed)?;
		let flag = tokens.next().ok_or_else(malformed)?;
		// Status.
		tokens.next().ok_or_else(malformed)?;
		let warning = tokens.next().ok_or_else(malformed)?;
		let data = tokens.next().ok_or_else(malformed)?;

		match flag {
			REJECTED => Err(DeviceError::from_rejection(data, warning).into()),
			ACCEPTED if data == NO_DATA => Ok(0),
			ACCEPTED => data.parse::<i32>().map_err(|_| malformed().into()),
			_ => Err(malformed().into()),
		}
	}

	fn is_reply(&self, request: &Request, frame: &[u8]) -> bool {
		match frame.split_first() {
			Some((&INFO_MARKER | &ALERT_MARKER, _)) => false,
			Some((&REPLY_MARKER, rest)) => {
				let address = rest
					.split(u8::is_ascii_whitespace)
					.next()
					.and_then(|address| std::str::from_utf8(address).ok())
					.and_then(|address| address.parse::<u8>().ok());
				match address {
					Some(address) => request.device == 0 || address == request.device,
					None => true,
				}
			}
			_ => true,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::setting::{self, SETTINGS};

	fn encode(protocol: Ascii, instruction: Instruction) -> String {
		String::from_utf8(protocol.encode(&Request::new(2, 1, instruction))).unwrap()
	}

	#[test]
	fn encode_instructions() {
		let ascii = Ascii::default();
		let pos = SETTINGS.get(setting::POSITION).unwrap();
		let speed = SETTINGS.get(setting::MAX_SPEED).unwrap();
		assert_eq!(encode(ascii, Instruction::Home), "/2 1 home\n");
		assert_eq!(encode(ascii, Instruction::Stop), "/2 1 stop\n");
		assert_eq!(encode(ascii, Instruction::Identify), "/2 1 get deviceid\n");
		assert_eq!(
			encode(ascii, Instruction::Move(Motion::Relative, -64)),
			"/2 1 move rel -64\n"
		);
		assert_eq!(
			encode(ascii, Instruction::Move(Motion::Velocity, 5000)),
			"/2 1 move vel 5000\n"
		);
		assert_eq!(encode(ascii, Instruction::Get(pos)), "/2 1 get pos\n");
		assert_eq!(
			encode(ascii, Instruction::Set(speed, 10_000)),
			"/2 1 set maxspeed 10000\n"
		);
	}

	#[test]
	fn encode_with_checksum() {
		let line = encode(Ascii::with_checksums(), Instruction::Home);
		let (body, hash) = line
			.strip_prefix('/')
			.and_then(|line| line.strip_suffix('\n'))
			.and_then(|line| line.split_once(':'))
			.unwrap();
		assert_eq!(body, "2 1 home");
		assert!(Lrc::verify(body.as_bytes(), u8::from_str_radix(hash, 16).unwrap()));
	}

	#[test]
	fn decode_data() {
		let ascii = Ascii::default();
		assert_eq!(ascii.decode(b"@01 1 OK IDLE -- 1000\r\n").unwrap(), 1000);
		assert_eq!(ascii.decode(b"@01 1 OK IDLE -- -25\n").unwrap(), -25);
		assert_eq!(ascii.decode(b"@01 0 OK IDLE -- 50081").unwrap(), 50081);
	}

	#[test]
	fn decode_without_data_is_zero() {
		assert_eq!(Ascii::default().decode(b"@01 1 OK BUSY -- --\r\n").unwrap(), 0);
	}

	#[test]
	fn decode_rejection() {
		let err = Ascii::default()
			.decode(b"@01 1 RJ IDLE -- BADDATA\r\n")
			.unwrap_err();
		if let DispatchError::Device(ref e) = err {
			assert_eq!(e.name(), Some("BADDATA"));
			assert_eq!(e.code(), None);
			assert_eq!(e.warning(), None);
		} else {
			panic!("unexpected error {err:?}");
		}

		let err = Ascii::default()
			.decode(b"@01 1 RJ IDLE WR BADDATA\r\n")
			.unwrap_err();
		if let DispatchError::Device(ref e) = err {
			assert_eq!(e.warning(), Some("WR"));
		} else {
			panic!("unexpected error {err:?}");
		}
	}

	#[test]
	fn decode_verifies_checksum() {
		let body = b"01 1 OK IDLE -- 1000";
		let good = format!("@01 1 OK IDLE -- 1000:{:02X}\r\n", Lrc::hash(body));
		assert_eq!(Ascii::default().decode(good.as_bytes()).unwrap(), 1000);

		let bad = format!(
			"@01 1 OK IDLE -- 1000:{:02X}\r\n",
			Lrc::hash(body).wrapping_add(1)
		);
		let err = Ascii::default().decode(bad.as_bytes()).unwrap_err();
		assert!(matches!(err, DispatchError::Framing(_)));
	}

	#[test]
	fn decode_malformed() {
		let ascii = Ascii::default();
		for frame in [
			&b"01 1 OK IDLE -- 0\r\n"[..],
			b"@01 1 OK IDLE\r\n",
			b"@01 1 MAYBE IDLE -- 0\r\n",
			b"@01 1 OK IDLE -- lots\r\n",
			b"",
		] {
			let err = ascii.decode(frame).unwrap_err();
			assert!(
				matches!(err, DispatchError::Framing(_)),
				"frame {frame:?}: {err:?}"
			);
		}
	}

	#[test]
	fn only_replies_from_the_addressed_device_match() {
		let ascii = Ascii::default();
		let request = Request::new(1, 1, Instruction::Stop);
		assert!(ascii.is_reply(&request, b"@01 1 OK IDLE -- 0\r\n"));
		assert!(!ascii.is_reply(&request, b"@02 1 OK IDLE -- 0\r\n"));
		assert!(!ascii.is_reply(&request, b"!01 1 IDLE --\r\n"));
		assert!(!ascii.is_reply(&request, b"#01 1 some info\r\n"));
		// Left for decode to reject.
		assert!(ascii.is_reply(&request, b"garbage\r\n"));

		let everyone = Request::new(0, 0, Instruction::Identify);
		assert!(ascii.is_reply(&everyone, b"@07 0 OK IDLE -- 50081\r\n"));
	}

	#[test]
	fn frame_len_ends_at_newline() {
		let ascii = Ascii::default();
		assert_eq!(ascii.frame_len(b"@01 1 OK"), None);
		assert_eq!(ascii.frame_len(b"@01 1 OK IDLE -- 0\r\n"), Some(20));
		assert_eq!(ascii.frame_len(b"@01 1 OK IDLE -- 0\r\n@02"), Some(20));
	}
}
