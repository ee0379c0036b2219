//! Error types for executing a single request/response cycle.

use super::{
	SerialDeviceInUseOrDisconnectedError, ShortWriteError, TimeoutError, TransportError,
};

/// What a device reported when it refused a command.
///
/// Binary devices report a numeric code while ASCII devices report a reason
/// word. Host-side failures never use this type, so a device code can never be
/// confused with one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
	/// A Binary error code (the byte following the `255` sentinel).
	Code(u8),
	/// An ASCII rejection reason, e.g. `BADDATA`.
	Reason(Box<str>),
}

/// The ASCII warning flag of a driver that disabled itself.
const DRIVER_DISABLED_FLAG: &str = "FD";
/// The ASCII warning flag of a device without a reference position.
const NO_REFERENCE_FLAG: &str = "WR";
/// The ASCII rejection reason of a command sent to a disabled driver.
const DRIVER_DISABLED_REASON: &str = "DRIVERDISABLED";
/// The ASCII warning field when no warning is active.
const NO_WARNING: &str = "--";

/// The device rejected a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
	fault: DeviceFault,
	/// The ASCII warning flag reported with the rejection, if any
	warning: Option<Box<str>>,
}

impl DeviceError {
	/// Create an error from a Binary error code.
	pub(crate) const fn from_code(code: u8) -> Self {
		DeviceError {
			fault: DeviceFault::Code(code),
			warning: None,
		}
	}

	/// Create an error from an ASCII rejection and the warning flag that came
	/// with it.
	pub(crate) fn from_rejection(reason: &str, warning: &str) -> Self {
		DeviceError {
			fault: DeviceFault::Reason(reason.into()),
			warning: (warning != NO_WARNING).then(|| warning.into()),
		}
	}

	/// Get the reported fault.
	pub fn fault(&self) -> &DeviceFault {
		&self.fault
	}

	/// Get the Binary error code, if the fault has one.
	pub fn code(&self) -> Option<u8> {
		match self.fault {
			DeviceFault::Code(code) => Some(code),
			DeviceFault::Reason(_) => None,
		}
	}

	/// Get the name of the fault.
	///
	/// If a Binary error code is not recognized, `None` is returned.
	pub fn name(&self) -> Option<&str> {
		match &self.fault {
			DeviceFault::Code(code) => device_code::name(*code),
			DeviceFault::Reason(reason) => Some(reason),
		}
	}

	/// Get the ASCII warning flag reported with the rejection, if any.
	pub fn warning(&self) -> Option<&str> {
		self.warning.as_deref()
	}

	/// Get a sentence describing the fault to the person at the microscope.
	pub fn user_message(&self) -> &'static str {
		if self.is_driver_disabled() {
			"The driver has disabled itself due to overheating."
		} else if self.warning() == Some(NO_REFERENCE_FLAG) {
			"The device has not had a reference position established."
		} else {
			"The device rejected the command."
		}
	}

	/// Whether the device's driver has disabled itself.
	pub fn is_driver_disabled(&self) -> bool {
		self.warning() == Some(DRIVER_DISABLED_FLAG)
			|| match &self.fault {
				DeviceFault::Code(code) => *code == device_code::TEMPERATURE_HIGH,
				DeviceFault::Reason(reason) => &**reason == DRIVER_DISABLED_REASON,
			}
	}
}

impl std::error::Error for DeviceError {}

impl std::fmt::Display for DeviceError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.fault {
			DeviceFault::Code(code) => write!(
				f,
				"device rejected command: [{}] {}",
				code,
				device_code::name(*code).unwrap_or("<Unknown error code>")
			)?,
			DeviceFault::Reason(reason) => write!(f, "device rejected command: {reason}")?,
		}
		if let Some(warning) = self.warning() {
			write!(f, " (warning {warning})")?;
		}
		Ok(())
	}
}

/// A response was received but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramingError {
	frame: Box<[u8]>,
	expected: Option<usize>,
}

impl FramingError {
	/// Create a new error.
	///
	/// `expected` is the required frame length for fixed-length protocols.
	pub(crate) fn new(frame: &[u8], expected: Option<usize>) -> Self {
		FramingError {
			frame: frame.into(),
			expected,
		}
	}

	/// The offending bytes.
	pub fn frame(&self) -> &[u8] {
		&self.frame
	}

	/// The length a frame must have, for fixed-length protocols.
	pub fn expected_len(&self) -> Option<usize> {
		self.expected
	}
}

impl std::error::Error for FramingError {}

impl std::fmt::Display for FramingError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if let Some(expected) = self.expected {
			write!(
				f,
				"malformed response length: expected {expected} bytes but received {}: {:?}",
				self.frame.len(),
				self.frame
			)
		} else {
			write!(
				f,
				"malformed response: {:?}",
				String::from_utf8_lossy(&self.frame)
			)
		}
	}
}

/// A setting could not be applied.
///
/// The underlying cause (including any device error code) is deliberately not
/// preserved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SettingFailedError {
	setting: &'static str,
}

impl SettingFailedError {
	/// Create a new error.
	pub(crate) const fn new(setting: &'static str) -> Self {
		SettingFailedError { setting }
	}

	/// The name of the setting that could not be applied.
	pub const fn setting(&self) -> &'static str {
		self.setting
	}
}

impl_error_display! {
	SettingFailedError,
	self => "setting `{}` could not be applied; is the value in the valid range?",
	self.setting
}

/// A setting name is not in the setting registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownSettingError(Box<str>);

impl UnknownSettingError {
	/// Create a new error.
	pub(crate) fn new(name: &str) -> Self {
		UnknownSettingError(name.into())
	}

	/// The unrecognized name.
	pub fn name(&self) -> &str {
		&self.0
	}
}

impl_error_display! {
	UnknownSettingError,
	self => "unknown setting `{}`", self.0
}

error_enum! {
	/// Any error returned by the [`dispatch`](crate::dispatch) module.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum DispatchError {
		SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
		Io(std::io::Error),
		ShortWrite(ShortWriteError),
		Timeout(TimeoutError),
		Framing(FramingError),
		Device(DeviceError),
		SettingFailed(SettingFailedError),
		UnknownSetting(UnknownSettingError),
	}

	impl From<TransportError> {
		ShortWrite => ShortWrite,
		Io => Io,
		Timeout => Timeout,
	}
}
impl_is_timeout! { DispatchError }
impl_from_serialport_error! { DispatchError }

impl DispatchError {
	/// A convenience function for determining if the device rejected the command.
	pub fn is_device_error(&self) -> bool {
		matches!(self, DispatchError::Device(_))
	}
}

macro_rules! define_device_codes {
	// Entry point.
	//
	// Serves to concatenate the parts of the name before defining the constants.
	(
		$(
			$num:literal: $($name_word:ident)+
		),+
		$(,)?
	) => {
		paste::paste! {
			define_device_codes!{@with_concatenated_name
				$(
					$num: $($name_word)+, [< $($name_word:camel)+ >]
				 ),+
			}
		}
	};
	(@with_concatenated_name
		$(
			$num:literal: $($name_word:ident)+, $name:ident
		),+
	) => {
		paste::paste! {
			pub mod device_code {
				//! Error codes reported by Binary devices after the `255` sentinel.
				//!
				//! The codes in numerical order are:
				#![doc =
				$( "* `" $num "`: [`" $name:snake:upper "`]\n\n" )+
				]

				$(
					#[doc = $(" " $name_word " ")+ "(code `" $num "`)." ]
					pub const [< $name:snake:upper >] : u8 = $num;
				)+

				/// Get the name of an error code.
				///
				/// If the error code is not recognized, `None` is returned.
				/// The contents of the returned string may change.
				pub const fn name(code: u8) -> Option<&'static str> {
					match code {
						$(
							$num => Some(stringify!($($name_word)+)),
						)+
						_ => None,
					}
				}
			}
		}
	};
}

define_device_codes! {
	1: Cannot Home,
	2: Device Number Invalid,
	14: Voltage Low,
	15: Voltage High,
	18: Stored Position Invalid,
	20: Absolute Position Invalid,
	21: Relative Position Invalid,
	22: Velocity Invalid,
	37: Resolution Invalid,
	38: Run Current Invalid,
	39: Hold Current Invalid,
	41: Home Speed Invalid,
	42: Speed Invalid,
	43: Acceleration Invalid,
	44: Maximum Position Invalid,
	45: Current Position Invalid,
	53: Setting Invalid,
	64: Command Invalid,
	65: Park State Invalid,
	67: Temperature High,
	106: Minimum Position Invalid,
	255: Busy,
}
