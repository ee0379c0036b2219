//! Error types for the host-facing stage façade.

use super::{
	DeviceError, DispatchError, FramingError, SerialDeviceInUseOrDisconnectedError,
	SettingFailedError, ShortWriteError, TimeoutError, TransportError, UnknownSettingError,
};

/// A device address or axis number is outside its valid range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidAddressError {
	what: &'static str,
	value: u8,
	min: u8,
	max: u8,
}

impl InvalidAddressError {
	/// Create a new error.
	pub(crate) const fn new(what: &'static str, value: u8, min: u8, max: u8) -> Self {
		InvalidAddressError {
			what,
			value,
			min,
			max,
		}
	}

	/// The rejected value.
	pub const fn value(&self) -> u8 {
		self.value
	}
}

impl_error_display! {
	InvalidAddressError,
	self => "{} numbers must be in the range of {} to {} (got {})",
	self.what,
	self.min,
	self.max,
	self.value
}

error_enum! {
	/// Any error returned by the [`stage`](crate::stage) module.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum StageError {
		SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
		Io(std::io::Error),
		ShortWrite(ShortWriteError),
		Timeout(TimeoutError),
		Framing(FramingError),
		Device(DeviceError),
		SettingFailed(SettingFailedError),
		UnknownSetting(UnknownSettingError),
		InvalidAddress(InvalidAddressError),
	}

	impl From<TransportError> {
		ShortWrite => ShortWrite,
		Io => Io,
		Timeout => Timeout,
	}

	impl From<DispatchError> {
		SerialDeviceInUseOrDisconnected => SerialDeviceInUseOrDisconnected,
		Io => Io,
		ShortWrite => ShortWrite,
		Timeout => Timeout,
		Framing => Framing,
		Device => Device,
		SettingFailed => SettingFailed,
		UnknownSetting => UnknownSetting,
	}
}
impl_is_timeout! { StageError }
