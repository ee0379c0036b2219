//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! However, most APIs return more than one kind of error and so will return one
//! of the higher level [enums](#enums), such as [`TransportError`],
//! [`DispatchError`] or [`StageError`]. Where appropriate, the error types are
//! convertible to the higher level enums, allowing them to be used with `?`:
//!
//! ```
//! use zstage::error::{DispatchError, StageError};
//!
//! fn foo() -> Result<(), DispatchError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), StageError> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! }
//! ```
//!
//! Device-reported faults ([`DeviceError`]) and host-side failures (timeouts,
//! malformed responses, unknown settings) are always distinct variants, so a
//! caller can decide whether to retry or to report a configuration problem.

/// Implement Error and Display traits for the specified type.
///
/// After the type define the format string and any arguments it should
/// reference after `self =>` (to abide by macro hygiene rules).
macro_rules! impl_error_display {
	(
		$name:path,
		$self:ident =>
		$display:literal
		$(,
			$($arg:expr),+
		)?
	) => {
		impl std::error::Error for $name {}

		impl std::fmt::Display for $name {
			fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(
					f,
					$display
					$(,
						$($arg),+
					)?
				)
			}
		}
	};
}

macro_rules! impl_is_timeout {
	($name:ident) => {
		impl $name {
			/// A convenience function for determining if the error is due to
			/// a response not arriving in time.
			pub fn is_timeout(&self) -> bool {
				matches!(self, $name::Timeout(_))
			}
		}
	};
}

macro_rules! impl_from_serialport_error {
	($name:ident) => {
		impl From<serialport::Error> for $name {
			fn from(other: serialport::Error) -> Self {
				use std::io;

				match other.kind() {
					serialport::ErrorKind::NoDevice => $name::SerialDeviceInUseOrDisconnected(
						SerialDeviceInUseOrDisconnectedError(other.description.into_boxed_str()),
					),
					serialport::ErrorKind::InvalidInput => $name::Io(io::Error::new(
						io::ErrorKind::InvalidInput,
						other.description,
					)),
					serialport::ErrorKind::Unknown => {
						$name::Io(io::Error::new(io::ErrorKind::Other, other.description))
					}
					serialport::ErrorKind::Io(kind) => {
						$name::Io(io::Error::new(kind, other.description))
					}
				}
			}
		}
	};
}

/// Define error enums that contain concrete error types (not other error enums).
///
/// From and TryFrom traits will be implemented for the enum and it's underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
///
/// Simple implementations of From and TryFrom with other error enums can be
/// added by appending a succinct impl block, which assumes that:
///   * it is being implemented for this error enum,
///   * each variant has a single tuple value, and can be converted to the value
///     in this enum with its own From implementation.
///
/// ```compile_fail
/// # // This fails to compile because the macro is not exported.
/// error_enum!{
///     // This defines the enum and From/TryFrom between ThisError and A and B.
///     #[non_exhaustive]
///     pub enum ThisError {
///         VariantA(A),
///         VariantB(B),
///         // ...
///     }
///
///     // This implements a simple From/TryFrom between ThisError and OtherType.
///     impl From<OtherType> {
///         FromVariantA => VariantA,
///         // ...
///     }
/// }
/// ```
macro_rules! error_enum {
	(
		$(#[$attr:meta])*
		pub enum $name:ident {
			$(
				$variant:ident($inner:path)
			),+
			$(,)?
		}
		// Additional information for From/TryFrom impl blocks.
		$(
			impl From<$from_t:ident>
			{
				$($from_variant:ident => $to_variant:ident),+
				$(,)?
			}
		)*
	) => {
		$(
			#[$attr]
		)*
		#[allow(missing_docs)]
		pub enum $name {
			$(
				$variant($inner)
			),+
		}

		impl std::error::Error for $name {}

		// Defer the display to the inner error type
		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				match self {
					$(
						$name::$variant(e) => e.fmt(f)
					),+
				}
			}
		}

		// Allow the enum to be convertible from an infallible error
		impl From<std::convert::Infallible> for $name {
			fn from(_: std::convert::Infallible) -> Self {
				unreachable!();
			}
		}

		// Conversions with underlying errors
		$(
			impl From<$inner> for $name {
				fn from(other: $inner) -> Self {
					$name::$variant(other)
				}
			}

			impl TryFrom<$name> for $inner {
				type Error = $name;
				fn try_from(other: $name) -> Result<Self, Self::Error> {
					match other {
						$name::$variant(value) => Ok(value),
						#[allow(unreachable_patterns)]
						value => Err(value)
					}
				}
			}
		)+

		// Conversions from other enum errors
		$(
			impl From<$from_t> for $name {
				fn from(other: $from_t) -> Self {
					match other {
						$($from_t::$from_variant(e) => $name::$to_variant(From::from(e))),+
					}
				}
			}

			impl TryFrom<$name> for $from_t {
				type Error = $name;
				fn try_from(other: $name) -> Result<Self, Self::Error> {
					match other {
						$(
							$name::$to_variant(e) => Ok($from_t::$from_variant(From::from(e)))
						),+
						,
						#[allow(unreachable_patterns)]
						_ => Err(other)
					}
				}
			}
		)*
	};
}

mod dispatch;
mod stage;
mod transport;

pub use dispatch::*;
pub use stage::*;
pub use transport::*;

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
	SerialDeviceInUseOrDisconnectedError,
	self =>
	"the specified device is either disconnected or already in use by another process: {}", self.0
}
