//! Error types for moving frames over a byte channel.

use std::time::Duration;

/// The backend accepted fewer bytes than a whole frame in a single write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShortWriteError {
	expected: usize,
	written: usize,
}

impl ShortWriteError {
	/// Create a new error.
	pub(crate) const fn new(expected: usize, written: usize) -> Self {
		ShortWriteError { expected, written }
	}

	/// The length of the frame that should have been written.
	pub const fn expected(&self) -> usize {
		self.expected
	}

	/// The number of bytes that were actually written.
	pub const fn written(&self) -> usize {
		self.written
	}
}

impl_error_display! {
	ShortWriteError,
	self => "short write: only {} of {} bytes were written",
	self.written,
	self.expected
}

/// A complete response did not arrive before the deadline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeoutError {
	timeout: Duration,
	received: usize,
}

impl TimeoutError {
	/// Create a new error.
	pub(crate) const fn new(timeout: Duration, received: usize) -> Self {
		TimeoutError { timeout, received }
	}

	/// How long the link waited for the response.
	pub const fn timeout(&self) -> Duration {
		self.timeout
	}

	/// How many bytes of the incomplete response had arrived.
	pub const fn received(&self) -> usize {
		self.received
	}
}

impl_error_display! {
	TimeoutError,
	self => "timed out waiting for response after {} ms ({} bytes received)",
	self.timeout.as_millis(),
	self.received
}

error_enum! {
	/// Any error returned by the [`transport`](crate::transport) module.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum TransportError {
		ShortWrite(ShortWriteError),
		Io(std::io::Error),
		Timeout(TimeoutError),
	}
}
impl_is_timeout! { TransportError }
