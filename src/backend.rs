//! Types that can exchange (read/write) bytes with a stage controller.
//!
//! The [`Backend`] trait represents all such types.

#[cfg(any(test, feature = "mock"))]
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write + private::Sealed {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl<C: Backend + ?Sized> Backend for &mut C {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl Backend for std::net::TcpStream {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		std::net::TcpStream::set_read_timeout(self, timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		std::net::TcpStream::read_timeout(self)
	}
	fn name(&self) -> Option<String> {
		self.peer_addr().map(|addr| format!("{addr}")).ok()
	}
}

/// A platform agnostic serial port backend.
//
// `serialport` exposes `COMPort` and `TTYPort` for windows and unix. Only one
// of them exists on any platform, so wrap whichever it is in a new type rather
// than paying for dynamic dispatch or an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// serialport has no infinite timeout; Duration::MAX is close enough.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.0.timeout()))
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

/// A mock backend for use in testing.
///
/// It has the following features:
///   * Data written to it is recorded and can be inspected with [`written`](Mock::written).
///   * It can be filled with data for reading. Each call to
///     [`append_data`](Mock::append_data) queues one chunk and a single read
///     never crosses a chunk boundary, so tests decide how a response is split
///     across reads.
///   * Specific errors can be inserted for calls to `read`, `write`, `flush`,
///     and `set_read_timeout`.
///   * The next write can be forced to accept fewer bytes than it was given.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct Mock {
	/// The chunks data is read from
	chunks: VecDeque<Vec<u8>>,
	/// Everything written so far
	written: Vec<u8>,
	/// The error to surface on the next read, if any. It is only surfaced once.
	read_error: Option<io::Error>,
	/// The error to surface on the next write, if any. It is only surfaced once.
	write_error: Option<io::Error>,
	/// The error to surface on the next flush, if any. It is only surfaced once.
	flush_error: Option<io::Error>,
	/// The error to surface on the next set_read_timeout, if any. It is only surfaced once.
	set_read_timeout_error: Option<io::Error>,
	/// The number of bytes the next write accepts, if limited. It is only applied once.
	short_write: Option<usize>,
	/// The read timeout, which is otherwise ignored.
	read_timeout: Option<Duration>,
}

#[cfg(any(test, feature = "mock"))]
impl Mock {
	/// Create a new Mock backend.
	pub fn new() -> Self {
		Mock {
			chunks: VecDeque::new(),
			written: Vec::new(),
			read_error: None,
			write_error: None,
			flush_error: None,
			set_read_timeout_error: None,
			short_write: None,
			read_timeout: Some(Duration::ZERO),
		}
	}
	/// Append a chunk of data to the read buffer.
	///
	/// The data is not validated in any way. Empty chunks are ignored.
	pub fn append_data<T: AsRef<[u8]>>(&mut self, bytes: T) {
		let bytes = bytes.as_ref();
		if !bytes.is_empty() {
			self.chunks.push_back(bytes.to_vec());
		}
	}
	/// Clear the read buffer.
	pub fn clear_buffer(&mut self) {
		self.chunks.clear();
	}
	/// Whether the mock has any data available or not
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}
	/// All the bytes written to the mock so far.
	pub fn written(&self) -> &[u8] {
		&self.written
	}
	/// Forget the bytes written so far.
	pub fn clear_written(&mut self) {
		self.written.clear();
	}
	/// Set the error for the next `read`, if any.
	pub fn read_error(&mut self, err: Option<io::Error>) {
		self.read_error = err;
	}
	/// Set the error for the next `write`, if any.
	pub fn write_error(&mut self, err: Option<io::Error>) {
		self.write_error = err;
	}
	/// Set the error for the next `flush`, if any.
	pub fn flush_error(&mut self, err: Option<io::Error>) {
		self.flush_error = err;
	}
	/// Set the error for the next `set_read_timeout`, if any.
	pub fn set_read_timeout_error(&mut self, err: Option<io::Error>) {
		self.set_read_timeout_error = err;
	}
	/// Limit the number of bytes the next `write` accepts.
	pub fn short_write(&mut self, len: Option<usize>) {
		self.short_write = len;
	}
}

#[cfg(any(test, feature = "mock"))]
impl Default for Mock {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Backend for Mock {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		if let Some(err) = self.set_read_timeout_error.take() {
			Err(err)
		} else {
			self.read_timeout = timeout;
			Ok(())
		}
	}

	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(self.read_timeout)
	}

	fn name(&self) -> Option<String> {
		Some(format!("<mock 0x{:x}>", self as *const Mock as usize))
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Read for Mock {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if let Some(err) = self.read_error.take() {
			return Err(err);
		}
		let Some(chunk) = self.chunks.front_mut() else {
			// A real device with no data ready would block until the read
			// timeout expires. Simulate that by timing out immediately.
			return Err(io::Error::new(
				io::ErrorKind::TimedOut,
				"Simulated timeout error",
			));
		};
		let len = chunk.len().min(buf.len());
		buf[..len].copy_from_slice(&chunk[..len]);
		chunk.drain(..len);
		if chunk.is_empty() {
			self.chunks.pop_front();
		}
		Ok(len)
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Write for Mock {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if let Some(err) = self.write_error.take() {
			return Err(err);
		}
		let len = self.short_write.take().map_or(buf.len(), |n| n.min(buf.len()));
		self.written.extend_from_slice(&buf[..len]);
		Ok(len)
	}

	fn flush(&mut self) -> io::Result<()> {
		if let Some(err) = self.flush_error.take() {
			Err(err)
		} else {
			Ok(())
		}
	}
}

mod private {
	pub trait Sealed {}

	impl Sealed for super::Serial {}
	impl Sealed for std::net::TcpStream {}
	#[cfg(any(test, feature = "mock"))]
	impl Sealed for super::Mock {}
	impl<C: super::Backend + ?Sized> Sealed for Box<C> {}
	impl<C: super::Backend + ?Sized> Sealed for &mut C {}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::{Read as _, Write as _};

	#[test]
	fn mock_reads_never_cross_chunks() {
		let mut mock = Mock::new();
		mock.append_data([1, 2, 3]);
		mock.append_data([4, 5]);

		let mut buf = [0u8; 8];
		assert_eq!(mock.read(&mut buf).unwrap(), 3);
		assert_eq!(&buf[..3], &[1, 2, 3]);
		assert_eq!(mock.read(&mut buf[..1]).unwrap(), 1);
		assert_eq!(buf[0], 4);
		assert_eq!(mock.read(&mut buf).unwrap(), 1);
		assert_eq!(buf[0], 5);
		assert!(mock.is_empty());
		assert_eq!(
			mock.read(&mut buf).unwrap_err().kind(),
			io::ErrorKind::TimedOut
		);
	}

	#[test]
	fn mock_records_writes() {
		let mut mock = Mock::new();
		mock.write_all(&[1, 45, 0, 0, 0, 0]).unwrap();
		assert_eq!(mock.written(), &[1, 45, 0, 0, 0, 0]);

		mock.short_write(Some(4));
		assert_eq!(mock.write(&[9; 6]).unwrap(), 4);
		assert_eq!(mock.written().len(), 10);
	}
}
