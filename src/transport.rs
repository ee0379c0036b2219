//! Moving whole frames over a byte channel.
//!
//! A [`Transport`] owns one [`Backend`] exclusively and carries at most one
//! exchange at a time: [`send`](Transport::send) writes a complete request in a
//! single call and [`receive`](Transport::receive) reassembles the response.
//! The channel has no message framing of its own and may deliver a response in
//! arbitrary pieces, so bytes are accumulated until a whole frame is present or
//! the response deadline passes.
//!
//! While a response is awaited, each read blocks for at most
//! [`POLL_INTERVAL`], so the deadline holds even for a backend that was handed
//! over with no read timeout at all.

mod handlers;

use crate::{
	backend::{Backend, UNKNOWN_BACKEND_NAME},
	binary::{Frame, FRAME_LEN},
	clock::{Clock, SystemClock},
	error::{ShortWriteError, TimeoutError, TransportError},
};
pub use handlers::*;
use std::{io, time::Duration};

/// How long to wait for a complete response by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// The longest a single read may block while a response is awaited.
///
/// Opened channels use this as their read timeout too.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The read timeout used while purging stale bytes.
const PURGE_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// The size of the temporary buffer each read fills.
const READ_CHUNK_LEN: usize = 64;

/// Whether a read error only means no data was ready.
fn is_idle(error: &io::Error) -> bool {
	matches!(
		error.kind(),
		io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
	)
}

/// Writes frames to, and reassembles frames from, a [`Backend`].
#[derive(Debug)]
pub struct Transport<B, C = SystemClock> {
	/// The channel to the device
	backend: B,
	/// The source of time for deadlines and delays
	clock: C,
	/// How long to wait for a complete response
	timeout: Duration,
	/// Installed event handlers
	handlers: Handlers,
	/// If populated, the error that has "poisoned" the transport. This error
	/// MUST be reported before the transport is used for communication again.
	///
	/// This happens when the read timeout cannot be restored after a receive
	/// or a purge.
	poison: Option<io::Error>,
}

impl<B: Backend> Transport<B> {
	/// Create a transport over `backend` using the system clock.
	pub fn new(backend: B) -> Self {
		Transport::with_clock(backend, SystemClock)
	}
}

impl<B: Backend, C: Clock> Transport<B, C> {
	/// Create a transport over `backend` that measures time with `clock`.
	pub fn with_clock(backend: B, clock: C) -> Self {
		Transport {
			backend,
			clock,
			timeout: DEFAULT_TIMEOUT,
			handlers: Handlers::default(),
			poison: None,
		}
	}

	/// Get how long [`receive`](Transport::receive) waits for a complete response.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Set how long [`receive`](Transport::receive) waits for a complete response.
	pub fn set_timeout(&mut self, timeout: Duration) {
		self.timeout = timeout;
	}

	/// Get the underlying backend.
	pub fn backend(&self) -> &B {
		&self.backend
	}

	/// Get the underlying backend mutably.
	pub fn backend_mut(&mut self) -> &mut B {
		&mut self.backend
	}

	/// Get the transport's clock.
	pub fn clock(&self) -> &C {
		&self.clock
	}

	/// Consume the transport and return the underlying backend.
	pub fn into_backend(self) -> B {
		self.backend
	}

	/// Set a handler that is called with every frame transmitted or received.
	///
	/// Any previous handler is returned.
	///
	/// ## Example
	///
	/// ```
	/// # use zstage::{backend::Backend, transport::{Direction, Transport}};
	/// # fn wrapper<B: Backend>(transport: &mut Transport<B>) {
	/// transport.set_packet_handler(Some(Box::new(|frame: &[u8], direction: Direction| {
	///     println!("{direction:?} {frame:?}");
	/// })));
	/// # }
	/// ```
	pub fn set_packet_handler(&mut self, handler: Option<PacketHandler>) -> Option<PacketHandler> {
		std::mem::replace(&mut self.handlers.packet, handler)
	}

	/// Suspend the caller for `duration`.
	pub fn sleep(&self, duration: Duration) {
		self.clock.sleep(duration);
	}

	/// Check if the transport is poisoned and report the error if it exists.
	fn check_poisoned(&mut self) -> Result<(), io::Error> {
		if let Some(poison) = self.poison.take() {
			Err(poison)
		} else {
			Ok(())
		}
	}

	/// The backend's name, for logging.
	fn name(&self) -> String {
		self.backend
			.name()
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string())
	}

	/// Transmit a complete frame in a single write.
	///
	/// If the backend accepts fewer bytes than the whole frame, a
	/// [`ShortWrite`](TransportError::ShortWrite) error is returned.
	pub fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
		self.check_poisoned()?;

		log::debug!("{} TX: {:?}", self.name(), frame);
		let written = self.backend.write(frame)?;
		if written != frame.len() {
			return Err(ShortWriteError::new(frame.len(), written).into());
		}
		self.backend.flush()?;
		self.handlers.packet(frame, Direction::Tx);
		Ok(())
	}

	/// Receive a complete Binary frame.
	///
	/// Bytes arriving after the sixth are discarded. See
	/// [`receive_frame`](Transport::receive_frame).
	pub fn receive(&mut self) -> Result<Frame, TransportError> {
		let bytes = self.receive_frame(|received| {
			(received.len() >= FRAME_LEN).then_some(FRAME_LEN)
		})?;
		let mut frame = [0u8; FRAME_LEN];
		frame.copy_from_slice(&bytes);
		Ok(frame)
	}

	/// Receive a complete frame.
	///
	/// Bytes are read and accumulated until `frame_len` reports that a complete
	/// frame of some length has arrived. Any bytes beyond that length are
	/// discarded. If no complete frame arrives within the transport's
	/// [`timeout`](Transport::timeout), a [`Timeout`](TransportError::Timeout)
	/// error is returned. Reads that find no data ready are retried; any other
	/// read error is returned immediately.
	pub fn receive_frame<F>(&mut self, frame_len: F) -> Result<Vec<u8>, TransportError>
	where
		F: Fn(&[u8]) -> Option<usize>,
	{
		self.receive_reply(self.timeout, frame_len, |_| true)
	}

	/// Receive the first complete frame `accept` approves of, waiting at most
	/// `timeout`.
	///
	/// Complete frames that `accept` rejects, such as late replies to an earlier
	/// request or unsolicited messages, are logged and dropped, and the wait
	/// continues. Otherwise this behaves like
	/// [`receive_frame`](Transport::receive_frame).
	pub fn receive_reply<F, A>(
		&mut self,
		timeout: Duration,
		frame_len: F,
		accept: A,
	) -> Result<Vec<u8>, TransportError>
	where
		F: Fn(&[u8]) -> Option<usize>,
		A: Fn(&[u8]) -> bool,
	{
		self.check_poisoned()?;

		let mut guard = ReadTimeout::apply(self, timeout.min(POLL_INTERVAL))?;
		guard.collect_reply(timeout, frame_len, accept)
	}

	/// The reassembly loop behind [`receive_reply`](Transport::receive_reply).
	fn collect_reply<F, A>(
		&mut self,
		timeout: Duration,
		frame_len: F,
		accept: A,
	) -> Result<Vec<u8>, TransportError>
	where
		F: Fn(&[u8]) -> Option<usize>,
		A: Fn(&[u8]) -> bool,
	{
		let deadline = self.clock.now() + timeout;
		let mut received = Vec::with_capacity(FRAME_LEN);
		let mut chunk = [0u8; READ_CHUNK_LEN];
		loop {
			while !received.is_empty() {
				let len = match frame_len(&received) {
					Some(len) => len.clamp(1, received.len()),
					None => break,
				};
				if accept(&received[..len]) {
					if received.len() > len {
						log::trace!(
							"{} RX: discarding {} surplus bytes",
							self.name(),
							received.len() - len
						);
					}
					received.truncate(len);
					log::debug!("{} RX: {:?}", self.name(), received);
					self.handlers.packet(&received, Direction::Rx);
					return Ok(received);
				}
				log::warn!(
					"{} RX: discarding unrelated frame {:?}",
					self.name(),
					&received[..len]
				);
				received.drain(..len);
			}
			if self.clock.now() >= deadline {
				return Err(TimeoutError::new(timeout, received.len()).into());
			}
			match self.backend.read(&mut chunk) {
				Ok(n) => {
					if n > 0 {
						log::trace!("{} RX chunk: {:?}", self.name(), &chunk[..n]);
					}
					received.extend_from_slice(&chunk[..n]);
				}
				Err(e) if is_idle(&e) => {}
				Err(e) => return Err(e.into()),
			}
		}
	}

	/// Discard any bytes waiting on the channel.
	///
	/// Reads repeatedly until a read returns fewer bytes than requested (or
	/// finds nothing ready) and returns the number of bytes discarded. This is
	/// meant to run once when a link is set up, not before every command.
	pub fn clear(&mut self) -> Result<usize, TransportError> {
		self.check_poisoned()?;

		let mut discarded = 0;
		{
			let mut guard = ReadTimeout::apply(self, PURGE_READ_TIMEOUT)?;
			let mut buf = [0u8; READ_CHUNK_LEN];
			loop {
				match guard.backend.read(&mut buf) {
					Ok(n) => {
						discarded += n;
						if n < buf.len() {
							break;
						}
					}
					Err(e) if is_idle(&e) => break,
					Err(e) => return Err(e.into()),
				}
			}
		}
		if discarded > 0 {
			log::warn!("{} purged {} stale bytes", self.name(), discarded);
		}
		Ok(discarded)
	}
}

/// Holds a transport's backend at a temporary read timeout and restores the
/// previous one when dropped.
///
/// If the previous timeout cannot be restored, the transport is poisoned.
struct ReadTimeout<'a, B: Backend, C> {
	transport: &'a mut Transport<B, C>,
	restore: Option<Duration>,
}

impl<'a, B: Backend, C> ReadTimeout<'a, B, C> {
	/// Bound every read on `transport` to `timeout`.
	///
	/// A zero timeout is rejected by some backends, so at least one
	/// millisecond is used.
	fn apply(transport: &'a mut Transport<B, C>, timeout: Duration) -> Result<Self, io::Error> {
		let restore = transport.backend.read_timeout()?;
		transport
			.backend
			.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
		Ok(ReadTimeout { transport, restore })
	}
}

impl<B: Backend, C> std::ops::Deref for ReadTimeout<'_, B, C> {
	type Target = Transport<B, C>;
	fn deref(&self) -> &Self::Target {
		self.transport
	}
}

impl<B: Backend, C> std::ops::DerefMut for ReadTimeout<'_, B, C> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.transport
	}
}

impl<B: Backend, C> Drop for ReadTimeout<'_, B, C> {
	fn drop(&mut self) {
		if let Err(e) = self.transport.backend.set_read_timeout(self.restore) {
			self.transport.poison = Some(io::Error::new(
				io::ErrorKind::Other,
				format!("could not restore the read timeout: {e}"),
			));
		}
	}
}
