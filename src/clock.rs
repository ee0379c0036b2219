//! Sources of time for deadlines and post-send delays.
//!
//! All waiting in this crate happens synchronously in the calling thread, via
//! a [`Clock`]. Real links use [`SystemClock`]; tests substitute a virtual
//! clock so deadlines and motion delays can be checked without waiting.

#[cfg(any(test, feature = "mock"))]
use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// A source of the current time that can also suspend the caller.
pub trait Clock {
	/// The current instant.
	fn now(&self) -> Instant;

	/// Suspend the calling thread for `duration`.
	fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
	fn now(&self) -> Instant {
		(**self).now()
	}
	fn sleep(&self, duration: Duration) {
		(**self).sleep(duration);
	}
}

/// The system's monotonic clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
	fn sleep(&self, duration: Duration) {
		std::thread::sleep(duration);
	}
}

/// A virtual clock for use in testing.
///
/// Time only moves when the clock is used: every call to [`now`](Clock::now)
/// advances it by a fixed tick and every [`sleep`](Clock::sleep) advances it
/// by the full duration, which is also recorded.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct MockClock {
	/// The instant the clock was created at.
	origin: Instant,
	/// The virtual time elapsed since `origin`.
	elapsed: Cell<Duration>,
	/// How far each call to `now` advances the clock.
	tick: Duration,
	/// Every duration passed to `sleep`, in order.
	sleeps: RefCell<Vec<Duration>>,
}

#[cfg(any(test, feature = "mock"))]
impl MockClock {
	/// The default tick: one millisecond.
	pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

	/// Create a clock that advances by [`DEFAULT_TICK`](Self::DEFAULT_TICK) per `now`.
	pub fn new() -> Self {
		Self::with_tick(Self::DEFAULT_TICK)
	}

	/// Create a clock that advances by `tick` per `now`.
	pub fn with_tick(tick: Duration) -> Self {
		MockClock {
			origin: Instant::now(),
			elapsed: Cell::new(Duration::ZERO),
			tick,
			sleeps: RefCell::new(Vec::new()),
		}
	}

	/// The virtual time elapsed since the clock was created.
	pub fn elapsed(&self) -> Duration {
		self.elapsed.get()
	}

	/// Every duration the clock was asked to sleep for, in order.
	pub fn sleeps(&self) -> Vec<Duration> {
		self.sleeps.borrow().clone()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockClock {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Clock for MockClock {
	fn now(&self) -> Instant {
		self.elapsed.set(self.elapsed.get() + self.tick);
		self.origin + self.elapsed.get()
	}
	fn sleep(&self, duration: Duration) {
		self.elapsed.set(self.elapsed.get() + duration);
		self.sleeps.borrow_mut().push(duration);
	}
}
