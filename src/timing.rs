//! How long to sleep before reading the reply to a move.
//!
//! Binary devices only reply to a move once it has finished, which can take
//! far longer than the response deadline. Rather than busy-polling the link,
//! the dispatcher estimates how long the move will take from the travel
//! distance and the device's speed setting, sleeps for that long (less a fixed
//! margin) and only then starts the bounded read.
//!
//! The estimate is a tuning knob, not a correctness mechanism: the response
//! deadline is what bounds every exchange.
//!
//! ```
//! use std::time::Duration;
//! use zstage::timing::post_send_delay;
//!
//! // Short moves never sleep.
//! assert_eq!(post_send_delay(50, 6.4), Duration::ZERO);
//! // Long moves sleep for the estimated travel time minus the margin.
//! assert_eq!(post_send_delay(1_000_000, 6.4).as_millis(), 24_164);
//! ```

use crate::protocol::Motion;
use std::time::Duration;

/// Moves of at most this many steps never sleep.
pub const MIN_TRAVEL: u64 = 100;

/// The divisor applied to the travel distance before dividing by speed.
const TRAVEL_DIVISOR: f64 = 6.4;

/// Subtracted from the estimate so the read starts slightly before the move ends.
const MARGIN_MS: f64 = 250.0;

/// Per-device constants used to turn a raw speed setting into µm/ms.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MotionConfig {
	/// The linear distance of one microstep, in µm.
	pub step_size_um: f64,
	/// The device's speed data per microstep per second.
	pub conversion_factor: f64,
}

impl MotionConfig {
	/// The step size of a 2 mm/rev, 200 step/rev motor at 64 microsteps.
	pub const DEFAULT_STEP_SIZE_UM: f64 = 0.15625;
	/// The conversion factor used by Zaber stage controllers.
	pub const DEFAULT_CONVERSION_FACTOR: f64 = 1.6384;

	/// Create a config from explicit constants.
	pub const fn new(step_size_um: f64, conversion_factor: f64) -> Self {
		MotionConfig {
			step_size_um,
			conversion_factor,
		}
	}

	/// Convert a raw `maxspeed` setting to µm/ms (equivalently, mm/s).
	pub fn speed_um_per_ms(&self, raw_speed: i32) -> f64 {
		f64::from(raw_speed) / self.conversion_factor * self.step_size_um / 1000.0
	}

	/// Convert a speed in µm/ms (equivalently, mm/s) to raw speed data.
	///
	/// The result is rounded and clamped to the range of the data field.
	pub fn raw_speed(&self, speed_um_per_ms: f64) -> i32 {
		let raw = speed_um_per_ms * 1000.0 * self.conversion_factor / self.step_size_um;
		raw.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
	}
}

impl Default for MotionConfig {
	fn default() -> Self {
		MotionConfig::new(
			MotionConfig::DEFAULT_STEP_SIZE_UM,
			MotionConfig::DEFAULT_CONVERSION_FACTOR,
		)
	}
}

/// Get the distance, in steps, a move will travel.
///
/// `current` is only consulted for absolute moves. Velocity moves have no end
/// point, so they travel `0` as far as the estimate is concerned.
pub fn travel(motion: Motion, value: i32, current: i32) -> u64 {
	match motion {
		Motion::Absolute => (i64::from(value) - i64::from(current)).unsigned_abs(),
		Motion::Relative => i64::from(value).unsigned_abs(),
		Motion::Velocity => 0,
	}
}

/// Get how long to sleep after sending a move of `travel` steps at
/// `speed_um_per_ms`.
///
/// `sleep_ms = travel / 6.4 / speed - 250`, floored at zero. Travel of at most
/// [`MIN_TRAVEL`] steps, or a speed that is not a positive number, yields no
/// delay.
pub fn post_send_delay(travel: u64, speed_um_per_ms: f64) -> Duration {
	if travel <= MIN_TRAVEL || !speed_um_per_ms.is_finite() || speed_um_per_ms <= 0.0 {
		return Duration::ZERO;
	}
	let sleep_ms = travel as f64 / TRAVEL_DIVISOR / speed_um_per_ms - MARGIN_MS;
	if sleep_ms > 0.0 {
		Duration::from_secs_f64(sleep_ms / 1000.0)
	} else {
		Duration::ZERO
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn short_travel_never_sleeps() {
		assert_eq!(post_send_delay(0, 6.4), Duration::ZERO);
		assert_eq!(post_send_delay(50, 6.4), Duration::ZERO);
		assert_eq!(post_send_delay(MIN_TRAVEL, 0.001), Duration::ZERO);
	}

	#[test]
	fn estimate_is_floored_at_zero() {
		// 1000 / 6.4 / 6.4 - 250 is negative.
		assert!(1000.0 / 6.4 / 6.4 - 250.0 < 0.0);
		assert_eq!(post_send_delay(1000, 6.4), Duration::ZERO);
	}

	#[test]
	fn long_travel_sleeps() {
		let delay = post_send_delay(100_000, 0.5);
		// 100000 / 6.4 / 0.5 - 250 = 31000
		assert_eq!(delay.as_millis(), 31_000);
	}

	#[test]
	fn bad_speeds_never_sleep() {
		assert_eq!(post_send_delay(100_000, 0.0), Duration::ZERO);
		assert_eq!(post_send_delay(100_000, -1.0), Duration::ZERO);
		assert_eq!(post_send_delay(100_000, f64::NAN), Duration::ZERO);
	}

	#[test]
	fn travel_per_motion() {
		assert_eq!(travel(Motion::Absolute, 1000, 200), 800);
		assert_eq!(travel(Motion::Absolute, -1000, 200), 1200);
		assert_eq!(travel(Motion::Absolute, i32::MIN, i32::MAX), u64::from(u32::MAX));
		assert_eq!(travel(Motion::Relative, -500, 12345), 500);
		assert_eq!(travel(Motion::Velocity, 9999, 0), 0);
	}

	#[test]
	fn speed_conversions() {
		let config = MotionConfig::default();
		// 1.6384 * 1000 / 0.15625 = 10485.76 raw per µm/ms
		let raw = config.raw_speed(1.0);
		assert_eq!(raw, 10_486);
		let speed = config.speed_um_per_ms(raw);
		assert!((speed - 1.0).abs() < 1e-3);
	}
}
