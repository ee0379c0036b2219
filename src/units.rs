//! Conversions between device steps and physical lengths.

/// The mechanical configuration of a linear stage.
///
/// ```
/// use zstage::units::StageGeometry;
///
/// let geometry = StageGeometry::default();
/// assert_eq!(geometry.step_size_um(), 0.15625);
/// assert_eq!(geometry.um_to_steps(1000.0), 6400);
/// ```
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StageGeometry {
	/// The number of microsteps per full motor step.
	pub resolution: u32,
	/// The number of full steps per motor revolution.
	pub motor_steps: u32,
	/// The linear travel per motor revolution, in mm.
	pub linear_motion_mm: f64,
}

impl StageGeometry {
	/// The default microstep resolution.
	pub const DEFAULT_RESOLUTION: u32 = 64;
	/// The default number of full steps per revolution.
	pub const DEFAULT_MOTOR_STEPS: u32 = 200;
	/// The default linear travel per revolution, in mm.
	pub const DEFAULT_LINEAR_MOTION_MM: f64 = 2.0;

	/// The linear distance of one microstep, in µm.
	pub fn step_size_um(&self) -> f64 {
		self.linear_motion_mm * 1000.0 / (f64::from(self.motor_steps) * f64::from(self.resolution))
	}

	/// Convert a position or distance in steps to µm.
	pub fn steps_to_um(&self, steps: i32) -> f64 {
		f64::from(steps) * self.step_size_um()
	}

	/// Convert a position or distance in µm to the nearest whole number of steps.
	///
	/// Results outside the range of the data field are clamped to it.
	pub fn um_to_steps(&self, um: f64) -> i32 {
		(um / self.step_size_um())
			.round()
			.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
	}
}

impl Default for StageGeometry {
	fn default() -> Self {
		StageGeometry {
			resolution: StageGeometry::DEFAULT_RESOLUTION,
			motor_steps: StageGeometry::DEFAULT_MOTOR_STEPS,
			linear_motion_mm: StageGeometry::DEFAULT_LINEAR_MOTION_MM,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_step_size() {
		let geometry = StageGeometry::default();
		assert_eq!(geometry.step_size_um(), 0.15625);
	}

	#[test]
	fn resolution_changes_step_size() {
		let geometry = StageGeometry {
			resolution: 128,
			..StageGeometry::default()
		};
		assert_eq!(geometry.step_size_um(), 0.078125);
		assert_eq!(geometry.um_to_steps(1.0), 13);
	}

	#[test]
	fn conversions() {
		let geometry = StageGeometry::default();
		assert_eq!(geometry.steps_to_um(6400), 1000.0);
		assert_eq!(geometry.steps_to_um(-64), -10.0);
		assert_eq!(geometry.um_to_steps(-10.0), -64);
		// Rounded to the nearest step.
		assert_eq!(geometry.um_to_steps(0.1), 1);
		assert_eq!(geometry.um_to_steps(0.07), 0);
		// Clamped to the data range.
		assert_eq!(geometry.um_to_steps(1e12), i32::MAX);
		assert_eq!(geometry.um_to_steps(-1e12), i32::MIN);
	}
}
