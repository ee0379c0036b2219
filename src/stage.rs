//! A single stage axis in physical units.
//!
//! A [`Stage`] binds a [`Dispatcher`] to one device address and axis number
//! and converts between micrometres (or mm/s) and the device's native step
//! units using a [`StageGeometry`].
//!
//! Positions in µm are reported relative to an adjustable adapter origin, so a
//! sample holder mounted off-centre can be treated as the zero point without
//! touching the device's own position counter.
//!
//! ```no_run
//! use zstage::{dispatch::Dispatcher, stage::Stage};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::open_serial("/dev/ttyUSB0")?;
//! let mut stage = Stage::new(dispatcher, 1, 1)?;
//! stage.initialize()?;
//! stage.set_position_um(2500.0)?;
//! println!("now at {} um", stage.position_um()?);
//! # Ok(())
//! # }
//! ```

use crate::{
	backend::Backend,
	binary::Binary,
	clock::{Clock, SystemClock},
	dispatch::Dispatcher,
	error::{InvalidAddressError, StageError},
	protocol::Protocol,
	setting,
	units::StageGeometry,
};
use std::time::Duration;

/// The lowest valid device address.
pub const MIN_DEVICE: u8 = 1;
/// The highest valid device address.
pub const MAX_DEVICE: u8 = 99;
/// The lowest valid axis number.
pub const MIN_AXIS: u8 = 1;
/// The highest valid axis number.
pub const MAX_AXIS: u8 = 9;

/// Check that `value` is in `min..=max`.
fn validate(what: &'static str, value: u8, min: u8, max: u8) -> Result<u8, InvalidAddressError> {
	if (min..=max).contains(&value) {
		Ok(value)
	} else {
		Err(InvalidAddressError::new(what, value, min, max))
	}
}

/// One axis of a device, addressed in physical units.
#[derive(Debug)]
pub struct Stage<B, C = SystemClock, P = Binary> {
	/// The link the device is on
	dispatcher: Dispatcher<B, C, P>,
	/// The device address
	device: u8,
	/// The axis number
	axis: u8,
	/// The mechanical configuration
	geometry: StageGeometry,
	/// Where µm positions are measured from, in device µm
	adapter_origin_um: f64,
}

impl<B: Backend, C: Clock, P: Protocol> Stage<B, C, P> {
	/// Bind a dispatcher to a device address (1 to 99) and axis number (1 to 9).
	///
	/// The default [`StageGeometry`] is used until
	/// [`initialize`](Stage::initialize) reads the device's resolution or
	/// [`set_geometry`](Stage::set_geometry) is called. The dispatcher's
	/// [`MotionConfig`](crate::timing::MotionConfig) is left as it is.
	pub fn new(dispatcher: Dispatcher<B, C, P>, device: u8, axis: u8) -> Result<Self, StageError> {
		let device = validate("device", device, MIN_DEVICE, MAX_DEVICE)?;
		let axis = validate("axis", axis, MIN_AXIS, MAX_AXIS)?;
		Ok(Stage {
			dispatcher,
			device,
			axis,
			geometry: StageGeometry::default(),
			adapter_origin_um: 0.0,
		})
	}

	/// Like [`new`](Stage::new), but with a known geometry.
	///
	/// The dispatcher's motion timing step size is updated to match it.
	pub fn with_geometry(
		dispatcher: Dispatcher<B, C, P>,
		device: u8,
		axis: u8,
		geometry: StageGeometry,
	) -> Result<Self, StageError> {
		let mut stage = Stage::new(dispatcher, device, axis)?;
		stage.set_geometry(geometry);
		Ok(stage)
	}

	/// Get the device address.
	pub fn device(&self) -> u8 {
		self.device
	}

	/// Get the axis number.
	pub fn axis(&self) -> u8 {
		self.axis
	}

	/// Get the mechanical configuration.
	pub fn geometry(&self) -> StageGeometry {
		self.geometry
	}

	/// Set the mechanical configuration.
	pub fn set_geometry(&mut self, geometry: StageGeometry) {
		self.geometry = geometry;
		self.sync_step_size();
	}

	/// Get the adapter origin, in device µm.
	pub fn adapter_origin_um(&self) -> f64 {
		self.adapter_origin_um
	}

	/// Measure µm positions from `origin_um`, given in device µm.
	///
	/// Only [`position_um`](Stage::position_um),
	/// [`set_position_um`](Stage::set_position_um) and
	/// [`limits_um`](Stage::limits_um) are affected.
	pub fn set_adapter_origin_um(&mut self, origin_um: f64) {
		self.adapter_origin_um = origin_um;
	}

	/// Get how long [`home`](Stage::home) may take. See
	/// [`Dispatcher::home_timeout`].
	pub fn home_timeout(&self) -> Duration {
		self.dispatcher.home_timeout()
	}

	/// Set how long [`home`](Stage::home) may take.
	pub fn set_home_timeout(&mut self, timeout: Duration) {
		self.dispatcher.set_home_timeout(timeout);
	}

	/// Get the underlying dispatcher.
	pub fn dispatcher(&self) -> &Dispatcher<B, C, P> {
		&self.dispatcher
	}

	/// Get the underlying dispatcher mutably.
	pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<B, C, P> {
		&mut self.dispatcher
	}

	/// Consume the stage and return the underlying dispatcher.
	pub fn into_dispatcher(self) -> Dispatcher<B, C, P> {
		self.dispatcher
	}

	/// Keep the motion timing step size in line with the geometry.
	fn sync_step_size(&mut self) {
		let mut motion = self.dispatcher.motion_config();
		motion.step_size_um = self.geometry.step_size_um();
		self.dispatcher.set_motion_config(motion);
	}

	/// Prepare the link and read the device's microstep resolution.
	///
	/// Any stale bytes on the link are discarded first.
	pub fn initialize(&mut self) -> Result<(), StageError> {
		self.dispatcher.clear()?;
		let resolution = self
			.dispatcher
			.get_setting(self.device, self.axis, setting::RESOLUTION)?;
		match u32::try_from(resolution) {
			Ok(resolution) if resolution > 0 => {
				self.geometry.resolution = resolution;
				self.sync_step_size();
			}
			_ => log::warn!(
				"device {} reported resolution {}; keeping {}",
				self.device,
				resolution,
				self.geometry.resolution
			),
		}
		log::info!(
			"stage {}/{} ready: resolution {}, step size {} um",
			self.device,
			self.axis,
			self.geometry.resolution,
			self.geometry.step_size_um()
		);
		Ok(())
	}

	/// Get the current position, in steps.
	pub fn position_steps(&mut self) -> Result<i32, StageError> {
		Ok(self
			.dispatcher
			.get_setting(self.device, self.axis, setting::POSITION)?)
	}

	/// Get the current position, in µm from the adapter origin.
	pub fn position_um(&mut self) -> Result<f64, StageError> {
		let steps = self.position_steps()?;
		Ok(self.geometry.steps_to_um(steps) - self.adapter_origin_um)
	}

	/// Move to an absolute position, in steps.
	///
	/// Returns the device's reply (the final position, for Binary).
	pub fn set_position_steps(&mut self, steps: i32) -> Result<i32, StageError> {
		Ok(self.dispatcher.move_absolute(self.device, self.axis, steps)?)
	}

	/// Move to an absolute position, in µm from the adapter origin.
	pub fn set_position_um(&mut self, um: f64) -> Result<i32, StageError> {
		let steps = self.geometry.um_to_steps(um + self.adapter_origin_um);
		self.set_position_steps(steps)
	}

	/// Make the current position the device's zero.
	pub fn set_origin(&mut self) -> Result<(), StageError> {
		self.dispatcher
			.set_setting(self.device, self.axis, setting::POSITION, 0)?;
		log::info!("stage {}/{}: origin set", self.device, self.axis);
		Ok(())
	}

	/// Move by a signed distance, in steps.
	pub fn set_relative_position_steps(&mut self, steps: i32) -> Result<i32, StageError> {
		Ok(self.dispatcher.move_relative(self.device, self.axis, steps)?)
	}

	/// Move by a signed distance, in µm.
	pub fn set_relative_position_um(&mut self, um: f64) -> Result<i32, StageError> {
		let steps = self.geometry.um_to_steps(um);
		self.set_relative_position_steps(steps)
	}

	/// Move at a constant signed speed, in mm/s.
	pub fn move_velocity(&mut self, mm_per_s: f64) -> Result<i32, StageError> {
		let raw = self.dispatcher.motion_config().raw_speed(mm_per_s);
		Ok(self.dispatcher.move_velocity(self.device, self.axis, raw)?)
	}

	/// Stop any motion.
	///
	/// Returns the position the stage stopped at, in steps, for Binary and `0`
	/// for ASCII.
	pub fn stop(&mut self) -> Result<i32, StageError> {
		Ok(self.dispatcher.stop(self.device, self.axis)?)
	}

	/// Move to the home position.
	pub fn home(&mut self) -> Result<(), StageError> {
		self.dispatcher.home(self.device, self.axis)?;
		Ok(())
	}

	/// Get the travel limits, as `(min, max)` in µm from the adapter origin.
	pub fn limits_um(&mut self) -> Result<(f64, f64), StageError> {
		let (min, max) = self.dispatcher.get_limits(self.device, self.axis)?;
		let origin = self.adapter_origin_um;
		Ok((
			self.geometry.steps_to_um(min) - origin,
			self.geometry.steps_to_um(max) - origin,
		))
	}

	/// Whether the stage is moving. See [`Dispatcher::is_busy`].
	pub fn is_busy(&self) -> bool {
		self.dispatcher.is_busy(self.device)
	}

	/// Get the target speed for moves, in mm/s.
	pub fn speed_mm_per_s(&mut self) -> Result<f64, StageError> {
		let raw = self
			.dispatcher
			.get_setting(self.device, self.axis, setting::MAX_SPEED)?;
		Ok(self.dispatcher.motion_config().speed_um_per_ms(raw))
	}

	/// Set the target speed for moves, in mm/s.
	pub fn set_speed_mm_per_s(&mut self, mm_per_s: f64) -> Result<(), StageError> {
		let raw = self.dispatcher.motion_config().raw_speed(mm_per_s);
		self.dispatcher
			.set_setting(self.device, self.axis, setting::MAX_SPEED, raw)?;
		Ok(())
	}

	/// Get the acceleration, in device units.
	pub fn acceleration(&mut self) -> Result<i32, StageError> {
		Ok(self
			.dispatcher
			.get_setting(self.device, self.axis, setting::ACCELERATION)?)
	}

	/// Set the acceleration, in device units.
	pub fn set_acceleration(&mut self, acceleration: i32) -> Result<(), StageError> {
		self.dispatcher
			.set_setting(self.device, self.axis, setting::ACCELERATION, acceleration)?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		backend::Mock,
		binary::{self, command},
		clock::MockClock,
		timing::MotionConfig,
		transport::Transport,
	};

	type MockStage = Stage<Mock, MockClock, Binary>;

	fn open_mock(device: u8, axis: u8) -> Result<MockStage, StageError> {
		let transport = Transport::with_clock(Mock::new(), MockClock::new());
		Stage::new(Dispatcher::from_transport(transport, Binary), device, axis)
	}

	fn reply(stage: &mut MockStage, command: u8, data: i32) {
		let device = stage.device();
		stage
			.dispatcher_mut()
			.transport_mut()
			.backend_mut()
			.append_data(binary::encode(device, command, i64::from(data)));
	}

	fn written(stage: &MockStage) -> Vec<u8> {
		stage.dispatcher().transport().backend().written().to_vec()
	}

	#[test]
	fn addresses_are_validated() {
		for (device, axis) in [(0, 1), (100, 1), (255, 1), (1, 0), (1, 10)] {
			let err = open_mock(device, axis).unwrap_err();
			assert!(
				matches!(err, StageError::InvalidAddress(_)),
				"({device}, {axis}): {err:?}"
			);
		}
		let err = open_mock(0, 1).unwrap_err();
		assert_eq!(
			err.to_string(),
			"device numbers must be in the range of 1 to 99 (got 0)"
		);
		assert!(open_mock(1, 1).is_ok());
		assert!(open_mock(99, 9).is_ok());
	}

	#[test]
	fn initialize_reads_resolution() {
		let mut stage = open_mock(1, 1).unwrap();
		stage
			.dispatcher_mut()
			.transport_mut()
			.backend_mut()
			.append_data([9, 9, 9]);
		reply(&mut stage, command::SET_MICROSTEP_RESOLUTION, 128);
		stage.initialize().unwrap();
		assert_eq!(stage.geometry().resolution, 128);
		assert_eq!(stage.geometry().step_size_um(), 0.078125);
		assert_eq!(
			stage.dispatcher().motion_config().step_size_um,
			0.078125
		);
		assert_eq!(written(&stage), [1, 37, 0, 0, 0, 0]);
	}

	#[test]
	fn initialize_ignores_nonsense_resolution() {
		let mut stage = open_mock(1, 1).unwrap();
		// The purge stops at the first short read, leaving the reply behind.
		stage
			.dispatcher_mut()
			.transport_mut()
			.backend_mut()
			.append_data([9, 9, 9]);
		reply(&mut stage, command::SET_MICROSTEP_RESOLUTION, 0);
		stage.initialize().unwrap();
		assert_eq!(stage.geometry(), StageGeometry::default());
	}

	#[test]
	fn new_keeps_the_callers_motion_config() {
		let transport = Transport::with_clock(Mock::new(), MockClock::new());
		let mut dispatcher = Dispatcher::from_transport(transport, Binary);
		dispatcher.set_motion_config(MotionConfig::new(0.5, 1.6384));
		let stage = Stage::new(dispatcher, 1, 1).unwrap();
		assert_eq!(stage.dispatcher().motion_config().step_size_um, 0.5);

		let transport = Transport::with_clock(Mock::new(), MockClock::new());
		let mut dispatcher = Dispatcher::from_transport(transport, Binary);
		dispatcher.set_motion_config(MotionConfig::new(0.5, 1.6384));
		let geometry = StageGeometry {
			resolution: 128,
			..StageGeometry::default()
		};
		let mut stage = Stage::with_geometry(dispatcher, 1, 1, geometry).unwrap();
		assert_eq!(stage.dispatcher().motion_config().step_size_um, 0.078125);
		assert_eq!(stage.dispatcher().motion_config().conversion_factor, 1.6384);

		stage.set_geometry(StageGeometry::default());
		assert_eq!(
			stage.dispatcher().motion_config().step_size_um,
			MotionConfig::DEFAULT_STEP_SIZE_UM
		);
	}

	#[test]
	fn position_in_um() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::SET_CURRENT_POSITION, 6400);
		assert_eq!(stage.position_um().unwrap(), 1000.0);
	}

	#[test]
	fn set_position_in_um() {
		let mut stage = open_mock(3, 1).unwrap();
		// Current position, then the move's reply.
		reply(&mut stage, command::SET_CURRENT_POSITION, 6400);
		reply(&mut stage, command::MOVE_ABSOLUTE, 6410);
		assert_eq!(stage.set_position_um(1001.5).unwrap(), 6410);
		let mut expected = Vec::new();
		expected.extend(binary::encode(3, command::SET_CURRENT_POSITION, 0));
		expected.extend(binary::encode(3, command::MOVE_ABSOLUTE, 6410));
		assert_eq!(written(&stage), expected);
	}

	#[test]
	fn adapter_origin_shifts_um_positions() {
		let mut stage = open_mock(1, 1).unwrap();
		stage.set_adapter_origin_um(500.0);
		assert_eq!(stage.adapter_origin_um(), 500.0);

		reply(&mut stage, command::SET_CURRENT_POSITION, 6400);
		assert_eq!(stage.position_um().unwrap(), 500.0);

		// 100 um from the origin is 600 device um, or 3840 steps. The move is
		// short, so no speed query follows the position query.
		reply(&mut stage, command::SET_CURRENT_POSITION, 3800);
		reply(&mut stage, command::MOVE_ABSOLUTE, 3840);
		stage.set_position_um(100.0).unwrap();
		assert!(written(&stage).ends_with(&binary::encode(1, command::MOVE_ABSOLUTE, 3840)));

		reply(&mut stage, command::SET_MINIMUM_POSITION, 0);
		reply(&mut stage, command::SET_MAXIMUM_POSITION, 6400);
		assert_eq!(stage.limits_um().unwrap(), (-500.0, 500.0));

		// Relative moves ignore the origin.
		stage.dispatcher_mut().transport_mut().backend_mut().clear_written();
		reply(&mut stage, command::MOVE_RELATIVE, 0);
		stage.set_relative_position_um(10.0).unwrap();
		assert_eq!(written(&stage), binary::encode(1, command::MOVE_RELATIVE, 64));
	}

	#[test]
	fn set_origin_zeroes_the_position() {
		let mut stage = open_mock(2, 1).unwrap();
		reply(&mut stage, command::SET_CURRENT_POSITION, 0);
		stage.set_origin().unwrap();
		assert_eq!(written(&stage), [2, 45, 0, 0, 0, 0]);

		let err = stage.set_origin().unwrap_err();
		assert!(matches!(err, StageError::SettingFailed(_)));
	}

	#[test]
	fn home_timeout_passes_through() {
		let mut stage = open_mock(1, 1).unwrap();
		stage.set_home_timeout(Duration::from_secs(1));
		assert_eq!(stage.home_timeout(), Duration::from_secs(1));
		assert_eq!(stage.dispatcher().home_timeout(), Duration::from_secs(1));
		assert!(stage.home().unwrap_err().is_timeout());
		assert!(stage.dispatcher().transport().clock().elapsed() >= Duration::from_secs(1));
	}

	#[test]
	fn relative_move_in_um() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::MOVE_RELATIVE, 0);
		stage.set_relative_position_um(-10.0).unwrap();
		assert_eq!(written(&stage), binary::encode(1, command::MOVE_RELATIVE, -64));
	}

	#[test]
	fn velocity_in_mm_per_s() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::MOVE_AT_CONSTANT_SPEED, 10_486);
		stage.move_velocity(1.0).unwrap();
		assert_eq!(
			written(&stage),
			binary::encode(1, command::MOVE_AT_CONSTANT_SPEED, 10_486)
		);
	}

	#[test]
	fn limits_in_um() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::SET_MINIMUM_POSITION, 0);
		reply(&mut stage, command::SET_MAXIMUM_POSITION, 6400 * 25);
		assert_eq!(stage.limits_um().unwrap(), (0.0, 25_000.0));
	}

	#[test]
	fn speed_and_acceleration() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::SET_TARGET_SPEED, 20_972);
		stage.set_speed_mm_per_s(2.0).unwrap();
		assert_eq!(
			written(&stage),
			binary::encode(1, command::SET_TARGET_SPEED, 20_972)
		);

		reply(&mut stage, command::SET_TARGET_SPEED, 20_972);
		assert!((stage.speed_mm_per_s().unwrap() - 2.0).abs() < 1e-3);

		reply(&mut stage, command::SET_ACCELERATION, 100);
		stage.set_acceleration(100).unwrap();
		reply(&mut stage, command::SET_ACCELERATION, 100);
		assert_eq!(stage.acceleration().unwrap(), 100);
	}

	#[test]
	fn failed_setting_is_reported() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::ERROR, 14);
		let err = stage.set_speed_mm_per_s(-1.0).unwrap_err();
		assert!(matches!(err, StageError::SettingFailed(_)));
	}

	#[test]
	fn stop_home_and_busy() {
		let mut stage = open_mock(1, 1).unwrap();
		reply(&mut stage, command::STOP, 777);
		reply(&mut stage, command::HOME, 0);
		assert_eq!(stage.stop().unwrap(), 777);
		stage.home().unwrap();
		assert!(!stage.is_busy());
		assert_eq!(written(&stage), [1, 23, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0]);
	}

	#[test]
	fn timeout_surfaces() {
		let mut stage = open_mock(1, 1).unwrap();
		let err = stage.position_steps().unwrap_err();
		assert!(err.is_timeout());
	}
}
