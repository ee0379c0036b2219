//! Executing requests against a device, one exchange at a time.
//!
//! A [`Dispatcher`] owns a [`Transport`] and a [`Protocol`] engine and maps
//! semantic operations (read a setting, start a move, stop, home, ...) onto
//! single request/response exchanges. Exactly one exchange is in flight at a
//! time: each call sends its request, optionally sleeps, and then waits for the
//! response (or the response deadline) before returning.
//!
//! ```no_run
//! use zstage::dispatch::Dispatcher;
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dispatcher = Dispatcher::open_serial("/dev/ttyUSB0")?;
//! dispatcher.clear()?;
//! let position = dispatcher.get_setting(1, 1, "pos")?;
//! dispatcher.move_absolute(1, 1, position + 10_000)?;
//! # Ok(())
//! # }
//! ```

use crate::{
	backend::{Backend, Serial},
	binary::{self, Binary},
	clock::{Clock, SystemClock},
	error::{DispatchError, SettingFailedError, UnknownSettingError},
	protocol::{Instruction, Motion, Protocol, Request},
	setting::{self, Setting, SettingRegistry, SETTINGS},
	timing::{self, MotionConfig},
	transport::{Transport, DEFAULT_TIMEOUT, POLL_INTERVAL},
};
use serialport as sp;
use std::{
	io,
	net::{TcpStream, ToSocketAddrs},
	time::Duration,
};

/// How long to wait for the reply to a Binary home by default.
///
/// Binary devices only reply once homing is done, which takes far longer than
/// an ordinary response.
pub const DEFAULT_HOME_TIMEOUT: Duration = Duration::from_secs(20);

/// Options for configuring and opening a serial port.
///
/// ## Example
///
/// ```rust
/// # use zstage::dispatch::OpenSerialOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut dispatcher = OpenSerialOptions::new()
///     .timeout(Duration::from_secs(1))
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenSerialOptions {
	/// The custom baud rate, if any
	baud_rate: Option<u32>,
	/// The response deadline
	timeout: Duration,
	/// The deadline for the reply to a home
	home_timeout: Duration,
	/// The motion timing constants
	motion: MotionConfig,
}

impl OpenSerialOptions {
	/// Create a blank set of options ready for configuration.
	///
	/// By default the protocol's usual baud rate, a 500 ms response deadline
	/// and the default [`MotionConfig`] are used.
	///
	/// Equivalent to [`default`](OpenSerialOptions::default).
	pub fn new() -> Self {
		OpenSerialOptions {
			baud_rate: None,
			timeout: DEFAULT_TIMEOUT,
			home_timeout: DEFAULT_HOME_TIMEOUT,
			motion: MotionConfig::default(),
		}
	}

	/// Set a custom baud rate.
	pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
		self.baud_rate = Some(baud_rate);
		self
	}

	/// Set a custom response deadline.
	pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
		self.timeout = timeout;
		self
	}

	/// Set how long to wait for the reply to a home.
	///
	/// Only protocols that reply once motion is done use it.
	pub fn home_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.home_timeout = timeout;
		self
	}

	/// Set the constants used to estimate how long moves take.
	pub fn motion(&mut self, motion: MotionConfig) -> &mut Self {
		self.motion = motion;
		self
	}

	/// Open a [`Serial`] port configured for the protocol `P` at the specified path.
	fn open_serial_port<P: Protocol>(&self, path: &str) -> Result<Serial, DispatchError> {
		// The baud rate passed to `new` is ignored by some platforms, so it is
		// set again with the builder below.
		sp::new(path, P::DEFAULT_BAUD_RATE)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.timeout(POLL_INTERVAL)
			.baud_rate(self.baud_rate.unwrap_or(P::DEFAULT_BAUD_RATE))
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}

	/// Wrap an opened backend in a dispatcher.
	fn build<B: Backend, P: Protocol>(&self, backend: B, protocol: P) -> Dispatcher<B, SystemClock, P> {
		let mut transport = Transport::new(backend);
		transport.set_timeout(self.timeout);
		let mut dispatcher = Dispatcher::from_transport(transport, protocol);
		dispatcher.set_motion_config(self.motion);
		dispatcher.set_home_timeout(self.home_timeout);
		dispatcher
	}

	/// Open the port at the specified path with the custom options, using
	/// the Binary protocol.
	pub fn open(&self, path: &str) -> Result<Dispatcher<Serial>, DispatchError> {
		self.open_with(path, Binary)
	}

	/// Open the port at the specified path with the custom options, using
	/// the specified protocol.
	pub fn open_with<P: Protocol>(
		&self,
		path: &str,
		protocol: P,
	) -> Result<Dispatcher<Serial, SystemClock, P>, DispatchError> {
		Ok(self.build(self.open_serial_port::<P>(path)?, protocol))
	}

	/// Open the port at the specified path with the custom options.
	///
	/// The type of the underlying backend is erased via dynamic dispatch,
	/// which does have runtime overhead. [`open`](OpenSerialOptions::open)
	/// should generally be used instead, except when the type of the underlying
	/// backend may not be known at compile time.
	pub fn open_dyn(&self, path: &str) -> Result<Dispatcher<Box<dyn Backend>>, DispatchError> {
		let backend: Box<dyn Backend> = Box::new(self.open_serial_port::<Binary>(path)?);
		Ok(self.build(backend, Binary))
	}
}

impl Default for OpenSerialOptions {
	fn default() -> Self {
		OpenSerialOptions::new()
	}
}

/// Options for configuring and opening a TCP connection, such as to a
/// serial-to-ethernet bridge.
///
/// ## Example
///
/// ```rust
/// # use zstage::dispatch::OpenTcpOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut dispatcher = OpenTcpOptions::new()
///     .timeout(Duration::from_secs(1))
///     .open("192.168.0.1:55550")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenTcpOptions {
	/// The response deadline
	timeout: Duration,
	/// The deadline for the reply to a home
	home_timeout: Duration,
	/// The motion timing constants
	motion: MotionConfig,
}

impl OpenTcpOptions {
	/// Create a blank set of options ready for configuration.
	///
	/// Equivalent to [`default`](OpenTcpOptions::default).
	pub fn new() -> Self {
		OpenTcpOptions {
			timeout: DEFAULT_TIMEOUT,
			home_timeout: DEFAULT_HOME_TIMEOUT,
			motion: MotionConfig::default(),
		}
	}

	/// Set a custom response deadline.
	pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
		self.timeout = timeout;
		self
	}

	/// Set how long to wait for the reply to a home.
	///
	/// Only protocols that reply once motion is done use it.
	pub fn home_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.home_timeout = timeout;
		self
	}

	/// Set the constants used to estimate how long moves take.
	pub fn motion(&mut self, motion: MotionConfig) -> &mut Self {
		self.motion = motion;
		self
	}

	/// Open a [`TcpStream`] at the specified address.
	fn open_tcp_stream<A: ToSocketAddrs>(&self, address: A) -> io::Result<TcpStream> {
		let stream = TcpStream::connect(address)?;
		stream.set_read_timeout(Some(POLL_INTERVAL))?;
		Ok(stream)
	}

	/// Open a connection to the specified address, using the Binary protocol.
	pub fn open<A: ToSocketAddrs>(&self, address: A) -> io::Result<Dispatcher<TcpStream>> {
		self.open_with(address, Binary)
	}

	/// Open a connection to the specified address, using the specified protocol.
	pub fn open_with<A: ToSocketAddrs, P: Protocol>(
		&self,
		address: A,
		protocol: P,
	) -> io::Result<Dispatcher<TcpStream, SystemClock, P>> {
		let mut transport = Transport::new(self.open_tcp_stream(address)?);
		transport.set_timeout(self.timeout);
		let mut dispatcher = Dispatcher::from_transport(transport, protocol);
		dispatcher.set_motion_config(self.motion);
		dispatcher.set_home_timeout(self.home_timeout);
		Ok(dispatcher)
	}
}

impl Default for OpenTcpOptions {
	fn default() -> Self {
		OpenTcpOptions::new()
	}
}

/// Drives request/response exchanges with devices on one link.
///
/// The dispatcher is generic over the backend `B`, the clock `C` used for
/// deadlines and delays, and the protocol engine `P`.
#[derive(Debug)]
pub struct Dispatcher<B, C = SystemClock, P = Binary> {
	/// The link to the devices
	transport: Transport<B, C>,
	/// The wire protocol engine
	protocol: P,
	/// Where setting names are resolved
	settings: &'static SettingRegistry,
	/// The constants used to estimate how long moves take
	motion: MotionConfig,
	/// How long to wait for the reply to a home
	home_timeout: Duration,
}

impl Dispatcher<Serial> {
	/// Open the serial port at the specified path using the default options.
	///
	/// Alternatively, use [`OpenSerialOptions`] to customize how the port is opened.
	pub fn open_serial(path: &str) -> Result<Self, DispatchError> {
		OpenSerialOptions::new().open(path)
	}
}

impl Dispatcher<TcpStream> {
	/// Connect to the specified address using the default options.
	///
	/// Alternatively, use [`OpenTcpOptions`] to customize how the connection is opened.
	pub fn open_tcp<A: ToSocketAddrs>(address: A) -> io::Result<Self> {
		OpenTcpOptions::new().open(address)
	}
}

impl<B: Backend> Dispatcher<B> {
	/// Create a Binary dispatcher over an already opened backend.
	pub fn new(backend: B) -> Self {
		Dispatcher::from_transport(Transport::new(backend), Binary)
	}
}

impl<B: Backend, C: Clock, P: Protocol> Dispatcher<B, C, P> {
	/// Create a dispatcher from a transport and a protocol engine.
	pub fn from_transport(transport: Transport<B, C>, protocol: P) -> Self {
		Dispatcher {
			transport,
			protocol,
			settings: &SETTINGS,
			motion: MotionConfig::default(),
			home_timeout: DEFAULT_HOME_TIMEOUT,
		}
	}

	/// Get the underlying transport.
	pub fn transport(&self) -> &Transport<B, C> {
		&self.transport
	}

	/// Get the underlying transport mutably.
	pub fn transport_mut(&mut self) -> &mut Transport<B, C> {
		&mut self.transport
	}

	/// Consume the dispatcher and return the underlying transport.
	pub fn into_transport(self) -> Transport<B, C> {
		self.transport
	}

	/// Get the protocol engine.
	pub fn protocol(&self) -> &P {
		&self.protocol
	}

	/// Get the constants used to estimate how long moves take.
	pub fn motion_config(&self) -> MotionConfig {
		self.motion
	}

	/// Set the constants used to estimate how long moves take.
	pub fn set_motion_config(&mut self, motion: MotionConfig) {
		self.motion = motion;
	}

	/// Get how long [`home`](Dispatcher::home) waits for its reply under
	/// protocols that reply once motion is done.
	pub fn home_timeout(&self) -> Duration {
		self.home_timeout
	}

	/// Set how long [`home`](Dispatcher::home) waits for its reply under
	/// protocols that reply once motion is done.
	pub fn set_home_timeout(&mut self, timeout: Duration) {
		self.home_timeout = timeout;
	}

	/// Discard any stale bytes waiting on the link.
	///
	/// Call this once when the link is set up. It returns the number of
	/// bytes discarded.
	pub fn clear(&mut self) -> Result<usize, DispatchError> {
		Ok(self.transport.clear()?)
	}

	/// Execute a single request/response exchange.
	///
	/// The request is encoded and sent. If `delay` is non-zero the caller is
	/// suspended for that long, then the response is read (bounded by the
	/// transport's deadline) and decoded into its signed data. Frames that do
	/// not answer this request are dropped while waiting.
	pub fn execute(&mut self, request: &Request, delay: Duration) -> Result<i32, DispatchError> {
		let timeout = self.transport.timeout();
		self.execute_within(request, delay, timeout)
	}

	/// Like [`execute`](Dispatcher::execute), but wait at most `timeout` for
	/// the response.
	fn execute_within(
		&mut self,
		request: &Request,
		delay: Duration,
		timeout: Duration,
	) -> Result<i32, DispatchError> {
		let bytes = self.protocol.encode(request);
		self.exchange(&bytes, delay, timeout, |protocol, frame| {
			protocol.is_reply(request, frame)
		})
	}

	/// Send already encoded bytes and decode the first response `accept`
	/// approves of.
	fn exchange<A>(
		&mut self,
		bytes: &[u8],
		delay: Duration,
		timeout: Duration,
		accept: A,
	) -> Result<i32, DispatchError>
	where
		A: Fn(&P, &[u8]) -> bool,
	{
		self.transport.send(bytes)?;
		if !delay.is_zero() {
			log::debug!("sleeping {} ms before reading the reply", delay.as_millis());
			self.transport.sleep(delay);
		}
		let protocol = &self.protocol;
		let frame = self.transport.receive_reply(
			timeout,
			|received| protocol.frame_len(received),
			|frame| accept(protocol, frame),
		)?;
		let reply = self.protocol.decode(&frame);
		if let Err(DispatchError::Device(ref e)) = reply {
			log::debug!("{e}");
		}
		reply
	}

	/// Resolve a setting name.
	fn lookup(&self, name: &str) -> Result<Setting, UnknownSettingError> {
		self.settings
			.get(name)
			.ok_or_else(|| UnknownSettingError::new(name))
	}

	/// Read the named setting.
	///
	/// An unknown name is reported as [`DispatchError::UnknownSetting`]
	/// without contacting the device.
	pub fn get_setting(&mut self, device: u8, axis: u8, name: &str) -> Result<i32, DispatchError> {
		let setting = self.lookup(name)?;
		self.execute(
			&Request::new(device, axis, Instruction::Get(setting)),
			Duration::ZERO,
		)
	}

	/// Change the named setting and return the device's reply.
	///
	/// If the exchange fails for any reason the error is reported as
	/// [`DispatchError::SettingFailed`]; the underlying cause is not kept.
	/// An unknown name is still reported as [`DispatchError::UnknownSetting`].
	pub fn set_setting(
		&mut self,
		device: u8,
		axis: u8,
		name: &str,
		value: i32,
	) -> Result<i32, DispatchError> {
		let setting = self.lookup(name)?;
		self.execute(
			&Request::new(device, axis, Instruction::Set(setting, value)),
			Duration::ZERO,
		)
		.map_err(|e| {
			log::debug!("setting `{}` to {} failed: {}", setting.name(), value, e);
			SettingFailedError::new(setting.name()).into()
		})
	}

	/// Estimate how long to sleep after sending a move.
	fn motion_delay(
		&mut self,
		device: u8,
		axis: u8,
		motion: Motion,
		value: i32,
	) -> Result<Duration, DispatchError> {
		let current = match motion {
			Motion::Absolute => self.get_setting(device, axis, setting::POSITION)?,
			Motion::Relative | Motion::Velocity => 0,
		};
		let travel = timing::travel(motion, value, current);
		if travel <= timing::MIN_TRAVEL {
			return Ok(Duration::ZERO);
		}
		let raw_speed = self.get_setting(device, axis, setting::MAX_SPEED)?;
		let speed = self.motion.speed_um_per_ms(raw_speed);
		log::trace!("travel {travel} steps at {speed} um/ms");
		Ok(timing::post_send_delay(travel, speed))
	}

	/// Start a move and return the device's reply.
	fn start_move(
		&mut self,
		device: u8,
		axis: u8,
		motion: Motion,
		value: i32,
	) -> Result<i32, DispatchError> {
		let delay = if P::REPLIES_AFTER_MOTION {
			self.motion_delay(device, axis, motion, value)?
		} else {
			Duration::ZERO
		};
		self.execute(
			&Request::new(device, axis, Instruction::Move(motion, value)),
			delay,
		)
	}

	/// Move to an absolute position, in steps.
	///
	/// With protocols that only reply once the move is done, the current
	/// position and the device's speed are read first to estimate how long to
	/// wait before reading the reply. The returned value is the device's reply
	/// (the final position, for Binary).
	pub fn move_absolute(&mut self, device: u8, axis: u8, position: i32) -> Result<i32, DispatchError> {
		self.start_move(device, axis, Motion::Absolute, position)
	}

	/// Move by a signed distance, in steps.
	///
	/// See [`move_absolute`](Dispatcher::move_absolute) for how the reply is awaited.
	pub fn move_relative(&mut self, device: u8, axis: u8, distance: i32) -> Result<i32, DispatchError> {
		self.start_move(device, axis, Motion::Relative, distance)
	}

	/// Move at a constant signed speed, in device speed units.
	pub fn move_velocity(&mut self, device: u8, axis: u8, speed: i32) -> Result<i32, DispatchError> {
		self.start_move(device, axis, Motion::Velocity, speed)
	}

	/// Stop any motion.
	///
	/// Binary devices reply with the position they stopped at. ASCII devices
	/// reply without data, so `0` is returned.
	pub fn stop(&mut self, device: u8, axis: u8) -> Result<i32, DispatchError> {
		self.execute(&Request::new(device, axis, Instruction::Stop), Duration::ZERO)
	}

	/// Move to the home position.
	///
	/// Under protocols that only reply once motion is done, the reply is
	/// awaited for [`home_timeout`](Dispatcher::home_timeout) rather than the
	/// usual response deadline.
	pub fn home(&mut self, device: u8, axis: u8) -> Result<i32, DispatchError> {
		let timeout = if P::REPLIES_AFTER_MOTION {
			self.home_timeout
		} else {
			self.transport.timeout()
		};
		self.execute_within(
			&Request::new(device, axis, Instruction::Home),
			Duration::ZERO,
			timeout,
		)
	}

	/// Get the device's id.
	pub fn identify(&mut self, device: u8) -> Result<i32, DispatchError> {
		self.execute(&Request::new(device, 0, Instruction::Identify), Duration::ZERO)
	}

	/// Whether the device is moving.
	///
	/// These devices do not report a reliable busy signal, so this always
	/// returns `false` without contacting the device.
	pub fn is_busy(&self, _device: u8) -> bool {
		false
	}

	/// Get the travel limits, as `(min, max)` in steps.
	///
	/// The minimum is always read before the maximum.
	pub fn get_limits(&mut self, device: u8, axis: u8) -> Result<(i32, i32), DispatchError> {
		let min = self.get_setting(device, axis, setting::LIMIT_MIN)?;
		let max = self.get_setting(device, axis, setting::LIMIT_MAX)?;
		Ok((min, max))
	}
}

impl<B: Backend, C: Clock> Dispatcher<B, C, Binary> {
	/// Execute a raw Binary command.
	///
	/// This is the primitive every Binary operation is built on and can be
	/// used to send commands that have no dedicated method.
	///
	/// ```
	/// # use zstage::{binary::command, dispatch::Dispatcher, backend::Backend};
	/// # use std::time::Duration;
	/// # fn wrapper<B: Backend>(dispatcher: &mut Dispatcher<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// let id = dispatcher.execute_command(1, command::RETURN_DEVICE_ID, 0, Duration::ZERO)?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn execute_command(
		&mut self,
		device: u8,
		command: u8,
		payload: i32,
		delay: Duration,
	) -> Result<i32, DispatchError> {
		let frame = binary::encode(device, command, i64::from(payload));
		let timeout = self.transport.timeout();
		self.exchange(&frame, delay, timeout, move |_, reply| {
			binary::is_reply_to(device, command, reply)
		})
	}
}
