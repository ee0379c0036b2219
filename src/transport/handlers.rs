//! Event handlers for transports.
#[cfg(doc)]
use super::Transport;

/// The direction a frame travelled in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
	/// Transmitted to the device.
	Tx,
	/// Received from the device.
	Rx,
}

/// An event handler that is called after a frame is either transmitted or received.
///
/// See [`Transport::set_packet_handler`] for more details.
pub type PacketHandler = Box<dyn FnMut(&[u8], Direction) + Send>;

/// Implementation detail.
///
/// The collection of event handlers installed on a transport.
#[derive(Default)]
pub struct Handlers {
	pub(super) packet: Option<PacketHandler>,
}

impl Handlers {
	/// Notify the packet handler, if there is one.
	pub(super) fn packet(&mut self, frame: &[u8], direction: Direction) {
		if let Some(handler) = self.packet.as_mut() {
			handler(frame, direction);
		}
	}
}

impl std::fmt::Debug for Handlers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Handlers").finish_non_exhaustive()
	}
}
