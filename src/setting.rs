//! The registry of named device settings.
//!
//! Each [`Setting`] pairs the name used by the ASCII protocol (and by the
//! host) with the Binary command code that reads or writes it. The registry is
//! a fixed `static` table, so it is safe to share between any number of links.
//!
//! ```
//! use zstage::setting::{self, SETTINGS};
//!
//! let speed = SETTINGS.get(setting::MAX_SPEED).unwrap();
//! assert_eq!(speed.command(), 42);
//! assert!(SETTINGS.get("no.such.setting").is_none());
//! ```

use crate::binary::command;

/// The microstep resolution.
pub const RESOLUTION: &str = "resolution";
/// The current position, in steps.
pub const POSITION: &str = "pos";
/// The target speed for moves.
pub const MAX_SPEED: &str = "maxspeed";
/// The acceleration for moves.
pub const ACCELERATION: &str = "accel";
/// The minimum position, in steps.
pub const LIMIT_MIN: &str = "limit.min";
/// The maximum position, in steps.
pub const LIMIT_MAX: &str = "limit.max";
/// The running current.
pub const RUN_CURRENT: &str = "driver.current.run";
/// The holding current.
pub const HOLD_CURRENT: &str = "driver.current.hold";
/// The speed used when homing.
pub const HOME_SPEED: &str = "limit.home.speed";

/// A named device setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Setting {
	name: &'static str,
	command: u8,
}

impl Setting {
	/// Create a new setting.
	pub const fn new(name: &'static str, command: u8) -> Self {
		Setting { name, command }
	}

	/// The setting's name.
	pub const fn name(&self) -> &'static str {
		self.name
	}

	/// The Binary command code used to access the setting.
	pub const fn command(&self) -> u8 {
		self.command
	}
}

/// A read-only table of settings.
#[derive(Debug)]
pub struct SettingRegistry {
	entries: &'static [Setting],
}

impl SettingRegistry {
	/// Create a registry from a fixed table.
	pub const fn new(entries: &'static [Setting]) -> Self {
		SettingRegistry { entries }
	}

	/// Look up a setting by name.
	pub fn get(&self, name: &str) -> Option<Setting> {
		self.entries
			.iter()
			.find(|setting| setting.name == name)
			.copied()
	}

	/// Iterate over all settings in the registry.
	pub fn iter(&self) -> impl Iterator<Item = &Setting> {
		self.entries.iter()
	}
}

/// The entries of [`SETTINGS`].
const STANDARD: &[Setting] = &[
	Setting::new(RESOLUTION, command::SET_MICROSTEP_RESOLUTION),
	Setting::new(POSITION, command::SET_CURRENT_POSITION),
	Setting::new(MAX_SPEED, command::SET_TARGET_SPEED),
	Setting::new(ACCELERATION, command::SET_ACCELERATION),
	Setting::new(LIMIT_MIN, command::SET_MINIMUM_POSITION),
	Setting::new(LIMIT_MAX, command::SET_MAXIMUM_POSITION),
	Setting::new(RUN_CURRENT, command::SET_RUNNING_CURRENT),
	Setting::new(HOLD_CURRENT, command::SET_HOLD_CURRENT),
	Setting::new(HOME_SPEED, command::SET_HOME_SPEED),
];

/// The standard settings understood by Zaber stages.
pub static SETTINGS: SettingRegistry = SettingRegistry::new(STANDARD);

#[cfg(test)]
mod test {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn standard_commands() {
		let command_of = |name| SETTINGS.get(name).unwrap().command();
		assert_eq!(command_of(RESOLUTION), 37);
		assert_eq!(command_of(POSITION), 45);
		assert_eq!(command_of(MAX_SPEED), 42);
		assert_eq!(command_of(ACCELERATION), 43);
		assert_eq!(command_of(LIMIT_MIN), 106);
		assert_eq!(command_of(LIMIT_MAX), 44);
	}

	#[test]
	fn names_and_commands_are_unique() {
		let names: HashSet<_> = SETTINGS.iter().map(Setting::name).collect();
		let commands: HashSet<_> = SETTINGS.iter().map(Setting::command).collect();
		assert_eq!(names.len(), SETTINGS.iter().count());
		assert_eq!(commands.len(), SETTINGS.iter().count());
	}

	#[test]
	fn unknown_names() {
		assert_eq!(SETTINGS.get("Pos"), None);
		assert_eq!(SETTINGS.get(""), None);
	}
}
