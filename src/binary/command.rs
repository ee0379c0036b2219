//! Binary command codes.
//!
//! See the [Zaber Binary protocol](https://www.zaber.com/protocol-manual?protocol=Binary#topic_quick_command_reference)
//! documentation for a detailed description of each. Only the commands this
//! driver issues are listed, plus the [`ERROR`] sentinel that devices reply
//! with when a command fails.

/// Define a `u8` constant for each command and a [`name`] lookup for all of them.
///
/// Each command is given as `value: Name Words`, where the words are
/// concatenated into the constant's name.
macro_rules! define_commands {
	// Entry point.
	//
	// Serves to concatenate the parts of the name before defining the constants.
	(
		$(
			$value:literal: $($name_word:ident)+
		),+
		$(,)?
	) => {
		paste::paste! {
			define_commands!{@with_concatenated_name
				$(
					$value: $($name_word)+, [< $($name_word:camel)+ >]
				),+
			}
		}
	};
	(@with_concatenated_name
		$(
			$value:literal: $($name_word:ident)+, $name:ident
		),+
	) => {
		paste::paste! {
			$(
				#[doc = "The " $($name_word " ")+ "command (`" $value "`)."]
				pub const [< $name:snake:upper >]: u8 = $value;
			)+

			/// Get the name of a command.
			///
			/// Returns None if the command is not recognized.
			pub const fn name(command: u8) -> Option<&'static str> {
				match command {
					$(
						$value => Some(stringify!($($name_word)+)),
					)+
					_ => None,
				}
			}
		}
	};
}

define_commands! {
	1: Home,
	2: Renumber,
	20: Move Absolute,
	21: Move Relative,
	22: Move At Constant Speed,
	23: Stop,
	37: Set Microstep Resolution,
	38: Set Running Current,
	39: Set Hold Current,
	41: Set Home Speed,
	42: Set Target Speed,
	43: Set Acceleration,
	44: Set Maximum Position,
	45: Set Current Position,
	50: Return Device Id,
	106: Set Minimum Position,
	255: Error,
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn command_values() {
		assert_eq!(HOME, 1);
		assert_eq!(MOVE_AT_CONSTANT_SPEED, 22);
		assert_eq!(SET_CURRENT_POSITION, 45);
		assert_eq!(ERROR, 255);
	}

	#[test]
	fn command_names() {
		assert_eq!(name(MOVE_ABSOLUTE), Some("Move Absolute"));
		assert_eq!(name(SET_MINIMUM_POSITION), Some("Set Minimum Position"));
		assert_eq!(name(200), None);
	}
}
