//! Longitudinal redundancy checks for ASCII messages.

/// A Longitudinal Redundancy Check hasher.
#[derive(Debug, Default)]
pub(crate) struct Lrc {
	/// The hash value
	sum: u32,
}

impl Lrc {
	/// Update the Lrc with the specified bytes.
	pub fn update(&mut self, bytes: &[u8]) {
		for byte in bytes {
			self.sum = (self.sum + u32::from(*byte)) & 0xFF;
		}
	}

	/// Finish calculating the Lrc hash.
	pub fn finish(&self) -> u8 {
		(((self.sum ^ 0xFF) + 1) & 0xFF) as u8
	}

	/// Calculate the hash of `input` in one go.
	pub fn hash(input: &[u8]) -> u8 {
		let mut lrc = Lrc::default();
		lrc.update(input);
		lrc.finish()
	}

	/// Verify if the hash matches the input.
	pub fn verify(input: &[u8], hash: u8) -> bool {
		let sum: u32 = input.iter().fold(0u32, |sum, b| u32::from(*b) + sum);
		0 == ((sum + u32::from(hash)) & 0xFF)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn known_hash() {
		assert!(Lrc::verify(b"01 tools echo", 143));
		assert!(!Lrc::verify(b"01 tools echo", 142));
		assert_eq!(Lrc::hash(b"01 tools echo"), 143);
	}

	#[test]
	fn incremental_matches_one_shot() {
		let mut lrc = Lrc::default();
		lrc.update(b"1 1 ");
		lrc.update(b"move abs 1000");
		assert_eq!(lrc.finish(), Lrc::hash(b"1 1 move abs 1000"));
		assert!(Lrc::verify(b"1 1 move abs 1000", lrc.finish()));
	}
}
