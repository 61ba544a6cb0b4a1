//! Utilities for BSP data that don't warrant their own modules.

use std::str::FromStr;

use glam::{I16Vec3, Vec3};
use hlbsp_macros::BspValue;

use crate::{
	reader::{BspByteReader, BspValue},
	BspParseError, BspResult,
};

/// Fixed-sized UTF-8 string. Zero-padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize> {
	data: [u8; N],
}

impl<const N: usize> BspValue for FixedStr<N> {
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		let data = reader.read()?;
		Self::new(data).map_err(BspParseError::map_utf8_error(&data))
	}
	#[inline]
	fn bsp_struct_size() -> usize {
		N
	}
}

impl<const N: usize> FixedStr<N> {
	pub fn new(data: [u8; N]) -> Result<Self, std::str::Utf8Error> {
		let mut cleaned = [0; N];
		let mut len = 0;
		for &byte in &data {
			// Clear any garbage after the '\0' terminator, and strip control characters some
			// compilers leave in texture names.
			if byte == 0 {
				break;
			}
			if byte < 0x20 || byte == 0x7F {
				continue;
			}
			cleaned[len] = byte;
			len += 1;
		}
		std::str::from_utf8(&cleaned[..len])?;
		Ok(Self { data: cleaned })
	}

	pub fn as_str(&self) -> &str {
		// SAFETY: This is checked when a FixedStr is created
		unsafe { std::str::from_utf8_unchecked(&self.data) }.trim_end_matches('\0')
	}
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.as_str().fmt(f)
	}
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.as_str().fmt(f)
	}
}

impl<const N: usize> FromStr for FixedStr<N> {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() > N {
			return Err(());
		}
		let mut data = [0; N];

		#[allow(clippy::manual_memcpy)]
		for i in 0..s.len() {
			data[i] = s.as_bytes()[i];
		}

		Ok(Self { data })
	}
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BoundingBox {
	pub min: Vec3,
	pub max: Vec3,
}

/// The 16-bit bounding box nodes and leaves are compiled with.
#[derive(BspValue, Debug, Clone, Copy)]
pub struct ShortBoundingBox {
	pub min: I16Vec3,
	pub max: I16Vec3,
}

impl ShortBoundingBox {
	/// Inclusive containment test. Compilers do not guarantee `min <= max` per axis, so either
	/// corner ordering is accepted.
	pub fn contains(&self, point: Vec3) -> bool {
		let (min, max) = (self.min.as_vec3(), self.max.as_vec3());

		(min.cmple(point).all() && point.cmple(max).all()) || (min.cmpge(point).all() && point.cmpge(max).all())
	}
}

impl From<ShortBoundingBox> for BoundingBox {
	fn from(value: ShortBoundingBox) -> Self {
		Self {
			min: value.min.as_vec3(),
			max: value.max.as_vec3(),
		}
	}
}

/// Displays bytes in string form if they make up a string, else just displays them as bytes.
pub(crate) fn display_magic_number(bytes: &[u8]) -> String {
	std::str::from_utf8(bytes).map(str::to_owned).unwrap_or(format!("{bytes:?}"))
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use glam::{vec3, I16Vec3};

	use super::{FixedStr, ShortBoundingBox};

	#[test]
	fn fixed_str_from_str() {
		assert!(FixedStr::<8>::from_str("12345678").is_ok());
		assert!(FixedStr::<8>::from_str("123456789").is_err());
	}

	#[test]
	fn fixed_str_from_null_garbage() {
		let name = FixedStr::<8>::new([b'+', b's', b'k', b'y', 0, b'+', b'v', 189]).unwrap();
		assert_eq!(name.as_str(), "+sky");
	}

	#[test]
	fn fixed_str_strips_control_characters() {
		let name = FixedStr::<8>::new([b'a', 0x08, b'b', 0, 0, 0, 0, 0]).unwrap();
		assert_eq!(name.as_str(), "ab");
	}

	#[test]
	fn short_box_accepts_either_corner_ordering() {
		let forward = ShortBoundingBox {
			min: I16Vec3::new(-16, -16, -16),
			max: I16Vec3::new(16, 16, 16),
		};
		let reversed = ShortBoundingBox {
			min: forward.max,
			max: forward.min,
		};

		assert!(forward.contains(vec3(0., 0., 0.)));
		assert!(reversed.contains(vec3(0., 0., 0.)));
		assert!(!forward.contains(vec3(0., 0., 32.)));
		assert!(!reversed.contains(vec3(0., 0., 32.)));
	}
}
