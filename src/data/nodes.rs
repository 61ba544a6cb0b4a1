//! Data definitions for the BSP node tree, the collision hulls and the leaves they bottom out in.

use hlbsp_macros::BspValue;

use crate::{
	data::util::ShortBoundingBox,
	reader::{BspByteReader, BspValue},
	BspResult,
};

/// A reference to a [BspNode]. Stored as an `i16`: non-negative values index the node table, and
/// negative values are the *bitwise complement* (not the negation) of a leaf index, so that leaf 0
/// stays distinguishable. `-1` decodes to leaf 0, the shared solid leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BspNodeRef {
	Node(u32),
	Leaf(u32),
}

impl BspNodeRef {
	pub fn from_i16(value: i16) -> Self {
		if value.is_negative() {
			// Bitwise not handles integer asymmetry and overflow.
			Self::Leaf(!value as u32)
		} else {
			Self::Node(value as u32)
		}
	}

	/// If this reference points to a node, get the index of the node.
	pub fn node(&self) -> Option<u32> {
		match *self {
			Self::Node(i) => Some(i),
			Self::Leaf(_) => None,
		}
	}

	/// If this reference points to a leaf, get the index of the leaf. Note that `Some(0)` is the
	/// solid leaf.
	pub fn leaf(&self) -> Option<u32> {
		match *self {
			Self::Leaf(i) => Some(i),
			Self::Node(_) => None,
		}
	}
}

impl BspValue for BspNodeRef {
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		Ok(Self::from_i16(reader.read()?))
	}
	fn bsp_struct_size() -> usize {
		size_of::<i16>()
	}
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspNode {
	/// Index of the [BspPlane](super::bsp::BspPlane) that splits the node.
	pub plane_idx: u32,

	pub front: BspNodeRef,
	pub back: BspNodeRef,

	/// Bounding box of the node and all its children.
	pub bound: ShortBoundingBox,
	/// Index of the first [BspFace](super::bsp::BspFace) the node contains.
	pub face_idx: u16,
	/// Number of faces this node contains.
	pub face_num: u16,
}

/// A reference to a [BspClipNode]. Negative stored values are not leaves: the collision hulls
/// bottom out directly in a contents value (`-1` empty, `-2` solid).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipNodeRef {
	Node(u32),
	Contents(BspLeafContents),
}

impl BspValue for ClipNodeRef {
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		let value: i16 = reader.read()?;
		if value.is_negative() {
			BspLeafContents::bsp_parse(&mut BspByteReader::new(&(value as i32).to_le_bytes())).map(Self::Contents)
		} else {
			Ok(Self::Node(value as u32))
		}
	}
	fn bsp_struct_size() -> usize {
		size_of::<i16>()
	}
}

/// Used for collision rather than rendering, so there is no bounding box.
#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspClipNode {
	/// Index of the [BspPlane](super::bsp::BspPlane) that splits the clip node.
	pub plane_idx: u32,

	pub front: ClipNodeRef,
	pub back: ClipNodeRef,
}

#[derive(BspValue, Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[repr(i32)]
pub enum BspLeafContents {
	#[default]
	Empty = -1,
	Solid = -2,
	Water = -3,
	Slime = -4,
	Lava = -5,
	Sky = -6,
	Origin = -7,
	Clip = -8,
	Current0 = -9,
	Current90 = -10,
	Current180 = -11,
	Current270 = -12,
	CurrentUp = -13,
	CurrentDown = -14,
	Translucent = -15,
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspLeaf {
	pub contents: BspLeafContents,
	/// Beginning of this leaf's run in the compressed visibility data, or `-1` for none.
	pub vis_offset: i32,

	pub bound: ShortBoundingBox,

	/// Index in the `mark_surfaces` list.
	pub face_idx: u16,
	/// Number of elements in the `mark_surfaces` list.
	pub face_num: u16,

	pub ambience_water: u8,
	pub ambience_sky: u8,
	pub ambience_slime: u8,
	pub ambience_lava: u8,
}

impl BspLeaf {
	/// The offset of this leaf's potentially-visible set in the compressed visibility data.
	/// `None` means the leaf has no visibility information: nothing may be culled through it.
	#[inline]
	pub fn pvs_offset(&self) -> Option<usize> {
		usize::try_from(self.vis_offset).ok()
	}
}
