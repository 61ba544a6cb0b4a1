//! Parsing and querying of GoldSrc (Half-Life) BSP maps and their companion WAD texture archives.
//!
//! The entry points are [BspData::parse] for map files and [Wad::parse](wad::Wad::parse) for archives;
//! [resolve_textures](wad::resolve_textures) turns the two into per-texture RGBA images.

// The hlbsp_macros derives emit ::hlbsp paths so they also work in this crate.
extern crate self as hlbsp;

pub mod data;
pub mod entity;
pub mod query;
pub mod reader;
pub mod wad;


use data::texture::{read_texture_lump, BspMipTexture};
use data::visdata::BspVisData;
use data::{bsp::*, nodes::*};
use entity::{parse_entities, Entities};
use hlbsp_macros::BspValue;
use reader::{BspByteReader, BspValue};
use thiserror::Error;

// Re-exports
pub use glam;
pub use image;
pub use smallvec;

/// The version number GoldSrc maps are compiled with. Other versions are tolerated with a warning,
/// since the lump directory is the only validation the format offers.
pub const BSP_VERSION: i32 = 30;

#[derive(Debug, Clone, Error)]
pub enum BspParseError {
	#[error("Palette byte length {0} instead of 768.")]
	InvalidPaletteLength(usize),
	#[error("Lump ({0:?}) out of bounds of data! Malformed/corrupted BSP?")]
	LumpOutOfBounds(LumpEntry),
	#[error("Tried to read bytes from {from} to {to} from buffer of size {size}")]
	BufferOutOfBounds {
		from: usize,
		to: usize,
		size: usize,
	},
	#[error("The {lump_name} lump is {len} bytes, which does not divide into {record_size}-byte records. Truncated BSP?")]
	MisalignedLump {
		lump_name: &'static str,
		len: u32,
		record_size: usize,
	},
	#[error("Failed to parse string at index {index}, invalid utf-8 sequence: {sequence:?}")]
	InvalidString {
		index: usize,
		sequence: Vec<u8>,
	},
	#[error("Wrong magic number! Expected {expected}, found \"{}\"", data::util::display_magic_number(found))]
	WrongMagicNumber {
		found: [u8; 4],
		expected: &'static str,
	},
	#[error("Invalid value: {value}, acceptable:\n{acceptable}")]
	InvalidVariant { value: i32, acceptable: &'static str },
	#[error("Brace mismatch when parsing entities! Brace level: {depth}")]
	UnbalancedBraces { depth: i32 },
	#[error("WAD entry \"{name}\" is compressed, which is unsupported")]
	CompressedWadEntry { name: String },

	/// For telling the user exactly where the error occurred in the process.
	#[error("{0} - {1}")]
	DoingJob(String, Box<BspParseError>),
}
impl BspParseError {
	/// The root error behind any [BspParseError::DoingJob].
	pub fn root(&self) -> &BspParseError {
		let mut err = self;
		loop {
			match err {
				Self::DoingJob(_, child) => err = child,
				_ => return err,
			}
		}
	}

	#[inline]
	pub fn map_utf8_error(data: &[u8]) -> impl FnOnce(std::str::Utf8Error) -> Self + '_ {
		|err| BspParseError::InvalidString {
			index: err.valid_up_to(),
			sequence: data[err.valid_up_to()..err.valid_up_to() + err.error_len().unwrap_or(1)].to_vec(),
		}
	}
}

pub type BspResult<T> = Result<T, BspParseError>;

pub trait BspParseResultDoingJobExt {
	/// Like `map_err`, but specifically for adding messages to BSP errors to tell the user exactly what was going on when the error occurred.
	fn job(self, job: impl ToString) -> Self;
}
impl<T> BspParseResultDoingJobExt for BspResult<T> {
	fn job(self, job: impl ToString) -> Self {
		match self {
			Ok(v) => Ok(v),
			Err(err) => Err(BspParseError::DoingJob(job.to_string(), Box::new(err))),
		}
	}
}

/// Points to the chunk of data in the file a lump resides in.
#[derive(BspValue, Debug, Clone, Copy)]
pub struct LumpEntry {
	pub offset: u32,
	pub len: u32,
}

impl LumpEntry {
	/// Returns the slice of `data` (BSP file input) that this entry points to.
	pub fn get<'a>(&self, data: &'a [u8]) -> BspResult<&'a [u8]> {
		let (from, to) = (self.offset as usize, self.offset as usize + self.len as usize);
		if to > data.len() {
			Err(BspParseError::LumpOutOfBounds(*self))
		} else {
			Ok(&data[from..to])
		}
	}
}

/// Helper function to read an array of data of type `T` from a lump. Takes in the BSP file data, the lump directory entry, and the lump's name for error reporting.
pub fn read_lump<T: BspValue>(data: &[u8], entry: LumpEntry, lump_name: &'static str) -> BspResult<Vec<T>> {
	let lump_data = entry.get(data)?;
	let record_size = T::bsp_struct_size();

	if entry.len as usize % record_size != 0 {
		return Err(BspParseError::MisalignedLump {
			lump_name,
			len: entry.len,
			record_size,
		});
	}
	let lump_entries = entry.len as usize / record_size;

	let mut reader = BspByteReader::new(lump_data);
	let mut out = Vec::with_capacity(lump_entries);

	for i in 0..lump_entries {
		out.push(reader.read().job(format!("Parsing {lump_name} lump entry {i}"))?);
	}

	Ok(out)
}

/// Contains the list of lump entries. The order is fixed by the format.
#[derive(BspValue, Debug, Clone, Copy)]
pub struct LumpDirectory {
	pub entities: LumpEntry,
	pub planes: LumpEntry,
	pub textures: LumpEntry,
	pub vertices: LumpEntry,
	pub visibility: LumpEntry,
	pub nodes: LumpEntry,
	pub tex_info: LumpEntry,
	pub faces: LumpEntry,
	pub lighting: LumpEntry,
	pub clip_nodes: LumpEntry,
	pub leaves: LumpEntry,
	pub mark_surfaces: LumpEntry,
	pub edges: LumpEntry,
	pub surf_edges: LumpEntry,
	pub models: LumpEntry,
}

/// The data parsed from a BSP file. Immutable once constructed, all queries borrow it.
#[derive(Debug, Clone)]
pub struct BspData {
	/// The version number from the file header, normally [BSP_VERSION].
	pub version: i32,
	/// The key/value property maps parsed out of the entities lump.
	pub entities: Entities,
	/// All vertex positions.
	pub vertices: Vec<glam::Vec3>,
	pub planes: Vec<BspPlane>,
	pub edges: Vec<BspEdge>,
	/// Signed edge references. The sign selects which end of the edge comes first, see
	/// [BspFace::vertices]. Edge 0 is never referenced negated, the sign of zero can't encode a
	/// direction.
	pub surface_edges: Vec<i32>,
	pub faces: Vec<BspFace>,
	pub tex_info: Vec<BspTexInfo>,
	pub models: Vec<BspModel>,
	pub nodes: Vec<BspNode>,
	pub clip_nodes: Vec<BspClipNode>,
	pub leaves: Vec<BspLeaf>,
	/// Indirection table from leaves to faces.
	pub mark_surfaces: Vec<u16>,
	/// Mip texture headers, with embedded pixel data where the map contains any. `None` for
	/// directory slots with a negative offset.
	pub textures: Vec<Option<BspMipTexture>>,
	/// Raw lightmap samples, indexed by [BspFace::lightmap_offset].
	pub lighting: Vec<u8>,
	/// The run-length-compressed visibility data, decompressed per-leaf on demand.
	pub visibility: BspVisData,
}

impl BspData {
	/// Parses the data from a BSP file buffer.
	pub fn parse(bsp: &[u8]) -> BspResult<Self> {
		if bsp.len() < 4 {
			return Err(BspParseError::BufferOutOfBounds {
				from: 0,
				to: 4,
				size: bsp.len(),
			});
		}

		let mut reader = BspByteReader::new(bsp);
		let version: i32 = reader.read()?;
		if version != BSP_VERSION {
			log::warn!("BSP version is {version}, expected {BSP_VERSION} - decoding anyway, the lump directory is the real validation");
		}

		let lump_dir: LumpDirectory = reader.read().job("Reading lump directory")?;

		let data = Self {
			version,
			entities: parse_entities(lump_dir.entities.get(bsp)?).job("Parsing entities lump")?,
			vertices: read_lump(bsp, lump_dir.vertices, "vertices")?,
			planes: read_lump(bsp, lump_dir.planes, "planes")?,
			edges: read_lump(bsp, lump_dir.edges, "edges")?,
			surface_edges: read_lump(bsp, lump_dir.surf_edges, "surface edges")?,
			faces: read_lump(bsp, lump_dir.faces, "faces")?,
			tex_info: read_lump(bsp, lump_dir.tex_info, "texture infos")?,
			models: read_lump(bsp, lump_dir.models, "models")?,
			nodes: read_lump(bsp, lump_dir.nodes, "nodes")?,
			clip_nodes: read_lump(bsp, lump_dir.clip_nodes, "clip nodes")?,
			leaves: read_lump(bsp, lump_dir.leaves, "leaves")?,
			mark_surfaces: read_lump(bsp, lump_dir.mark_surfaces, "mark surfaces")?,
			textures: read_texture_lump(&mut BspByteReader::new(lump_dir.textures.get(bsp)?)).job("Reading texture lump")?,
			lighting: lump_dir.lighting.get(bsp)?.to_vec(),
			visibility: BspVisData::new(lump_dir.visibility.get(bsp)?.to_vec()),
		};

		Ok(data)
	}

	/// The number of leaves covered by visibility data: every leaf except the shared solid leaf 0.
	#[inline]
	pub fn vis_leaf_count(&self) -> usize {
		self.leaves.len().saturating_sub(1)
	}
}
