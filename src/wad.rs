//! WAD2/WAD3 texture archive parsing, and resolution of a map's texture names to RGBA images.

use hlbsp_macros::BspValue;
use image::RgbaImage;

use crate::{
	data::texture::BspMipTexture,
	data::util::FixedStr,
	reader::{BspByteReader, BspValue},
	BspData, BspParseError, BspParseResultDoingJobExt, BspResult,
};

/// Directory entry type of a mip texture lump.
pub const WAD_TYPE_MIPTEX: i8 = 0x43;

#[derive(BspValue, Debug, Clone, Copy)]
pub struct WadHeader {
	pub magic: [u8; 4],
	/// Number of directory entries.
	pub dirs: i32,
	/// Offset of the directory.
	pub dir_offset: i32,
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct WadEntry {
	pub offset: i32,
	/// Size in the file, differing from `size` only for compressed entries.
	pub disk_size: i32,
	/// Uncompressed size.
	pub size: i32,
	pub ty: i8,
	/// Nonzero means compressed. Rejected when the entry is referenced.
	pub compression: u8,
	pub padding: u16,
	pub name: FixedStr<16>,
}

/// A parsed texture archive: the directory over the raw file bytes. Entry payloads are sliced out
/// on demand.
#[derive(Debug, Clone)]
pub struct Wad {
	pub header: WadHeader,
	pub entries: Vec<WadEntry>,
	data: Vec<u8>,
}

impl Wad {
	/// Parses the archive directory. Fails unless the magic is `WAD2` or `WAD3`.
	pub fn parse(data: Vec<u8>) -> BspResult<Self> {
		let mut reader = BspByteReader::new(&data);
		let header: WadHeader = reader.read().job("Reading WAD header")?;

		if &header.magic != b"WAD2" && &header.magic != b"WAD3" {
			return Err(BspParseError::WrongMagicNumber {
				found: header.magic,
				expected: "WAD2 or WAD3",
			});
		}

		let mut reader = reader.with_pos(header.dir_offset as usize);
		let mut entries = Vec::with_capacity(header.dirs.max(0) as usize);
		for i in 0..header.dirs.max(0) {
			entries.push(reader.read::<WadEntry>().job(format!("Reading WAD directory entry {i}"))?);
		}

		Ok(Self { header, entries, data })
	}

	/// Finds the directory entry named `name`. The comparison is case-exact.
	pub fn entry(&self, name: &str) -> Option<&WadEntry> {
		self.entries.iter().find(|entry| entry.name.as_str() == name)
	}

	/// The raw payload of `entry`. Compressed entries are a format error, decompression was never
	/// specified for these archives.
	pub fn entry_data(&self, entry: &WadEntry) -> BspResult<&[u8]> {
		if entry.compression != 0 {
			return Err(BspParseError::CompressedWadEntry {
				name: entry.name.as_str().to_string(),
			});
		}

		let (from, to) = (entry.offset as usize, entry.offset as usize + entry.size as usize);
		if entry.offset < 0 || to > self.data.len() {
			return Err(BspParseError::BufferOutOfBounds {
				from,
				to,
				size: self.data.len(),
			});
		}

		Ok(&self.data[from..to])
	}

	/// Looks up and decodes the mip texture named `name`, or `Ok(None)` if this archive doesn't
	/// have it.
	pub fn mip_texture(&self, name: &str) -> BspResult<Option<BspMipTexture>> {
		let Some(entry) = self.entry(name) else {
			return Ok(None);
		};
		if entry.ty != WAD_TYPE_MIPTEX {
			log::warn!("WAD entry {name} has type {:#x}, not a mip texture", entry.ty);
			return Ok(None);
		}

		let data = self.entry_data(entry)?;
		BspMipTexture::bsp_parse(&mut BspByteReader::new(data))
			.job(format!("Reading WAD texture {name}"))
			.map(Some)
	}
}

/// Where a resolved texture's pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TextureSource {
	/// Decoded from the map file itself.
	Embedded,
	/// Found in an archive, by position in the search list.
	Archive(usize),
	/// Found nowhere; an opaque white placeholder stands in.
	Missing,
}

/// A map texture resolved to pixels.
#[derive(Debug, Clone)]
pub struct ResolvedTexture {
	pub name: String,
	pub image: RgbaImage,
	pub source: TextureSource,
}

/// A texture the archive search couldn't satisfy, recorded for diagnostics or a later retry
/// against more archives.
#[derive(Debug, Clone)]
pub struct MissingTexture {
	pub name: String,
	/// Index into the map's texture table.
	pub index: usize,
}

/// The outcome of resolving every mip texture of a map against an archive search list.
/// `textures` is index-aligned with [BspData::textures].
#[derive(Debug, Clone, Default)]
pub struct TextureLookup {
	pub textures: Vec<Option<ResolvedTexture>>,
	pub missing: Vec<MissingTexture>,
}

/// Resolves every texture referenced by `bsp` to RGBA pixels. Embedded textures decode in place;
/// external names search `wads` in order and the first case-exact match wins. Unresolved names
/// are recorded and substituted with [placeholder_texture], they never fail the load.
///
/// Each texture resolves independently of the others, only the output order matters.
pub fn resolve_textures(bsp: &BspData, wads: &[Wad]) -> BspResult<TextureLookup> {
	let mut lookup = TextureLookup {
		textures: Vec::with_capacity(bsp.textures.len()),
		missing: Vec::new(),
	};

	for (index, slot) in bsp.textures.iter().enumerate() {
		let Some(mip_texture) = slot else {
			lookup.textures.push(None);
			continue;
		};
		let name = mip_texture.name().to_string();

		if let Some(image) = mip_texture.decode_rgba() {
			log::debug!("texture {name} decoded from the map");
			lookup.textures.push(Some(ResolvedTexture {
				name,
				image,
				source: TextureSource::Embedded,
			}));
			continue;
		}

		let mut resolved = None;
		for (wad_index, wad) in wads.iter().enumerate() {
			if let Some(external) = wad.mip_texture(&name)? {
				match external.decode_rgba() {
					Some(image) => resolved = Some((wad_index, image)),
					None => log::warn!("texture {name} in archive {wad_index} has no pixel data"),
				}
				// First archive with the name wins, even a damaged one.
				break;
			}
		}

		lookup.textures.push(Some(match resolved {
			Some((wad_index, image)) => {
				log::debug!("texture {name} found in archive {wad_index}");
				ResolvedTexture {
					name,
					image,
					source: TextureSource::Archive(wad_index),
				}
			}
			None => {
				log::debug!("texture {name} is missing");
				lookup.missing.push(MissingTexture {
					name: name.clone(),
					index,
				});
				ResolvedTexture {
					name,
					image: placeholder_texture(),
					source: TextureSource::Missing,
				}
			}
		}));
	}

	Ok(lookup)
}

/// Opaque white stand-in for unresolved textures, so a renderer can still bind something that
/// doesn't disturb lightmaps.
pub fn placeholder_texture() -> RgbaImage {
	RgbaImage::from_pixel(16, 16, image::Rgba([u8::MAX; 4]))
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Builds an archive with one mip texture entry: an 8x8 texture with all four mip levels and
	/// a trailing palette, like the real compilers emit.
	fn build_wad(magic: &[u8; 4], name: &str, compression: u8) -> Vec<u8> {
		let mut texture = Vec::new();
		let mut name_bytes = [0u8; 16];
		name_bytes[..name.len()].copy_from_slice(name.as_bytes());
		texture.extend_from_slice(&name_bytes);
		texture.extend_from_slice(&8u32.to_le_bytes()); // width
		texture.extend_from_slice(&8u32.to_le_bytes()); // height
		texture.extend_from_slice(&40u32.to_le_bytes()); // full: 64 bytes
		texture.extend_from_slice(&104u32.to_le_bytes()); // half: 16 bytes
		texture.extend_from_slice(&120u32.to_le_bytes()); // quarter: 4 bytes
		texture.extend_from_slice(&124u32.to_le_bytes()); // eighth: 1 byte
		texture.extend_from_slice(&[1; 64 + 16 + 4 + 1]); // palette-indexed mip levels
		texture.extend_from_slice(&256i16.to_le_bytes());
		let mut palette = [0u8; 768];
		palette[3..6].copy_from_slice(&[10, 20, 30]); // color 1
		texture.extend_from_slice(&palette);

		let mut wad = Vec::new();
		wad.extend_from_slice(magic);
		wad.extend_from_slice(&1i32.to_le_bytes()); // one entry
		let dir_offset = 12 + texture.len() as i32;
		wad.extend_from_slice(&dir_offset.to_le_bytes());
		wad.extend_from_slice(&texture);

		// Directory entry
		wad.extend_from_slice(&12i32.to_le_bytes()); // offset
		wad.extend_from_slice(&(texture.len() as i32).to_le_bytes()); // disk size
		wad.extend_from_slice(&(texture.len() as i32).to_le_bytes()); // size
		wad.push(WAD_TYPE_MIPTEX as u8);
		wad.push(compression);
		wad.extend_from_slice(&0u16.to_le_bytes());
		wad.extend_from_slice(&name_bytes);

		wad
	}

	#[test]
	fn wrong_magic_is_fatal() {
		let wad = build_wad(b"WAD4", "wall", 0);
		assert!(matches!(
			Wad::parse(wad).unwrap_err().root(),
			BspParseError::WrongMagicNumber { .. }
		));
	}

	#[test]
	fn directory_and_payload_decode() {
		let wad = Wad::parse(build_wad(b"WAD3", "wall", 0)).unwrap();

		assert_eq!(wad.entries.len(), 1);
		let texture = wad.mip_texture("wall").unwrap().unwrap();
		assert_eq!(texture.name(), "wall");
		assert_eq!((texture.header.width, texture.header.height), (8, 8));

		let image = texture.decode_rgba().unwrap();
		assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 255]);
	}

	#[test]
	fn lookup_is_case_exact() {
		let wad = Wad::parse(build_wad(b"WAD3", "WALL", 0)).unwrap();

		assert!(wad.entry("WALL").is_some());
		assert!(wad.entry("wall").is_none());
	}

	#[test]
	fn compressed_entries_are_rejected_when_referenced() {
		let wad = Wad::parse(build_wad(b"WAD2", "wall", 1)).unwrap();

		assert!(matches!(
			wad.mip_texture("wall").unwrap_err().root(),
			BspParseError::CompressedWadEntry { .. }
		));
	}
}
