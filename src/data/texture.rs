//! Data definitions for mip textures: embedded pixel data, palettes and RGBA decoding.

use hlbsp_macros::BspValue;
use image::RgbaImage;

use crate::{
	data::util::FixedStr,
	reader::{BspByteReader, BspValue},
	BspParseError, BspParseResultDoingJobExt, BspResult,
};

/// The 256-color palette trailing each embedded mip texture.
#[derive(Clone)]
pub struct Palette {
	pub colors: [[u8; 3]; 256],
}

impl BspValue for Palette {
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		let num_colors = reader.read::<i16>()?;

		if num_colors != 256 {
			return Err(BspParseError::InvalidPaletteLength(num_colors as usize));
		}

		let colors = reader.read_bytes(num_colors as usize * 3)?;

		Palette::parse(colors)
	}

	fn bsp_struct_size() -> usize {
		size_of::<i16>() + 3 * 256
	}
}

impl Palette {
	/// Parses a palette from data. Palettes must be 768 bytes in length exactly.
	pub fn parse(data: &[u8]) -> BspResult<Self> {
		if data.len() != 768 {
			return Err(BspParseError::InvalidPaletteLength(data.len()));
		}

		Ok(Self {
			colors: data
				.chunks_exact(3)
				.map(|col| [col[0], col[1], col[2]])
				.collect::<Vec<_>>()
				.try_into()
				.unwrap(),
		})
	}
}

impl std::fmt::Debug for Palette {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Palette(256 colors)")
	}
}

#[derive(BspValue, Debug, Clone)]
pub struct BspTextureHeader {
	pub name: FixedStr<16>,

	pub width: u32,
	pub height: u32,

	/// Offsets to the four mip levels, relative to the start of the header. All zero means the
	/// pixels live in an external archive.
	pub offset_full: u32,
	pub offset_half: u32,
	pub offset_quarter: u32,
	pub offset_eighth: u32,
}

#[derive(Default, Clone)]
pub struct BspTextureData {
	pub full: Option<Vec<u8>>,
	pub half: Option<Vec<u8>>,
	pub quarter: Option<Vec<u8>>,
	pub eighth: Option<Vec<u8>>,
	pub palette: Option<Palette>,
}

impl std::fmt::Debug for BspTextureData {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BspTextureData")
			.field("full", &self.full.as_ref().map(|_| ..))
			.field("half", &self.half.as_ref().map(|_| ..))
			.field("quarter", &self.quarter.as_ref().map(|_| ..))
			.field("eighth", &self.eighth.as_ref().map(|_| ..))
			.finish()
	}
}

/// A mip texture: the header, and the palette-indexed pixel data when it is embedded in the
/// same file.
#[derive(Debug, Clone)]
pub struct BspMipTexture {
	pub header: BspTextureHeader,
	pub data: BspTextureData,
}

impl BspValue for BspMipTexture {
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		let reader_start = reader.pos();

		let header: BspTextureHeader = reader.read()?;

		macro_rules! read_data {
			($offset:ident, $res:literal $(, $($res_operator:tt)+)?) => {{
				if header.$offset == 0 {
					None
				} else {
					// The offsets are relative to start of the header, so reset state before continuing.
					*reader = reader.with_pos(reader_start + header.$offset as usize);

					Some(
						reader
							.read_bytes((header.width as usize $($($res_operator)+)?) * (header.height as usize $($($res_operator)+)?))
							.job(format!(concat!("Reading texture (", $res, "res) with header {:#?}"), header))?
							.to_vec(),
					)
				}
			}};
		}

		if [header.offset_full, header.offset_half, header.offset_quarter, header.offset_eighth]
			.into_iter()
			.all(|o| o == 0)
		{
			Ok(Self {
				data: Default::default(),
				header,
			})
		} else {
			Ok(Self {
				data: BspTextureData {
					full: read_data!(offset_full, "full"),
					half: read_data!(offset_half, "half", / 2),
					quarter: read_data!(offset_quarter, "quarter", / 4),
					eighth: read_data!(offset_eighth, "eighth", / 8),
					// We do not reset state after the last read, as the palette should start directly after.
					palette: Some(reader.read().job(format!("Reading palette of texture {}", header.name))?),
				},
				header,
			})
		}
	}

	fn bsp_struct_size() -> usize {
		BspTextureHeader::bsp_struct_size()
	}
}

impl BspMipTexture {
	#[inline]
	pub fn name(&self) -> &str {
		self.header.name.as_str()
	}

	/// `true` when the pixels live in an external archive rather than this file.
	#[inline]
	pub fn is_external(&self) -> bool {
		self.data.full.is_none()
	}

	/// Whether palette slot 255 is a transparency key for this texture, signalled by the leading `{` in the name.
	#[inline]
	pub fn is_alpha_keyed(&self) -> bool {
		self.name().starts_with('{')
	}

	/// Decodes the full-resolution mip level through the palette into an RGBA image, applying
	/// alpha-key reconstruction for `{`-named textures. `None` for external textures.
	pub fn decode_rgba(&self) -> Option<RgbaImage> {
		let indices = self.data.full.as_ref()?;
		let palette = self.data.palette.as_ref()?;
		let (width, height) = (self.header.width as usize, self.header.height as usize);

		let mut pixels = Vec::with_capacity(indices.len() * 4);
		for &index in indices {
			let [r, g, b] = palette.colors[index as usize];
			pixels.extend_from_slice(&[r, g, b, u8::MAX]);
		}

		if self.is_alpha_keyed() {
			apply_alpha_key(&mut pixels, width, height, palette.colors[255]);
		}

		Some(RgbaImage::from_raw(self.header.width, self.header.height, pixels).expect("pixel buffer length matches dimensions"))
	}
}

/// The texture lump is more complex than just a vector of the same type of item, so it needs its own function.
/// It starts with a count, then that many offsets (relative to the lump start) of embedded headers.
pub fn read_texture_lump(reader: &mut BspByteReader) -> BspResult<Vec<Option<BspMipTexture>>> {
	// Maps without any textures compile to an empty lump.
	if reader.is_empty() {
		return Ok(Vec::new());
	}

	let mut textures = Vec::new();
	let num_mip_textures: u32 = reader.read()?;

	for _ in 0..num_mip_textures {
		let offset: i32 = reader.read()?;
		if offset.is_negative() {
			textures.push(None);
			continue;
		}
		textures.push(Some(BspMipTexture::bsp_parse(&mut reader.with_pos(offset as usize))?));
	}

	Ok(textures)
}

const NEIGHBORS: [(isize, isize); 8] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];

/// Rewrites key-colored pixels of an RGBA buffer to be fully transparent. The color channels of a
/// key pixel become the average of its non-key neighbors, diagonals weighted by sqrt 2, so that
/// bilinear filtering doesn't bleed the key color in at the edges. Neighbors are read from a
/// snapshot of the buffer, never from pixels rewritten earlier in the pass. A key pixel with no
/// non-key neighbors keeps the key color, at alpha 0.
pub fn apply_alpha_key(pixels: &mut [u8], width: usize, height: usize, key: [u8; 3]) {
	let original = pixels.to_vec();
	let is_key = |x: usize, y: usize| {
		let i = (y * width + x) * 4;
		original[i] == key[0] && original[i + 1] == key[1] && original[i + 2] == key[2]
	};

	for y in 0..height {
		for x in 0..width {
			if !is_key(x, y) {
				continue;
			}
			let index = (y * width + x) * 4;
			pixels[index + 3] = 0;

			let mut sum = [0f32; 3];
			let mut count = 0u32;
			for (dx, dy) in NEIGHBORS {
				let (nx, ny) = (x as isize + dx, y as isize + dy);
				if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
					continue;
				}
				let (nx, ny) = (nx as usize, ny as usize);
				if is_key(nx, ny) {
					continue;
				}

				let weight = if dx != 0 && dy != 0 { std::f32::consts::SQRT_2 } else { 1. };
				let neighbor = (ny * width + nx) * 4;
				for channel in 0..3 {
					sum[channel] += original[neighbor + channel] as f32 * weight;
				}
				count += 1;
			}

			if count > 0 {
				for channel in 0..3 {
					pixels[index + channel] = (sum[channel] / count as f32).round() as u8;
				}
			}
		}
	}
}
