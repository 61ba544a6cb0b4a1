//! Data definitions for the geometry tables: planes, edges, faces, texture projections and models.

use glam::{dvec2, Vec2, Vec3};
use hlbsp_macros::BspValue;

use crate::{
	data::util::BoundingBox,
	reader::{BspByteReader, BspValue},
	BspData, BspResult,
};

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspPlane {
	pub normal: Vec3,
	pub dist: f32,
	/// Type of plane depending on normal vector.
	pub ty: BspPlaneType,
}
impl BspPlane {
	/// `>0` = front, `<0` = back, `0` = on plane
	pub fn point_side(&self, point: Vec3) -> f32 {
		let plane_axis = self.ty as usize;

		// If the plane lies on a cardinal axis, the computation is much simpler.
		if plane_axis < 3 {
			point[plane_axis] - self.dist
		} else {
			(self.normal.as_dvec3().dot(point.as_dvec3()) - self.dist as f64) as f32
		}
	}
}

/// Type of plane depending on normal vector.
#[derive(BspValue, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(i32)]
pub enum BspPlaneType {
	/// Axial plane, in X
	AxialX = 0,
	/// Axial plane, in Y
	AxialY = 1,
	/// Axial plane, in Z
	AxialZ = 2,
	/// Non axial plane, roughly toward X
	AroundX = 3,
	/// Non axial plane, roughly toward Y
	AroundY = 4,
	/// Non axial plane, roughly toward Z
	AroundZ = 5,
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspEdge {
	/// The index to the first vertex this edge connects
	pub a: u16,
	/// The index to the second vertex this edge connects
	pub b: u16,
}

/// Byte that dictates how a specific BSP lightmap appears:
/// - 255 means there is no lightmap.
/// - 0 means normal, unanimated lightmap.
/// - 1 through 254 are programmer-defined animated styles, including togglable lights.
///
/// It is recommended to compare these values via the provided constants of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightmapStyle(pub u8);
impl LightmapStyle {
	/// Unanimated lightmap.
	pub const NORMAL: Self = Self(0);
	/// No lightmap.
	pub const NONE: Self = Self(u8::MAX);
}
impl BspValue for LightmapStyle {
	#[inline]
	fn bsp_parse(reader: &mut BspByteReader) -> BspResult<Self> {
		reader.read().map(Self)
	}
	#[inline]
	fn bsp_struct_size() -> usize {
		1
	}
}
impl std::fmt::Display for LightmapStyle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.0 {
			0 => write!(f, "0 (normal)"),
			255 => write!(f, "255 (no lightmap)"),
			n => n.fmt(f),
		}
	}
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspFace {
	/// Index of the plane the face is parallel to
	pub plane_idx: u16,
	/// If not zero, seems to indicate that the normal should be inverted when creating meshes
	pub plane_side: u16,

	/// Index of the first edge (in the face edge array)
	pub first_edge: u32,
	/// Number of consecutive edges (in the face edge array)
	pub num_edges: u16,

	/// Index of the texture info structure
	pub texture_info_idx: u16,

	/// Each face can have up to 4 lightmaps, the additional 3 are positioned right after the lightmap at `lightmap_offset`.
	///
	/// Each element in this array is the style in which these lightmaps appear, see docs for [LightmapStyle].
	pub lightmap_styles: [LightmapStyle; 4],

	/// Offset of the lightmap (in bytes) in the lightmap lump, or -1 if no lightmap
	pub lightmap_offset: i32,
}

impl BspFace {
	/// Faces compiled with no primary lightmap style are sky placeholders that contribute no
	/// drawable geometry.
	#[inline]
	pub fn is_sky(&self) -> bool {
		self.lightmap_styles[0] == LightmapStyle::NONE
	}

	/// Returns an iterator that retrieves the vertex positions that make up this face from `bsp`,
	/// in winding order. A negative surface edge reads the edge back to front.
	#[inline]
	pub fn vertices<'a>(&self, bsp: &'a BspData) -> impl Iterator<Item = Vec3> + 'a {
		(self.first_edge..self.first_edge + self.num_edges as u32).map(|i| {
			let surf_edge = bsp.surface_edges[i as usize];
			let edge = bsp.edges[surf_edge.unsigned_abs() as usize];
			let vert_idx = if surf_edge.is_negative() { edge.b } else { edge.a };

			bsp.vertices[vert_idx as usize]
		})
	}
}

/// Texture projection information.
#[derive(BspValue, Debug, Clone, Copy)]
pub struct PlanarTextureProjection {
	pub u_axis: Vec3,
	pub u_offset: f32,

	pub v_axis: Vec3,
	pub v_offset: f32,
}

impl PlanarTextureProjection {
	/// Projects a position onto this plane.
	///
	/// Converts to double for calculation to minimise floating-point imprecision as demonstrated [here](https://github.com/Novum/vkQuake/blob/b6eb0cf5812c09c661d51e3b95fc08d88da2288a/Quake/gl_model.c#L1315).
	pub fn project(&self, point: Vec3) -> Vec2 {
		dvec2(
			point.as_dvec3().dot(self.u_axis.as_dvec3()) + self.u_offset as f64,
			point.as_dvec3().dot(self.v_axis.as_dvec3()) + self.v_offset as f64,
		)
		.as_vec2()
	}
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspTexInfo {
	pub projection: PlanarTextureProjection,

	/// Index of the mip texture this surface is painted with.
	pub texture_idx: u32,
	/// Seems to always be zero in compiled GoldSrc maps.
	pub flags: u32,
}

#[derive(BspValue, Debug, Clone, Copy)]
pub struct BspModel {
	pub bound: BoundingBox,
	/// Origin of model, usually (0,0,0)
	pub origin: Vec3,

	/// Root indices: `[0]` is the head BSP node, `[1]` and `[2]` are the clip node roots, `[3]` is usually zero.
	pub head_nodes: [i32; 4],

	/// Number of visleafs not including the solid leaf 0
	pub visleafs: u32,
	pub first_face: u32,
	pub num_faces: u32,
}

#[cfg(test)]
mod tests {
	use crate::reader::BspValue;

	use super::*;

	#[test]
	fn record_sizes_match_the_format() {
		assert_eq!(BspPlane::bsp_struct_size(), 20);
		assert_eq!(BspEdge::bsp_struct_size(), 4);
		assert_eq!(BspFace::bsp_struct_size(), 20);
		assert_eq!(BspTexInfo::bsp_struct_size(), 40);
		assert_eq!(BspModel::bsp_struct_size(), 64);
	}

	#[test]
	fn axial_plane_distance_shortcut() {
		let plane = BspPlane {
			normal: Vec3::Z,
			dist: 32.,
			ty: BspPlaneType::AxialZ,
		};

		assert_eq!(plane.point_side(Vec3::new(10., -4., 40.)), 8.);
		assert_eq!(plane.point_side(Vec3::new(0., 0., 20.)), -12.);
	}

	#[test]
	fn non_axial_plane_uses_dot_product() {
		let normal = Vec3::new(1., 1., 0.).normalize();
		let plane = BspPlane {
			normal,
			dist: 0.,
			ty: BspPlaneType::AroundX,
		};

		assert!(plane.point_side(Vec3::new(1., 1., 0.)) > 0.);
		assert!(plane.point_side(Vec3::new(-1., -1., 0.)) < 0.);
	}

	#[test]
	fn sky_faces_are_flagged() {
		let mut face = BspFace {
			plane_idx: 0,
			plane_side: 0,
			first_edge: 0,
			num_edges: 0,
			texture_info_idx: 0,
			lightmap_styles: [LightmapStyle::NONE; 4],
			lightmap_offset: -1,
		};
		assert!(face.is_sky());

		face.lightmap_styles[0] = LightmapStyle::NORMAL;
		assert!(!face.is_sky());
	}
}
