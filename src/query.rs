//! Spatial queries over the decoded tables: point location, visibility resolution and the
//! ordered leaf walk a renderer consumes.

use glam::Vec3;

use crate::{data::nodes::BspNodeRef, BspData};

impl BspData {
	/// Returns the index of the leaf containing `point`, walking the tree from node 0 by child
	/// bounding boxes. `None` when no child box contains the point (outside the world) or the
	/// point resolves to the shared solid leaf 0.
	///
	/// Child references strictly descend, so this always terminates.
	pub fn leaf_at_point(&self, point: Vec3) -> Option<usize> {
		if self.nodes.is_empty() {
			return None;
		}
		let mut node_idx = 0;

		loop {
			let node = &self.nodes[node_idx];
			let mut descend = None;

			for child in [node.front, node.back] {
				match child {
					BspNodeRef::Node(idx) => {
						if self.nodes[idx as usize].bound.contains(point) {
							descend = Some(idx as usize);
							break;
						}
					}
					// The solid leaf 0 is shared by everything outside the world; never report it.
					BspNodeRef::Leaf(0) => {}
					BspNodeRef::Leaf(idx) => {
						if self.leaves[idx as usize].bound.contains(point) {
							return Some(idx as usize);
						}
					}
				}
			}

			match descend {
				Some(idx) => node_idx = idx,
				None => return None,
			}
		}
	}

	/// Decompresses the potentially-visible set of the leaf at `leaf_idx`. `None` when the map
	/// has no visibility data or the leaf carries none; callers must then skip culling entirely.
	pub fn leaf_visible_set(&self, leaf_idx: usize) -> Option<Vec<bool>> {
		if self.visibility.is_empty() {
			return None;
		}
		let offset = self.leaves.get(leaf_idx)?.pvs_offset()?;

		Some(self.visibility.decompress(offset, self.vis_leaf_count()))
	}

	/// [Self::leaf_visible_set] for the leaf containing `point`.
	pub fn visible_set_at(&self, point: Vec3) -> Option<Vec<bool>> {
		self.leaf_visible_set(self.leaf_at_point(point)?)
	}

	/// Walks the tree from node 0 and calls `visitor` with each reachable leaf index, ordered
	/// relative to `camera`: at every splitting plane the subtree on the far side of the camera
	/// is visited before the near side. The solid leaf 0 is never emitted, and when `visible` is
	/// given (the camera leaf's decompressed set, flag `i` covering leaf `i + 1`), unmarked
	/// leaves are culled.
	///
	/// No list is built; the visit order is the output.
	pub fn visit_visible_leaves(&self, camera: Vec3, visible: Option<&[bool]>, mut visitor: impl FnMut(usize)) {
		if self.nodes.is_empty() {
			return;
		}
		self.visit_node_leaves(BspNodeRef::Node(0), camera, visible, &mut visitor);
	}

	fn visit_node_leaves(&self, node_ref: BspNodeRef, camera: Vec3, visible: Option<&[bool]>, visitor: &mut impl FnMut(usize)) {
		let node_idx = match node_ref {
			BspNodeRef::Leaf(0) => return,
			BspNodeRef::Leaf(leaf_idx) => {
				if let Some(visible) = visible {
					if !visible.get(leaf_idx as usize - 1).copied().unwrap_or(false) {
						return;
					}
				}
				visitor(leaf_idx as usize);
				return;
			}
			BspNodeRef::Node(idx) => idx,
		};

		let node = &self.nodes[node_idx as usize];
		let distance = self.planes[node.plane_idx as usize].point_side(camera);

		if distance > 0. {
			self.visit_node_leaves(node.back, camera, visible, visitor);
			self.visit_node_leaves(node.front, camera, visible, visitor);
		} else {
			self.visit_node_leaves(node.front, camera, visible, visitor);
			self.visit_node_leaves(node.back, camera, visible, visitor);
		}
	}

	/// Convenience wrapper over [Self::visit_visible_leaves] that resolves the camera's visible
	/// set itself and collects the emitted leaf indices.
	pub fn ordered_leaves(&self, camera: Vec3) -> Vec<usize> {
		let visible = self.visible_set_at(camera);

		let mut leaves = Vec::new();
		self.visit_visible_leaves(camera, visible.as_deref(), |leaf_idx| leaves.push(leaf_idx));
		leaves
	}

	/// The face indices of a leaf, through the mark-surfaces indirection.
	pub fn leaf_faces(&self, leaf_idx: usize) -> impl Iterator<Item = u16> + '_ {
		let leaf = &self.leaves[leaf_idx];
		let first = leaf.face_idx as usize;

		self.mark_surfaces[first..first + leaf.face_num as usize].iter().copied()
	}
}

#[cfg(test)]
mod tests {
	use glam::{vec3, I16Vec3};

	use crate::{
		data::{
			bsp::{BspPlane, BspPlaneType},
			nodes::{BspLeaf, BspLeafContents, BspNode, BspNodeRef},
			util::ShortBoundingBox,
			visdata::BspVisData,
		},
		entity::Entities,
		BspData, BSP_VERSION,
	};

	fn bsp_with(nodes: Vec<BspNode>, leaves: Vec<BspLeaf>, planes: Vec<BspPlane>) -> BspData {
		BspData {
			version: BSP_VERSION,
			entities: Entities::default(),
			vertices: Vec::new(),
			planes,
			edges: Vec::new(),
			surface_edges: Vec::new(),
			faces: Vec::new(),
			tex_info: Vec::new(),
			models: Vec::new(),
			nodes,
			clip_nodes: Vec::new(),
			leaves,
			mark_surfaces: Vec::new(),
			textures: Vec::new(),
			lighting: Vec::new(),
			visibility: BspVisData::default(),
		}
	}

	fn leaf(contents: BspLeafContents, min: [i16; 3], max: [i16; 3]) -> BspLeaf {
		BspLeaf {
			contents,
			vis_offset: -1,
			bound: ShortBoundingBox {
				min: I16Vec3::from_array(min),
				max: I16Vec3::from_array(max),
			},
			face_idx: 0,
			face_num: 0,
			ambience_water: 0,
			ambience_sky: 0,
			ambience_slime: 0,
			ambience_lava: 0,
		}
	}

	fn z_split_node(front: BspNodeRef, back: BspNodeRef, min: [i16; 3], max: [i16; 3]) -> BspNode {
		BspNode {
			plane_idx: 0,
			front,
			back,
			bound: ShortBoundingBox {
				min: I16Vec3::from_array(min),
				max: I16Vec3::from_array(max),
			},
			face_idx: 0,
			face_num: 0,
		}
	}

	fn z_plane() -> BspPlane {
		BspPlane {
			normal: glam::Vec3::Z,
			dist: 0.,
			ty: BspPlaneType::AxialZ,
		}
	}

	/// Leaf 1 above z=0, leaf 2 below, solid leaf 0 outside.
	fn two_leaf_bsp() -> BspData {
		bsp_with(
			vec![z_split_node(BspNodeRef::Leaf(1), BspNodeRef::Leaf(2), [-64, -64, -64], [64, 64, 64])],
			vec![
				leaf(BspLeafContents::Solid, [0, 0, 0], [0, 0, 0]),
				leaf(BspLeafContents::Empty, [-64, -64, 0], [64, 64, 64]),
				leaf(BspLeafContents::Empty, [-64, -64, -64], [64, 64, 0]),
			],
			vec![z_plane()],
		)
	}

	#[test]
	fn point_locate_finds_the_containing_leaf() {
		let bsp = two_leaf_bsp();

		assert_eq!(bsp.leaf_at_point(vec3(0., 0., 32.)), Some(1));
		assert_eq!(bsp.leaf_at_point(vec3(10., -5., -32.)), Some(2));
	}

	#[test]
	fn point_outside_every_box_is_no_leaf() {
		let bsp = two_leaf_bsp();

		assert_eq!(bsp.leaf_at_point(vec3(0., 0., 1000.)), None);
	}

	#[test]
	fn point_locate_descends_through_child_nodes() {
		// Node 0 -> node 1 in front, node 1 splits leaves 1 and 2.
		let bsp = bsp_with(
			vec![
				z_split_node(BspNodeRef::Node(1), BspNodeRef::Leaf(0), [-64, -64, -64], [64, 64, 64]),
				z_split_node(BspNodeRef::Leaf(1), BspNodeRef::Leaf(2), [-32, -32, -32], [32, 32, 32]),
			],
			vec![
				leaf(BspLeafContents::Solid, [0, 0, 0], [0, 0, 0]),
				leaf(BspLeafContents::Empty, [-32, -32, 0], [32, 32, 32]),
				leaf(BspLeafContents::Empty, [-32, -32, -32], [32, 32, 0]),
			],
			vec![z_plane()],
		);

		assert_eq!(bsp.leaf_at_point(vec3(0., 0., 16.)), Some(1));
		assert_eq!(bsp.leaf_at_point(vec3(0., 0., -16.)), Some(2));
	}

	#[test]
	fn solid_leaf_is_never_located() {
		let bsp = bsp_with(
			vec![z_split_node(BspNodeRef::Leaf(0), BspNodeRef::Leaf(0), [-64, -64, -64], [64, 64, 64])],
			vec![leaf(BspLeafContents::Solid, [-64, -64, -64], [64, 64, 64])],
			vec![z_plane()],
		);

		assert_eq!(bsp.leaf_at_point(vec3(0., 0., 0.)), None);
	}

	#[test]
	fn walk_visits_the_far_side_of_each_plane_first() {
		let bsp = two_leaf_bsp();

		// Camera above the plane (signed distance > 0): the leaf behind it comes first.
		assert_eq!(bsp.ordered_leaves(vec3(0., 0., 32.)), [2, 1]);
		// And from below, the front leaf comes first.
		assert_eq!(bsp.ordered_leaves(vec3(0., 0., -32.)), [1, 2]);
	}

	#[test]
	fn walk_skips_leaves_the_visible_set_culls() {
		let bsp = two_leaf_bsp();

		// Flag i covers leaf i + 1.
		let mut order = Vec::new();
		bsp.visit_visible_leaves(vec3(0., 0., 32.), Some(&[true, false]), |leaf_idx| order.push(leaf_idx));
		assert_eq!(order, [1]);

		let mut order = Vec::new();
		bsp.visit_visible_leaves(vec3(0., 0., 32.), None, |leaf_idx| order.push(leaf_idx));
		assert_eq!(order, [2, 1]);
	}

	#[test]
	fn visible_set_resolution_respects_the_sentinel() {
		let mut bsp = two_leaf_bsp();
		bsp.visibility = BspVisData::new(vec![0b0000_0011]);

		// Leaves compiled without visibility data cull nothing.
		assert_eq!(bsp.leaf_visible_set(1), None);

		bsp.leaves[1].vis_offset = 0;
		assert_eq!(bsp.leaf_visible_set(1), Some(vec![true, true]));
		assert_eq!(bsp.ordered_leaves(vec3(0., 0., 32.)), [2, 1]);
	}

	#[test]
	fn leaf_faces_follow_the_mark_surface_indirection() {
		let mut bsp = two_leaf_bsp();
		bsp.mark_surfaces = vec![5, 3, 8, 1];
		bsp.leaves[1].face_idx = 1;
		bsp.leaves[1].face_num = 2;

		assert_eq!(bsp.leaf_faces(1).collect::<Vec<_>>(), [3, 8]);
	}
}
