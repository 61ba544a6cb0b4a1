use hlbsp::{
	wad::{resolve_textures, Wad},
	BspData,
};
use std::{env, fs};

fn main() {
	env_logger::init();

	let mut args = env::args().skip(1);
	let bsp_path = args.next().expect("Supply a .bsp path, then zero or more .wad paths.");

	eprintln!("Reading BSP {bsp_path}");
	let data = BspData::parse(&fs::read(&bsp_path).expect("Failed to read bsp file")).unwrap();

	let wads: Vec<Wad> = args
		.map(|path| {
			eprintln!("Reading WAD {path}");
			Wad::parse(fs::read(&path).expect("Failed to read wad file")).unwrap()
		})
		.collect();

	println!("version {}", data.version);
	println!(
		"{} planes, {} vertices, {} edges, {} faces",
		data.planes.len(),
		data.vertices.len(),
		data.edges.len(),
		data.faces.len()
	);
	println!(
		"{} nodes, {} leaves, {} clip nodes, {} models",
		data.nodes.len(),
		data.leaves.len(),
		data.clip_nodes.len(),
		data.models.len()
	);
	println!("{} entities", data.entities.len());

	if let Some(spawn) = data.entities.find_by_value("info_player_start") {
		let Some(origin) = spawn.vec3_property("origin") else {
			println!("player start has no origin");
			return;
		};
		match data.leaf_at_point(origin) {
			Some(leaf_idx) => println!(
				"player start at {origin} in leaf {leaf_idx} ({}), {} leaves visible from there",
				data.leaves[leaf_idx].contents,
				data.ordered_leaves(origin).len()
			),
			None => println!("player start at {origin}, outside the tree"),
		}
	}

	let lookup = resolve_textures(&data, &wads).unwrap();
	let resolved = lookup.textures.iter().flatten().count() - lookup.missing.len();
	println!("{} textures resolved, {} missing", resolved, lookup.missing.len());
	for missing in &lookup.missing {
		println!("  missing: {} (slot {})", missing.name, missing.index);
	}
}
