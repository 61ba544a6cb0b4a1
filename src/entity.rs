//! The text sub-parser for the entities lump: brace-delimited blocks of quoted key/value properties.
//!
//! The grammar is loose and historically hand-edited, so this parser is tolerant: anomalies inside
//! a block degrade to fewer properties, and only a file-level brace mismatch is fatal.

use glam::Vec3;
use smallvec::SmallVec;

use crate::{BspParseError, BspResult};

/// The separator some editors substitute for commas inside connection values.
const CONNECTION_SEPARATOR: char = '\u{1B}';

/// A single entity: an ordered key/value property map. Duplicate keys keep the first value seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
	properties: Vec<(String, String)>,
}

impl Entity {
	/// The value of `key`, or `None` if the entity doesn't have it.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.get(key).is_some()
	}

	/// The properties in the order they appear in the block.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.properties.len()
	}

	pub fn is_empty(&self) -> bool {
		self.properties.is_empty()
	}

	/// The `classname` property, which nearly every entity carries.
	pub fn class_name(&self) -> Option<&str> {
		self.get("classname")
	}

	/// Parses a `"x y z"` triple the tolerant way hand-edited maps need: missing or malformed
	/// components fall back to zero.
	pub fn vec3_property(&self, key: &str) -> Option<Vec3> {
		let value = self.get(key)?;
		let mut components = [0.; 3];
		for (slot, token) in components.iter_mut().zip(value.split(' ')) {
			*slot = token.parse().unwrap_or_default();
		}

		Some(Vec3::from_array(components))
	}

	/// First occurrence wins; later duplicates are dropped silently.
	fn insert_first(&mut self, key: String, value: String) {
		if !self.contains_key(&key) {
			self.properties.push((key, value));
		}
	}
}

/// All entities of a map, in file order.
#[derive(Debug, Clone, Default, PartialEq, derive_more::Deref, derive_more::DerefMut, derive_more::IntoIterator)]
pub struct Entities {
	#[deref]
	#[deref_mut]
	#[into_iterator(owned, ref, ref_mut)]
	pub inner: Vec<Entity>,
}

impl Entities {
	/// The first entity, in scan order, with any property *value* equal to `value`. This is how
	/// spawn points are found: the entity whose values contain `"info_player_start"`.
	pub fn find_by_value(&self, value: &str) -> Option<&Entity> {
		self.inner.iter().find(|entity| entity.iter().any(|(_, v)| v == value))
	}
}

/// Splits the raw lump bytes into brace-delimited blocks and parses each block into an [Entity].
///
/// A `{` or `}` only delimits a block when it is outside quotes *and* preceded by whitespace (or
/// starts the buffer); texture paths are known to contain bare braces. Zero entities is a valid
/// result. The only fatal error is nonzero brace depth at the end of the buffer.
pub fn parse_entities(data: &[u8]) -> BspResult<Entities> {
	let mut entities = Vec::new();

	let mut in_quotes = false;
	let mut depth = 0i32;
	let mut block: Vec<u8> = Vec::new();

	for (offset, &byte) in data.iter().enumerate() {
		// Compilers pad the lump with NULs past the last block.
		if byte == 0 {
			break;
		}

		// Escape-sequenced quotes don't affect the state machine.
		if byte == b'"' && (offset == 0 || data[offset - 1] != b'\\') {
			in_quotes = !in_quotes;
		}

		let brace_significant = !in_quotes && (offset == 0 || matches!(data[offset - 1], b'\n' | b'\t' | b' ' | b'\r'));

		if byte == b'{' && brace_significant {
			depth += 1;
		}

		if depth > 0 {
			block.push(byte);
		}

		if byte == b'}' && brace_significant {
			depth -= 1;
			if depth == 0 {
				entities.push(parse_block(&block));
				block.clear();
			}
		}
	}

	if depth != 0 {
		return Err(BspParseError::UnbalancedBraces { depth });
	}

	Ok(Entities { inner: entities })
}

/// Stage-two state, threaded line to line through [parse_line].
#[derive(Debug, Clone, Copy, Default)]
struct BlockState {
	depth: i32,
	/// Inside a brush substructure, whose lines are opaque and skipped.
	in_brush: bool,
	/// Inside a `connections` substructure; its key/values are caught by the tuple heuristic.
	in_connections: bool,
}

fn parse_block(block: &[u8]) -> Entity {
	let text = String::from_utf8_lossy(block);

	let mut entity = Entity::default();
	let mut state = BlockState::default();

	for line in text.split('\n') {
		let (next, properties) = parse_line(state, line);
		state = next;
		for (key, value) in properties {
			entity.insert_first(key, value);
		}
	}

	entity
}

/// Processes one line of an entity block, returning the successor state and any properties the
/// line contributes. Pure: all context lives in [BlockState].
fn parse_line(mut state: BlockState, line: &str) -> (BlockState, SmallVec<[(String, String); 1]>) {
	let line = line.trim_matches([' ', '\t', '\r']);
	let line = strip_comment(line);

	if line.is_empty() {
		return (state, SmallVec::new());
	}

	match line.as_bytes()[0] {
		b'{' => {
			// A nested block with no prior information is assumed to be a brush.
			if state.depth == 1 && !state.in_brush && !state.in_connections {
				state.in_brush = true;
			}
			state.depth += 1;
		}
		b'}' => {
			state.depth -= 1;
			if state.depth == 1 {
				state.in_brush = false;
				state.in_connections = false;
			}
			return (state, SmallVec::new());
		}
		_ if line.starts_with("solid") => {
			state.in_brush = true;
			return (state, SmallVec::new());
		}
		_ if line.starts_with("connections") => {
			state.in_connections = true;
			return (state, SmallVec::new());
		}
		_ => {}
	}

	if state.in_brush {
		return (state, SmallVec::new());
	}

	let properties = parse_properties(line);
	(state, properties)
}

/// Truncates `line` at the first `//` outside quotes.
fn strip_comment(line: &str) -> &str {
	let bytes = line.as_bytes();
	let mut in_quotes = false;

	for i in 0..bytes.len() {
		if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
			in_quotes = !in_quotes;
		}
		if !in_quotes && bytes[i] == b'/' && i != 0 && bytes[i - 1] == b'/' {
			return &line[..i - 1];
		}
	}

	line
}

/// Extracts the quoted key/value pairs of a line. Values that look like connection tuples (4 or 6
/// unescaped separators) are validated as 5- or 7-field connections and dropped, never stored as
/// properties.
fn parse_properties(line: &str) -> SmallVec<[(String, String); 1]> {
	let mut properties = SmallVec::new();

	let mut key = String::new();
	let mut value = String::new();
	let mut in_quotes = false;
	let mut is_value = false;
	let mut separators = 0usize;
	let mut prev = None;

	for ch in line.chars() {
		// Escape-sequenced quotes are content, not delimiters.
		if ch == '"' && prev != Some('\\') {
			if in_quotes && is_value {
				// The value's closing quote completes a pair.
				push_property(&mut properties, std::mem::take(&mut key), std::mem::take(&mut value), separators);
				is_value = false;
				separators = 0;
			} else if in_quotes {
				is_value = true;
			}
			in_quotes = !in_quotes;
		} else if in_quotes {
			if !is_value {
				key.push(ch);
			} else {
				value.push(ch);
				if ch == ',' || ch == CONNECTION_SEPARATOR {
					separators += 1;
				}
			}
		}
		prev = Some(ch);
	}

	properties
}

fn push_property(properties: &mut SmallVec<[(String, String); 1]>, key: String, value: String, separators: usize) {
	if key.is_empty() {
		return;
	}

	if separators == 4 || separators == 6 {
		// A heuristic, not validated against a schema: this many separators means a Source-style
		// connection tuple rather than a plain property.
		let mut fields: SmallVec<[&str; 7]> = value.split(',').collect();
		if fields.len() < 5 {
			fields = value.split(CONNECTION_SEPARATOR).collect();
		}
		if matches!(fields.len(), 5 | 7) {
			log::trace!("dropping connection {key:?} -> {:?}", fields.as_slice());
		}
		return;
	}

	properties.push((key, value));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_entity_block() {
		let entities = parse_entities(br#"{ "classname" "info_player_start" "origin" "0 0 64" }"#).unwrap();

		assert_eq!(entities.len(), 1);
		assert_eq!(entities[0].class_name(), Some("info_player_start"));
		assert_eq!(entities[0].get("origin"), Some("0 0 64"));
	}

	#[test]
	fn multi_line_entities() {
		let text = b"{\n\"classname\" \"worldspawn\"\n\"wad\" \"halflife.wad\"\n}\n{\n\"classname\" \"light\"\n\"_light\" \"255 255 255 200\"\n}\n";
		let entities = parse_entities(text).unwrap();

		assert_eq!(entities.len(), 2);
		assert_eq!(entities[0].class_name(), Some("worldspawn"));
		assert_eq!(entities[1].get("_light"), Some("255 255 255 200"));
	}

	#[test]
	fn empty_input_yields_no_entities() {
		assert_eq!(parse_entities(b"").unwrap().len(), 0);
		assert_eq!(parse_entities(b"\n\n").unwrap().len(), 0);
	}

	#[test]
	fn unbalanced_braces_fail() {
		assert!(matches!(
			parse_entities(br#"{ "a" "b" } }"#),
			Err(BspParseError::UnbalancedBraces { depth: -1 })
		));
		assert!(matches!(
			parse_entities(br#"{ "a" "b""#),
			Err(BspParseError::UnbalancedBraces { depth: 1 })
		));
	}

	#[test]
	fn glued_brace_is_not_a_delimiter() {
		// The second `}` touches the first, so it is not brace-significant; mapmakers have
		// shipped exactly this.
		let entities = parse_entities(br#"{ "a" "b" }}"#).unwrap();
		assert_eq!(entities.len(), 1);
		assert_eq!(entities[0].get("a"), Some("b"));
	}

	#[test]
	fn braces_inside_quotes_are_content() {
		let entities = parse_entities(b"{\n\"texture\" \"{blue\"\n}").unwrap();

		assert_eq!(entities.len(), 1);
		assert_eq!(entities[0].get("texture"), Some("{blue"));
	}

	#[test]
	fn duplicate_keys_keep_the_first_value() {
		let entities = parse_entities(b"{\n\"speed\" \"100\"\n\"speed\" \"200\"\n}").unwrap();

		assert_eq!(entities[0].get("speed"), Some("100"));
		assert_eq!(entities[0].len(), 1);
	}

	#[test]
	fn comments_are_culled_outside_quotes() {
		let entities = parse_entities(b"{\n\"classname\" \"light\" // hand-placed\n\"path\" \"foo//bar\"\n}").unwrap();

		assert_eq!(entities[0].class_name(), Some("light"));
		assert_eq!(entities[0].get("path"), Some("foo//bar"));
	}

	#[test]
	fn brush_substructures_are_skipped() {
		let text = b"{\n\"classname\" \"func_door\"\n{\n( 0 0 0 ) ( 0 1 0 ) ( 0 0 1 ) METAL 0 0 0\n\"speed\" \"900\"\n}\n\"speed\" \"100\"\n}";
		let entities = parse_entities(text).unwrap();

		assert_eq!(entities.len(), 1);
		// The nested block's lines must not leak into the entity's properties.
		assert_eq!(entities[0].get("speed"), Some("100"));
	}

	#[test]
	fn connection_tuples_are_dropped() {
		let text = b"{\n\"classname\" \"func_button\"\n\"OnPressed\" \"door1,Open,,0,1\"\n\"targetname\" \"button1\"\n}";
		let entities = parse_entities(text).unwrap();

		assert_eq!(entities[0].get("OnPressed"), None);
		assert_eq!(entities[0].get("targetname"), Some("button1"));
	}

	#[test]
	fn find_by_value_scans_in_order() {
		let text = b"{\n\"classname\" \"worldspawn\"\n}\n{\n\"classname\" \"info_player_start\"\n\"origin\" \"16 0 40\"\n}";
		let entities = parse_entities(text).unwrap();

		let spawn = entities.find_by_value("info_player_start").unwrap();
		assert_eq!(spawn.vec3_property("origin"), Some(Vec3::new(16., 0., 40.)));

		assert!(entities.find_by_value("trigger_once").is_none());
	}

	#[test]
	fn malformed_lines_degrade_to_fewer_properties() {
		let text = b"{\n\"orphan\"\nnot quoted at all\n\"classname\" \"light\"\n}";
		let entities = parse_entities(text).unwrap();

		assert_eq!(entities.len(), 1);
		assert_eq!(entities[0].class_name(), Some("light"));
	}
}
