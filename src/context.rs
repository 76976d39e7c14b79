use nutil::NError;

use crate::node::DecodedNode;
use crate::schema::ELEMENT;

//A composite whose children are still being decoded
#[derive(Debug, Default)]
pub(crate) struct Frame {
	pub name: String,
	pub fields: Vec<(String, DecodedNode)>,
}
impl Frame {
	pub fn new(name: &str) -> Self {
		Self { name: name.to_string(), fields: Vec::new() }
	}
}

/// The document as decoded so far: every finished node, addressed by its
/// dotted path from the document root.
#[derive(Debug, Clone, Copy)]
pub struct Context<'d> {
	frames: &'d [Frame],
}
impl<'d> Context<'d> {
	pub(crate) fn new(frames: &'d [Frame]) -> Self {
		Self { frames }
	}

	/// Composites still under construction are walked through; the node the
	/// path finally names must already be complete. [`ELEMENT`] steps into the
	/// array element that is still open, never a finished one.
	pub fn lookup(&self, path: &str) -> Option<&'d DecodedNode> {
		let mut segments = path.split('.');
		let mut depth = 0;

		while let Some(segment) = segments.next() {
			let frame = self.frames.get(depth)?;
			if segment != ELEMENT {
				if let Some((_, node)) = frame.fields.iter().find(|(n, _)| n == segment) {
					let rest = segments.by_ref().collect::<Vec<&str>>().join(".");
					return node.lookup(&rest);
				}
			}

			depth += 1;
			let open = self.frames.get(depth)?;
			if segment != ELEMENT && open.name != segment {
				return None;
			}
		}
		None
	}

	pub fn uint(&self, path: &str) -> Result<u64, NError> {
		self.lookup(path)
			.and_then(|node| node.as_u64())
			.ok_or_else(|| NError::ErrMissingField(path.to_string()))
	}

	pub fn byte(&self, path: &str) -> Result<u8, NError> {
		let v = self.uint(path)?;
		u8::try_from(v).map_err(|_| NError::ErrSchema(format!("{} does not fit in a byte", path)))
	}
}
