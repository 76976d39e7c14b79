use std::ops::Range;

use nutil::NError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	Primitive,
	Struct,
	Array,
	Bitfield,
	Enum,
	TaggedUnion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
	Unsigned(u64),
	Signed(i64),
	Char(u8),
	Bool(bool),
}

//Ordered name -> node mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields(Vec<(String, DecodedNode)>);
impl Fields {
	pub fn get(&self, name: &str) -> Option<&DecodedNode> {
		self.0.iter().find(|(n, _)| n == name).map(|(_, node)| node)
	}
	fn get_mut(&mut self, name: &str) -> Option<&mut DecodedNode> {
		self.0.iter_mut().find(|(n, _)| n == name).map(|(_, node)| node)
	}
	pub fn iter(&self) -> impl Iterator<Item = (&str, &DecodedNode)> {
		self.0.iter().map(|(n, node)| (n.as_str(), node))
	}
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|(n, _)| n.as_str())
	}
	pub fn len(&self) -> usize {
		self.0.len()
	}
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<Vec<(String, DecodedNode)>> for Fields {
	fn from(fields: Vec<(String, DecodedNode)>) -> Self {
		Self(fields)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Primitive(Scalar),
	Struct(Fields),
	Array(Vec<DecodedNode>),
	Bitfield { raw: u64, flags: Fields },
	Enum { name: &'static str, raw: u64, symbol: Option<&'static str> },
	/// `variant` is `None` when the fallback layout was decoded.
	TaggedUnion { variant: Option<String>, fields: Fields },
}

/// One decoded schema element: its source bytes, its value and any validation
/// finding attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNode {
	range: Range<usize>,
	value: Value,
	label: Option<&'static str>,
	error: Option<String>,
}
impl DecodedNode {
	pub(crate) fn new(range: Range<usize>, value: Value, label: Option<&'static str>) -> Self {
		Self { range, value, label, error: None }
	}

	pub fn range(&self) -> Range<usize> {
		self.range.clone()
	}
	pub fn start(&self) -> usize {
		self.range.start
	}
	pub fn end(&self) -> usize {
		self.range.end
	}
	pub fn len(&self) -> usize {
		self.range.end - self.range.start
	}
	pub fn is_empty(&self) -> bool {
		self.range.is_empty()
	}
	pub fn value(&self) -> &Value {
		&self.value
	}
	pub fn label(&self) -> Option<&'static str> {
		self.label
	}
	pub fn error(&self) -> Option<&str> {
		self.error.as_deref()
	}

	pub fn kind(&self) -> NodeKind {
		match self.value {
			Value::Primitive(_) => NodeKind::Primitive,
			Value::Struct(_) => NodeKind::Struct,
			Value::Array(_) => NodeKind::Array,
			Value::Bitfield { .. } => NodeKind::Bitfield,
			Value::Enum { .. } => NodeKind::Enum,
			Value::TaggedUnion { .. } => NodeKind::TaggedUnion,
		}
	}

	pub fn fields(&self) -> Option<&Fields> {
		match &self.value {
			Value::Struct(f) | Value::Bitfield { flags: f, .. } | Value::TaggedUnion { fields: f, .. } => Some(f),
			_ => None,
		}
	}
	pub fn elements(&self) -> Option<&[DecodedNode]> {
		match &self.value {
			Value::Array(items) => Some(items),
			_ => None,
		}
	}

	// Named child, or element index for arrays
	pub fn child(&self, segment: &str) -> Option<&DecodedNode> {
		match &self.value {
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => self.fields()?.get(segment),
		}
	}
	fn child_mut(&mut self, segment: &str) -> Option<&mut DecodedNode> {
		match &mut self.value {
			Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
			Value::Struct(f) | Value::Bitfield { flags: f, .. } | Value::TaggedUnion { fields: f, .. } => f.get_mut(segment),
			_ => None,
		}
	}

	/// Dotted path lookup relative to this node, e.g. `"PEHeader.Machine"` or
	/// `"SectionHeaders.0.Name"`. The empty path is the node itself.
	pub fn lookup(&self, path: &str) -> Option<&DecodedNode> {
		if path.is_empty() {
			return Some(self);
		}
		path.split('.').try_fold(self, |node, segment| node.child(segment))
	}

	pub fn as_u64(&self) -> Option<u64> {
		match self.value {
			Value::Primitive(Scalar::Unsigned(v)) => Some(v),
			Value::Primitive(Scalar::Char(c)) => Some(c as u64),
			Value::Primitive(Scalar::Bool(b)) => Some(b as u64),
			Value::Primitive(Scalar::Signed(v)) => u64::try_from(v).ok(),
			Value::Enum { raw, .. } | Value::Bitfield { raw, .. } => Some(raw),
			_ => None,
		}
	}
	pub fn as_i64(&self) -> Option<i64> {
		match self.value {
			Value::Primitive(Scalar::Signed(v)) => Some(v),
			_ => self.as_u64().and_then(|v| i64::try_from(v).ok()),
		}
	}
	pub fn as_bool(&self) -> Option<bool> {
		match self.value {
			Value::Primitive(Scalar::Bool(b)) => Some(b),
			_ => None,
		}
	}
	pub fn symbol(&self) -> Option<&'static str> {
		match self.value {
			Value::Enum { symbol, .. } => symbol,
			_ => None,
		}
	}

	//Raw bytes of an array of chars
	pub fn char_bytes(&self) -> Option<Vec<u8>> {
		self.elements()?
			.iter()
			.map(|e| match e.value {
				Value::Primitive(Scalar::Char(c)) => Some(c),
				_ => None,
			})
			.collect()
	}

	pub fn bytes<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
		source.get(self.range.clone())
	}

	/// Pre-order walk over this subtree; the callback receives each node's path
	/// relative to this node.
	pub fn walk<F: FnMut(&str, &DecodedNode)>(&self, f: &mut F) {
		self.walk_from(String::new(), f);
	}
	fn walk_from<F: FnMut(&str, &DecodedNode)>(&self, path: String, f: &mut F) {
		f(&path, self);
		let join = |name: &str| if path.is_empty() { name.to_string() } else { format!("{}.{}", path, name) };
		match &self.value {
			Value::Array(items) => {
				for (i, item) in items.iter().enumerate() {
					item.walk_from(join(&i.to_string()), f);
				}
			}
			_ => {
				if let Some(fields) = self.fields() {
					for (name, child) in fields.iter() {
						child.walk_from(join(name), f);
					}
				}
			}
		}
	}

	// (path, message) for every annotated node in the subtree
	pub fn errors(&self) -> Vec<(String, String)> {
		let mut out = Vec::new();
		self.walk(&mut |path, node| {
			if let Some(e) = node.error() {
				out.push((path.to_string(), e.to_string()));
			}
		});
		out
	}

	/// Folds a validation finding into the subtree while it is still being built.
	/// Several findings on one node are joined with `"; "`.
	pub(crate) fn with_finding(mut self, path: &str, message: String) -> Result<Self, NError> {
		let target = if path.is_empty() {
			Some(&mut self)
		}
		else {
			path.split('.').try_fold(&mut self, |node, segment| node.child_mut(segment))
		};
		let target = target.ok_or_else(|| {
			NError::ErrSchema(format!("Validator reported a finding for unknown field {}", path))
		})?;

		target.error = Some(match target.error.take() {
			Some(prev) => format!("{}; {}", prev, message),
			None => message,
		});
		Ok(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn leaf(at: usize, v: u64) -> DecodedNode {
		DecodedNode::new(at..at + 1, Value::Primitive(Scalar::Unsigned(v)), None)
	}

	fn sample() -> DecodedNode {
		let magic = DecodedNode::new(0..2, Value::Struct(Fields::from(vec![
			("Byte0".to_string(), DecodedNode::new(0..1, Value::Primitive(Scalar::Char(0x4d)), None)),
			("Byte1".to_string(), DecodedNode::new(1..2, Value::Primitive(Scalar::Char(0x5a)), None)),
		])), None);
		let list = DecodedNode::new(2..4, Value::Array(vec![leaf(2, 7), leaf(3, 9)]), None);
		DecodedNode::new(0..4, Value::Struct(Fields::from(vec![
			("Magic".to_string(), magic),
			("List".to_string(), list),
		])), None)
	}

	#[test]
	fn lookup_by_path() {
		let root = sample();
		assert_eq!(root.lookup("Magic.Byte1").and_then(|n| n.as_u64()), Some(0x5a));
		assert_eq!(root.lookup("List.1").and_then(|n| n.as_u64()), Some(9));
		assert_eq!(root.lookup("").map(|n| n.kind()), Some(NodeKind::Struct));
		assert!(root.lookup("List.2").is_none());
		assert!(root.lookup("Magic.Byte2").is_none());
		assert_eq!(root.lookup("Magic").unwrap().char_bytes(), None);
	}

	#[test]
	fn findings_accumulate_on_the_leaf() {
		let root = sample()
			.with_finding("Magic.Byte0", "Must == 0x4D".into()).unwrap()
			.with_finding("Magic.Byte0", "again".into()).unwrap()
			.with_finding("List.0", "bad".into()).unwrap();

		assert_eq!(root.lookup("Magic.Byte0").unwrap().error(), Some("Must == 0x4D; again"));
		assert_eq!(root.errors(), vec![
			("Magic.Byte0".to_string(), "Must == 0x4D; again".to_string()),
			("List.0".to_string(), "bad".to_string()),
		]);
	}

	#[test]
	fn finding_on_missing_field_is_a_schema_error() {
		let res = sample().with_finding("Magic.Byte7", "x".into());
		assert!(matches!(res, Err(NError::ErrSchema(_))));
	}

	#[test]
	fn walk_visits_in_document_order() {
		let mut paths = Vec::new();
		sample().walk(&mut |path, _| paths.push(path.to_string()));
		assert_eq!(paths, ["", "Magic", "Magic.Byte0", "Magic.Byte1", "List", "List.0", "List.1"]);
	}
}
