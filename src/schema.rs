use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use nutil::{Endian, NError};

use crate::context::Context;
use crate::node::DecodedNode;

/// Path segment naming the array element currently being decoded, so rules
/// inside an element read its own fields: `"Records.*.Len"`.
pub const ELEMENT: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
	U8,
	U16,
	U32,
	U64,
	I8,
	I16,
	I32,
	I64,
	//Single byte character
	Char,
}
impl Primitive {
	pub fn width(self) -> usize {
		match self {
			Primitive::U8 | Primitive::I8 | Primitive::Char => 1,
			Primitive::U16 | Primitive::I16 => 2,
			Primitive::U32 | Primitive::I32 => 4,
			Primitive::U64 | Primitive::I64 => 8,
		}
	}
	pub fn is_signed(self) -> bool {
		matches!(self, Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
	//First declared flag is bit 0
	#[default]
	LsbFirst,
	MsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag {
	pub name: &'static str,
	pub bits: u8,
	pub label: Option<&'static str>,
}
impl Flag {
	pub const fn bit(name: &'static str, label: &'static str) -> Self {
		Self { name, bits: 1, label: Some(label) }
	}
	pub const fn span(name: &'static str, bits: u8) -> Self {
		Self { name, bits, label: None }
	}
}

pub type LengthFn = fn(&Context<'_>) -> Result<i128, NError>;
pub type PredicateFn = fn(&Context<'_>) -> Result<bool, NError>;
pub type ValidatorFn = fn(&DecodedNode, &Context<'_>) -> Vec<Finding>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
	//Relative to the validated node
	pub path: String,
	pub message: String,
}
impl Finding {
	pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self { path: path.into(), message: message.into() }
	}
}

/// Element count of an array. A computed rule names the document paths it
/// reads so they can be checked against decode order up front.
#[derive(Clone)]
pub enum LengthRule {
	Fixed(usize),
	Computed { reads: &'static [&'static str], func: LengthFn },
}
impl fmt::Debug for LengthRule {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			LengthRule::Fixed(n) => write!(f, "Fixed({})", n),
			LengthRule::Computed { reads, .. } => write!(f, "Computed(reads {:?})", reads),
		}
	}
}

#[derive(Clone)]
pub struct Alternative {
	pub name: String,
	pub reads: &'static [&'static str],
	pub predicate: PredicateFn,
	pub fields: Vec<(String, Schema)>,
}
impl Alternative {
	pub fn new<N: Into<String>>(
		name: &str,
		reads: &'static [&'static str],
		predicate: PredicateFn,
		fields: Vec<(N, Schema)>,
	) -> Self {
		Self {
			name: name.to_string(),
			reads,
			predicate,
			fields: named(fields),
		}
	}
}
impl fmt::Debug for Alternative {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Alternative")
			.field("name", &self.name)
			.field("reads", &self.reads)
			.field("fields", &self.fields)
			.finish()
	}
}

#[derive(Clone, Copy)]
pub struct Validator(pub ValidatorFn);
impl fmt::Debug for Validator {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("Validator")
	}
}

#[derive(Debug, Clone)]
pub enum SchemaKind {
	Primitive { prim: Primitive, endian: Endian },
	Struct(Vec<(String, Schema)>),
	Array { element: Box<Schema>, length: LengthRule },
	Bitfield { underlying: Primitive, endian: Endian, flags: &'static [Flag], order: BitOrder },
	Enum { name: &'static str, underlying: Primitive, endian: Endian, symbols: &'static [(&'static str, u64)] },
	TaggedUnion { prefix: Vec<(String, Schema)>, alternatives: Vec<Alternative>, fallback: Vec<(String, Schema)> },
}

#[derive(Debug, Clone)]
pub struct Schema {
	pub kind: SchemaKind,
	pub label: Option<&'static str>,
	pub validator: Option<Validator>,
}

fn named<N: Into<String>>(fields: Vec<(N, Schema)>) -> Vec<(String, Schema)> {
	fields.into_iter().map(|(n, s)| (n.into(), s)).collect()
}

impl Schema {
	fn of(kind: SchemaKind) -> Self {
		Self { kind, label: None, validator: None }
	}

	pub fn primitive(prim: Primitive) -> Self {
		Self::of(SchemaKind::Primitive { prim, endian: Endian::Little })
	}
	pub fn u8() -> Self { Self::primitive(Primitive::U8) }
	pub fn u16() -> Self { Self::primitive(Primitive::U16) }
	pub fn u32() -> Self { Self::primitive(Primitive::U32) }
	pub fn u64() -> Self { Self::primitive(Primitive::U64) }
	pub fn char() -> Self { Self::primitive(Primitive::Char) }

	pub fn structure<N: Into<String>>(fields: Vec<(N, Schema)>) -> Self {
		Self::of(SchemaKind::Struct(named(fields)))
	}

	pub fn array(element: Schema, count: usize) -> Self {
		Self::of(SchemaKind::Array { element: Box::new(element), length: LengthRule::Fixed(count) })
	}
	pub fn array_dependent(element: Schema, reads: &'static [&'static str], func: LengthFn) -> Self {
		Self::of(SchemaKind::Array {
			element: Box::new(element),
			length: LengthRule::Computed { reads, func },
		})
	}

	pub fn bitfield(underlying: Primitive, flags: &'static [Flag]) -> Self {
		Self::of(SchemaKind::Bitfield { underlying, endian: Endian::Little, flags, order: BitOrder::LsbFirst })
	}

	pub fn enumeration(name: &'static str, underlying: Primitive, symbols: &'static [(&'static str, u64)]) -> Self {
		Self::of(SchemaKind::Enum { name, underlying, endian: Endian::Little, symbols })
	}

	pub fn tagged_union<P: Into<String>, F: Into<String>>(
		prefix: Vec<(P, Schema)>,
		alternatives: Vec<Alternative>,
		fallback: Vec<(F, Schema)>,
	) -> Self {
		Self::of(SchemaKind::TaggedUnion {
			prefix: named(prefix),
			alternatives,
			fallback: named(fallback),
		})
	}

	pub fn labelled(mut self, label: &'static str) -> Self {
		self.label = Some(label);
		self
	}
	pub fn validated(mut self, validator: ValidatorFn) -> Self {
		self.validator = Some(Validator(validator));
		self
	}

	// Applies to primitives, bitfields and enums; composites keep their children's order
	pub fn big_endian(mut self) -> Self {
		match &mut self.kind {
			SchemaKind::Primitive { endian, .. }
			| SchemaKind::Bitfield { endian, .. }
			| SchemaKind::Enum { endian, .. } => *endian = Endian::Big,
			_ => (),
		}
		self
	}
	pub fn msb_first(mut self) -> Self {
		if let SchemaKind::Bitfield { order, .. } = &mut self.kind {
			*order = BitOrder::MsbFirst;
		}
		self
	}

	/// Byte width when it does not depend on decoded data.
	pub fn fixed_width(&self) -> Option<usize> {
		match &self.kind {
			SchemaKind::Primitive { prim, .. }
			| SchemaKind::Bitfield { underlying: prim, .. }
			| SchemaKind::Enum { underlying: prim, .. } => Some(prim.width()),
			SchemaKind::Struct(fields) => fields.iter()
				.try_fold(0usize, |total, (_, s)| total.checked_add(s.fixed_width()?)),
			SchemaKind::Array { element, length: LengthRule::Fixed(n) } => {
				element.fixed_width().and_then(|w| w.checked_mul(*n))
			}
			SchemaKind::Array { .. } | SchemaKind::TaggedUnion { .. } => None,
		}
	}
}

/// A schema that passed the construction checks. Cheap to clone and safe to
/// share between threads decoding different buffers.
#[derive(Debug, Clone)]
pub struct Layout {
	root: Arc<Schema>,
}
impl Layout {
	pub fn new(root: Schema) -> Result<Self, NError> {
		let mut checker = Checker::default();
		checker.node("", &root)?;
		Ok(Self { root: Arc::new(root) })
	}

	pub fn schema(&self) -> &Schema {
		&self.root
	}
}

fn join(path: &str, name: &str) -> String {
	if path.is_empty() { name.to_string() } else { format!("{}.{}", path, name) }
}

// Walks the schema in decode order, tracking which paths are certain to be
// decoded at each point
#[derive(Default)]
struct Checker {
	available: HashSet<String>,
}
impl Checker {
	fn node(&mut self, path: &str, schema: &Schema) -> Result<(), NError> {
		match &schema.kind {
			SchemaKind::Primitive { .. } => (),
			SchemaKind::Struct(fields) => {
				unique_names(path, fields.iter().map(|(n, _)| n.as_str()))?;
				self.fields(path, fields)?;
			}
			SchemaKind::Array { element, length } => {
				if let LengthRule::Computed { reads, .. } = length {
					self.require(path, reads)?;
				}
				// Only the open element is reachable, and only while it is open
				let saved = self.available.clone();
				self.node(&join(path, ELEMENT), element)?;
				self.available = saved;
			}
			SchemaKind::Bitfield { underlying, flags, .. } => {
				if underlying.is_signed() || *underlying == Primitive::Char {
					return Err(schema_err(path, "bitfield must sit on an unsigned integer"));
				}
				unique_names(path, flags.iter().map(|f| f.name))?;
				let mut total = 0usize;
				for flag in flags.iter() {
					check_name(path, flag.name)?;
					if flag.bits == 0 {
						return Err(schema_err(path, &format!("flag {} has zero width", flag.name)));
					}
					total += flag.bits as usize;
				}
				if total > underlying.width() * 8 {
					return Err(schema_err(path, &format!(
						"flags need {} bits but the underlying integer has {}",
						total, underlying.width() * 8)));
				}
				for flag in flags.iter() {
					self.available.insert(join(path, flag.name));
				}
			}
			SchemaKind::Enum { underlying, symbols, .. } => {
				if underlying.is_signed() {
					return Err(schema_err(path, "enumeration must sit on an unsigned integer"));
				}
				unique_names(path, symbols.iter().map(|(s, _)| *s))?;
			}
			SchemaKind::TaggedUnion { prefix, alternatives, fallback } => {
				let layouts = alternatives.iter()
					.map(|a| &a.fields)
					.chain(std::iter::once(fallback));
				for fields in layouts {
					unique_names(path, prefix.iter().chain(fields.iter()).map(|(n, _)| n.as_str()))?;
				}

				self.fields(path, prefix)?;
				for alt in alternatives {
					self.require(path, alt.reads)?;
				}

				// Only what every layout decodes is certain afterwards
				let base = self.available.clone();
				let mut common: Option<HashSet<String>> = None;
				let layouts = alternatives.iter()
					.map(|a| &a.fields)
					.chain(std::iter::once(fallback));
				for fields in layouts {
					self.available = base.clone();
					self.fields(path, fields)?;
					common = Some(match common {
						Some(c) => c.intersection(&self.available).cloned().collect(),
						None => self.available.clone(),
					});
				}
				self.available = common.unwrap_or(base);
			}
		}
		self.available.insert(path.to_string());
		Ok(())
	}

	fn fields(&mut self, path: &str, fields: &[(String, Schema)]) -> Result<(), NError> {
		for (name, schema) in fields {
			check_name(path, name)?;
			self.node(&join(path, name), schema)?;
		}
		Ok(())
	}

	fn require(&self, path: &str, reads: &[&str]) -> Result<(), NError> {
		match reads.iter().find(|r| !self.available.contains(**r)) {
			Some(missing) => Err(schema_err(path, &format!("reads {} before it is decoded", missing))),
			None => Ok(()),
		}
	}
}

fn check_name(path: &str, name: &str) -> Result<(), NError> {
	if name.is_empty() || name.contains('.') || name == ELEMENT {
		return Err(schema_err(path, &format!("invalid field name {:?}", name)));
	}
	Ok(())
}

fn unique_names<'a>(path: &str, names: impl Iterator<Item = &'a str>) -> Result<(), NError> {
	let mut seen = HashSet::new();
	for name in names {
		if !seen.insert(name) {
			return Err(schema_err(path, &format!("duplicate name {}", name)));
		}
	}
	Ok(())
}

fn schema_err(path: &str, msg: &str) -> NError {
	let at = if path.is_empty() { "<root>" } else { path };
	NError::ErrSchema(format!("{}: {}", at, msg))
}
