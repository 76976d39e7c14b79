use nutil::{Cursor, Endian, NError};
use tracing::{debug, trace};

use crate::context::{Context, Frame};
use crate::node::{DecodedNode, Fields, Scalar, Value};
use crate::schema::{Alternative, BitOrder, Flag, LengthRule, Layout, Primitive, Schema, SchemaKind};

/// A decoded buffer together with the layout it was decoded with.
#[derive(Debug, Clone)]
pub struct Document {
	root: DecodedNode,
	layout: Layout,
}
impl Document {
	pub fn root(&self) -> &DecodedNode {
		&self.root
	}
	pub fn layout(&self) -> &Layout {
		&self.layout
	}
	pub fn lookup(&self, path: &str) -> Option<&DecodedNode> {
		self.root.lookup(path)
	}
	pub fn validation_errors(&self) -> Vec<(String, String)> {
		self.root.errors()
	}
	pub fn is_valid(&self) -> bool {
		self.validation_errors().is_empty()
	}
}
impl PartialEq for Document {
	fn eq(&self, other: &Self) -> bool {
		self.root == other.root
	}
}

/// Decodes `source` from offset 0 according to `layout`.
///
/// Only structural problems fail the call; validation findings are attached to
/// the returned document.
pub fn decode(layout: &Layout, source: &[u8]) -> Result<Document, NError> {
	let mut decoder = Decoder {
		cursor: Cursor::new(source),
		frames: Vec::new(),
	};
	let root = decoder.node("", layout.schema())?;
	debug!(consumed = root.len(), source_len = source.len(), "decode finished");

	Ok(Document { root, layout: layout.clone() })
}

struct Decoder<'a> {
	cursor: Cursor<'a>,
	frames: Vec<Frame>,
}
impl<'a> Decoder<'a> {
	fn context(&self) -> Context<'_> {
		Context::new(&self.frames)
	}

	fn path_of(&self, name: &str) -> String {
		self.frames.iter()
			.map(|f| f.name.as_str())
			.chain(std::iter::once(name))
			.filter(|s| !s.is_empty())
			.collect::<Vec<&str>>()
			.join(".")
	}

	fn node(&mut self, name: &str, schema: &Schema) -> Result<DecodedNode, NError> {
		let start = self.cursor.position();

		let value = match &schema.kind {
			SchemaKind::Primitive { prim, endian } => {
				let scalar = self.scalar(*prim, *endian)?;
				trace!(offset = start, field = name, ?scalar, "primitive");
				Value::Primitive(scalar)
			}
			SchemaKind::Struct(fields) => {
				self.frames.push(Frame::new(name));
				self.fields(fields)?;
				Value::Struct(self.pop_frame())
			}
			SchemaKind::Array { element, length } => {
				let count = self.resolve_length(name, element, length)?;
				debug!(offset = start, path = %self.path_of(name), count, "array");

				self.frames.push(Frame::new(name));
				for i in 0..count {
					let key = i.to_string();
					let item = self.node(&key, element)?;
					self.attach(key, item);
				}
				let items = self.frames.pop()
					.map(|f| f.fields.into_iter().map(|(_, item)| item).collect())
					.unwrap_or_default();
				Value::Array(items)
			}
			SchemaKind::Bitfield { underlying, endian, flags, order } => {
				self.bitfield(*underlying, *endian, flags, *order)?
			}
			SchemaKind::Enum { name: enum_name, underlying, endian, symbols } => {
				let raw = self.cursor.read_unsigned(underlying.width(), *endian)?;
				let symbol = symbols.iter().find(|(_, v)| *v == raw).map(|(s, _)| *s);
				if symbol.is_none() {
					debug!(path = %self.path_of(name), raw, "unrecognized {} value", enum_name);
				}
				Value::Enum { name: *enum_name, raw, symbol }
			}
			SchemaKind::TaggedUnion { prefix, alternatives, fallback } => {
				self.frames.push(Frame::new(name));
				self.fields(prefix)?;

				let variant = match self.select(alternatives)? {
					Some(alt) => {
						debug!(path = %self.path_of(""), variant = %alt.name, "union variant selected");
						self.fields(&alt.fields)?;
						Some(alt.name.clone())
					}
					None => {
						debug!(path = %self.path_of(""), "no union variant matched, using fallback");
						self.fields(fallback)?;
						None
					}
				};
				Value::TaggedUnion { variant, fields: self.pop_frame() }
			}
		};

		let mut node = DecodedNode::new(start..self.cursor.position(), value, schema.label);
		if let Some(validator) = schema.validator {
			for finding in (validator.0)(&node, &self.context()) {
				debug!(path = %self.path_of(name), field = %finding.path, message = %finding.message, "validation finding");
				node = node.with_finding(&finding.path, finding.message)?;
			}
		}
		Ok(node)
	}

	fn fields(&mut self, fields: &[(String, Schema)]) -> Result<(), NError> {
		for (name, schema) in fields {
			let child = self.node(name, schema)?;
			self.attach(name.clone(), child);
		}
		Ok(())
	}

	fn attach(&mut self, name: String, node: DecodedNode) {
		if let Some(frame) = self.frames.last_mut() {
			frame.fields.push((name, node));
		}
	}

	fn pop_frame(&mut self) -> Fields {
		Fields::from(self.frames.pop().map(|f| f.fields).unwrap_or_default())
	}

	fn scalar(&mut self, prim: Primitive, endian: Endian) -> Result<Scalar, NError> {
		let width = prim.width();
		Ok(match prim {
			Primitive::Char => Scalar::Char(self.cursor.read_u8()?),
			p if p.is_signed() => Scalar::Signed(self.cursor.read_signed(width, endian)?),
			_ => Scalar::Unsigned(self.cursor.read_unsigned(width, endian)?),
		})
	}

	fn bitfield(&mut self, underlying: Primitive, endian: Endian, flags: &[Flag], order: BitOrder) -> Result<Value, NError> {
		let start = self.cursor.position();
		let total = underlying.width() * 8;
		let raw = self.cursor.read_unsigned(underlying.width(), endian)?;
		let range = start..self.cursor.position();

		let mut shift = 0usize;
		let mut out = Vec::with_capacity(flags.len());
		for flag in flags {
			let bits = flag.bits as usize;
			let at = match order {
				BitOrder::LsbFirst => shift,
				BitOrder::MsbFirst => total - shift - bits,
			};
			let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
			let v = (raw >> at) & mask;
			let scalar = if bits == 1 { Scalar::Bool(v == 1) } else { Scalar::Unsigned(v) };

			out.push((flag.name.to_string(), DecodedNode::new(range.clone(), Value::Primitive(scalar), flag.label)));
			shift += bits;
		}
		trace!(offset = start, raw, "bitfield");
		Ok(Value::Bitfield { raw, flags: Fields::from(out) })
	}

	fn resolve_length(&self, name: &str, element: &Schema, rule: &LengthRule) -> Result<usize, NError> {
		let count = match rule {
			LengthRule::Fixed(n) => *n,
			LengthRule::Computed { func, .. } => {
				let value = func(&self.context())?;
				usize::try_from(value).map_err(|_| NError::ErrInvalidLength {
					path: self.path_of(name),
					value,
				})?
			}
		};

		// Fail before decoding anything when the elements cannot possibly fit
		if let Some(width) = element.fixed_width().filter(|w| *w > 0) {
			if count > self.cursor.remaining() / width {
				return Err(NError::ErrOutOfBounds {
					offset: self.cursor.position(),
					width: count.saturating_mul(width),
					len: self.cursor.source_len(),
				});
			}
		}
		Ok(count)
	}

	fn select<'s>(&self, alternatives: &'s [Alternative]) -> Result<Option<&'s Alternative>, NError> {
		for alt in alternatives {
			if (alt.predicate)(&self.context())? {
				return Ok(Some(alt));
			}
		}
		Ok(None)
	}
}
