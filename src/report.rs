use std::io::{self, Write};

use encoding_rs::WINDOWS_1252;
use nutil::bytes_to_hex;
use regex::Regex;

use crate::decoder::Document;
use crate::executable::Executable;
use crate::node::{DecodedNode, Scalar, Value};

// Text up to the first NUL
pub fn decode_text(bytes: &[u8]) -> String {
	let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
	WINDOWS_1252.decode_without_bom_handling(&bytes[..end]).0.into_owned()
}

pub fn describe(node: &DecodedNode) -> String {
	match node.value() {
		Value::Primitive(Scalar::Unsigned(v)) => format!("0x{:X} ({})", v, v),
		Value::Primitive(Scalar::Signed(v)) => format!("{}", v),
		Value::Primitive(Scalar::Char(c)) => format!("0x{:02X}", c),
		Value::Primitive(Scalar::Bool(b)) => format!("{}", b),
		Value::Enum { name, raw, symbol } => match symbol {
			Some(s) => format!("{}::{} (0x{:X})", name, s, raw),
			None => format!("{} unrecognized (0x{:X})", name, raw),
		},
		Value::Bitfield { raw, .. } => format!("0x{:X}", raw),
		Value::TaggedUnion { variant, .. } => match variant {
			Some(v) => format!("<{}>", v),
			None => "<unrecognized>".to_string(),
		},
		Value::Array(items) => match node.char_bytes() {
			Some(raw) if !raw.is_empty() => format!("{:?} [{}]", decode_text(&raw), bytes_to_hex(&raw)),
			_ => format!("[{} item(s)]", items.len()),
		},
		Value::Struct(_) => String::new(),
	}
}

fn write_line<W: Write>(out: &mut W, path: &str, node: &DecodedNode) -> io::Result<()> {
	let name = if path.is_empty() { "<root>" } else { path };
	write!(out, "[{:08x},{:08x}] {}", node.start(), node.end(), name)?;

	let value = describe(node);
	if !value.is_empty() {
		write!(out, " = {}", value)?;
	}
	if let Some(label) = node.label() {
		write!(out, "    // {}", label)?;
	}
	if let Some(e) = node.error() {
		write!(out, "    !! {}", e)?;
	}
	writeln!(out)
}

/// One line per node in document order. Arrays of characters are printed as
/// text on a single line; `filter` keeps only nodes whose path matches.
pub fn write_tree<W: Write>(out: &mut W, document: &Document, filter: Option<&Regex>) -> io::Result<usize> {
	fn _write<W: Write>(out: &mut W, path: &str, node: &DecodedNode, filter: Option<&Regex>) -> io::Result<usize> {
		let mut wrote = 0;
		if filter.map_or(true, |re| re.is_match(path)) {
			write_line(out, path, node)?;
			wrote += 1;
		}
		if node.char_bytes().is_some() {
			return Ok(wrote);
		}

		let join = |name: &str| if path.is_empty() { name.to_string() } else { format!("{}.{}", path, name) };
		if let Some(items) = node.elements() {
			for (i, item) in items.iter().enumerate() {
				wrote += _write(out, &join(&i.to_string()), item, filter)?;
			}
		}
		else if let Some(fields) = node.fields() {
			for (name, child) in fields.iter() {
				wrote += _write(out, &join(name), child, filter)?;
			}
		}
		Ok(wrote)
	}

	_write(out, "", document.root(), filter)
}

pub fn write_errors<W: Write>(out: &mut W, document: &Document) -> io::Result<usize> {
	let errors = document.validation_errors();
	for (path, message) in &errors {
		let node = document.lookup(path);
		match node {
			Some(n) => writeln!(out, "[{:08x},{:08x}] {}: {}", n.start(), n.end(), path, message)?,
			None => writeln!(out, "{}: {}", path, message)?,
		}
	}
	Ok(errors.len())
}

pub fn write_sections<W: Write>(out: &mut W, exe: &Executable) -> io::Result<()> {
	let field = |s: &DecodedNode, name: &str| s.child(name).and_then(|n| n.as_u64()).unwrap_or_default();

	writeln!(out, "// {:<8} {:>8} {:>8} {:>8} {:>8}", "Name", "VirtAddr", "VirtSize", "RawAddr", "RawSize")?;
	for (i, section) in exe.sections().iter().enumerate() {
		writeln!(out, "   {:<8} {:08x} {:08x} {:08x} {:08x}",
			exe.section_name(i).unwrap_or_default(),
			field(section, "VirtualAddressRVA"),
			field(section, "VirtualSize"),
			field(section, "PointerToRawData"),
			field(section, "SizeOfRawData"))?;
	}
	Ok(())
}
