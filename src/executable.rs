use nutil::NError;

use crate::decoder::{decode, Document};
use crate::headers::{self, CHARACTERISTICS};
use crate::node::{DecodedNode, Value};
use crate::report::decode_text;
use crate::schema::Layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalFormat {
	Pe32,
	Pe32Plus,
	Unrecognized,
}

//Executable class
#[derive(Debug, Clone)]
pub struct Executable {
	document: Document,
}
impl Executable {
	pub fn parse(data: &[u8]) -> Result<Self, NError> {
		Self::parse_with(&headers::pe_layout()?, data)
	}

	// Reuses an already checked layout, e.g. when inspecting many files
	pub fn parse_with(layout: &Layout, data: &[u8]) -> Result<Self, NError> {
		Ok(Self { document: decode(layout, data)? })
	}

	pub fn document(&self) -> &Document {
		&self.document
	}

	fn uint(&self, path: &str) -> Option<u64> {
		self.document.lookup(path).and_then(|n| n.as_u64())
	}

	pub fn offset_pe_header(&self) -> Option<u64> {
		self.uint("DOSHeader.lfanew")
	}
	pub fn offset_section_table(&self) -> Option<usize> {
		self.document.lookup("SectionHeaders").map(|n| n.start())
	}

	pub fn machine(&self) -> Option<u16> {
		self.uint("PEHeader.Machine").map(|v| v as u16)
	}
	pub fn machine_name(&self) -> Option<&'static str> {
		self.document.lookup("PEHeader.Machine").and_then(|n| n.symbol())
	}

	// Names of the characteristics flags that are set
	pub fn characteristics(&self) -> Vec<&'static str> {
		let node = match self.document.lookup("PEHeader.Characteristics") {
			Some(n) => n,
			None => return Vec::new(),
		};
		CHARACTERISTICS.iter()
			.filter(|f| node.child(f.name).and_then(|c| c.as_bool()) == Some(true))
			.map(|f| f.name)
			.collect()
	}

	pub fn optional_format(&self) -> OptionalFormat {
		match self.document.lookup("OptionalHeaders").map(|n| n.value()) {
			Some(Value::TaggedUnion { variant: Some(v), .. }) if v == "PE32" => OptionalFormat::Pe32,
			Some(Value::TaggedUnion { variant: Some(v), .. }) if v == "PE32+" => OptionalFormat::Pe32Plus,
			_ => OptionalFormat::Unrecognized,
		}
	}

	pub fn image_base(&self) -> Option<u64> {
		self.uint("OptionalHeaders.Data.ImageBase")
	}

	pub fn data_directories(&self) -> &[DecodedNode] {
		self.document.lookup("OptionalHeaders.Directories")
			.and_then(|n| n.elements())
			.unwrap_or(&[])
	}

	pub fn sections(&self) -> &[DecodedNode] {
		self.document.lookup("SectionHeaders")
			.and_then(|n| n.elements())
			.unwrap_or(&[])
	}

	pub fn section_name(&self, index: usize) -> Option<String> {
		let raw = self.sections().get(index)?.child("Name")?.char_bytes()?;
		Some(decode_text(&raw))
	}

	pub fn get_section(&self, name: &str) -> Option<&DecodedNode> {
		if name.len() > 8 {
			return None;
		}
		let mut buf = [0u8; 8];
		buf[..name.len()].clone_from_slice(name.as_bytes());

		self.sections().iter().find(|s| {
			s.child("Name").and_then(|n| n.char_bytes()).as_deref() == Some(&buf[..])
		})
	}

	pub fn validation_errors(&self) -> Vec<(String, String)> {
		self.document.validation_errors()
	}
	pub fn is_valid(&self) -> bool {
		self.document.is_valid()
	}
}
