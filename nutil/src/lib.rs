use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NError {
	#[error("Read of {width} byte(s) at offset {offset:#x} overruns the {len} byte source")]
	ErrOutOfBounds { offset: usize, width: usize, len: usize },
	#[error("Invalid length {value} for {path}")]
	ErrInvalidLength { path: String, value: i128 },
	#[error("Invalid schema: {0}")]
	ErrSchema(String),
	#[error("Field not decoded: {0}")]
	ErrMissingField(String),
	#[error("{0}")]
	ErrIO(#[from] std::io::Error),
	#[error("{0}")]
	ErrOther(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
	#[default]
	Little,
	Big,
}

//Read cursor over an immutable byte source
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
	data: &'a [u8],
	pos: usize,
}
impl<'a> Cursor<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Self { data, pos: 0 }
	}

	pub fn position(&self) -> usize {
		self.pos
	}
	pub fn source_len(&self) -> usize {
		self.data.len()
	}
	pub fn remaining(&self) -> usize {
		self.data.len() - self.pos
	}

	/// Takes the next `width` bytes. The cursor does not move when the read fails.
	pub fn read_bytes(&mut self, width: usize) -> Result<&'a [u8], NError> {
		let end = self.pos
			.checked_add(width)
			.filter(|end| *end <= self.data.len())
			.ok_or(NError::ErrOutOfBounds {
				offset: self.pos,
				width,
				len: self.data.len(),
			})?;

		let bytes = &self.data[self.pos..end];
		self.pos = end;
		Ok(bytes)
	}

	pub fn read_u8(&mut self) -> Result<u8, NError> {
		Ok(self.read_bytes(1)?[0])
	}

	// width must be 1..=8
	pub fn read_unsigned(&mut self, width: usize, endian: Endian) -> Result<u64, NError> {
		check_width(width)?;
		let bytes = self.read_bytes(width)?;
		Ok(match endian {
			Endian::Little => LittleEndian::read_uint(bytes, width),
			Endian::Big => BigEndian::read_uint(bytes, width),
		})
	}
	pub fn read_signed(&mut self, width: usize, endian: Endian) -> Result<i64, NError> {
		check_width(width)?;
		let bytes = self.read_bytes(width)?;
		Ok(match endian {
			Endian::Little => LittleEndian::read_int(bytes, width),
			Endian::Big => BigEndian::read_int(bytes, width),
		})
	}
}

fn check_width(width: usize) -> Result<(), NError> {
	if width == 0 || width > 8 {
		return Err(NError::ErrSchema(format!("Integer width {} is not 1..=8 bytes", width)));
	}
	Ok(())
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
	bytes.iter()
		.map(|x| format!("{:02x}", x))
		.collect::<Vec<String>>()
		.join(" ")
}
