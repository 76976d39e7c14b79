#![allow(dead_code)]

use bytebuffer::{ByteBuffer, Endian};

pub const SIZEOF_OPTIONAL_PREFIX: usize = 24;
pub const SIZEOF_PE32_DATA: usize = 72;
pub const SIZEOF_PE32_PLUS_DATA: usize = 88;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Pe32,
	Pe32Plus,
	Other([u8; 2]),
}

pub struct Section {
	pub name: [u8; 8],
	pub virtual_size: u32,
	pub virtual_address: u32,
	pub raw_size: u32,
	pub raw_pointer: u32,
	pub characteristics: u32,
}

impl Section {
	pub fn new(name: &str, virtual_address: u32) -> Self {
		let mut buf = [0u8; 8];
		buf[..name.len()].copy_from_slice(name.as_bytes());
		Self {
			name: buf,
			virtual_size: 0x1000,
			virtual_address,
			raw_size: 0x200,
			raw_pointer: virtual_address / 8,
			characteristics: 0x6000_0020,
		}
	}
}

// Header-only PE image; defaults describe a valid i386 PE32 file
pub struct PeBuilder {
	pub dos_magic: [u8; 2],
	pub lfanew: u32,
	pub pe_magic: [u8; 4],
	pub machine: u16,
	pub characteristics: u16,
	pub format: Format,
	pub directories: u32,
	pub sections: Vec<Section>,
	pub num_sections: Option<u16>,
	pub optional_header_size: Option<u16>,
}

impl PeBuilder {
	pub fn new() -> Self {
		Self {
			dos_magic: *b"MZ",
			lfanew: 0x80,
			pe_magic: *b"PE\0\0",
			machine: 0x14c,
			characteristics: 0x0102,
			format: Format::Pe32,
			directories: 16,
			sections: vec![Section::new(".text", 0x1000), Section::new(".data", 0x2000)],
			num_sections: None,
			optional_header_size: None,
		}
	}

	pub fn stub_len(&self) -> usize {
		(self.lfanew as usize).saturating_sub(0x40)
	}
	pub fn pe_offset(&self) -> usize {
		0x40 + self.stub_len()
	}
	pub fn optional_offset(&self) -> usize {
		self.pe_offset() + 24
	}
	pub fn optional_len(&self) -> usize {
		let dirs = self.directories as usize * 8;
		match self.format {
			Format::Pe32 => SIZEOF_OPTIONAL_PREFIX + SIZEOF_PE32_DATA + dirs,
			Format::Pe32Plus => SIZEOF_OPTIONAL_PREFIX + SIZEOF_PE32_PLUS_DATA + dirs,
			Format::Other(_) => SIZEOF_OPTIONAL_PREFIX,
		}
	}
	pub fn section_table_offset(&self) -> usize {
		self.optional_offset() + self.optional_len()
	}
	pub fn total_len(&self) -> usize {
		self.section_table_offset() + self.sections.len() * 40
	}

	pub fn build(&self) -> Vec<u8> {
		let mut buf = ByteBuffer::new();
		buf.set_endian(Endian::LittleEndian);

		//DOS header
		buf.write_bytes(&self.dos_magic);
		buf.write_u16(0x90); //CBLP
		buf.write_u16(3); //CP
		for _ in 0..11 {
			buf.write_u16(0);
		}
		for _ in 0..4 {
			buf.write_u16(0); //res_1
		}
		buf.write_u16(0); //oemid
		buf.write_u16(0); //oeminfo
		for _ in 0..10 {
			buf.write_u16(0); //res_2
		}
		buf.write_u32(self.lfanew);

		//DOS stub
		for i in 0..self.stub_len() {
			buf.write_u8(i as u8);
		}

		//COFF header
		buf.write_bytes(&self.pe_magic);
		buf.write_u16(self.machine);
		buf.write_u16(self.num_sections.unwrap_or(self.sections.len() as u16));
		buf.write_u32(0x5f00_0000); //TimeDate
		buf.write_u32(0);
		buf.write_u32(0);
		buf.write_u16(self.optional_header_size.unwrap_or(self.optional_len() as u16));
		buf.write_u16(self.characteristics);

		//Optional header
		let magic = match self.format {
			Format::Pe32 => [0x0b, 0x01],
			Format::Pe32Plus => [0x0b, 0x02],
			Format::Other(m) => m,
		};
		buf.write_bytes(&magic);
		buf.write_u8(14); //MajorLinkerVersion
		buf.write_u8(0);
		buf.write_u32(0x1000); //SizeOfCode
		buf.write_u32(0x800);
		buf.write_u32(0);
		buf.write_u32(0x1010); //AddressOfEntryPointRVA
		buf.write_u32(0x1000); //BaseOfCodeRVA

		let wide = match self.format {
			Format::Pe32 => Some(false),
			Format::Pe32Plus => Some(true),
			Format::Other(_) => None,
		};
		if let Some(wide) = wide {
			let word = |buf: &mut ByteBuffer, v: u64| {
				if wide { buf.write_u64(v) } else { buf.write_u32(v as u32) }
			};
			if !wide {
				buf.write_u32(0x2000); //BaseOfDataRVA
			}
			word(&mut buf, 0x40_0000); //ImageBase
			buf.write_u32(0x1000); //SectionAlignment
			buf.write_u32(0x200); //FileAlignment
			for v in [6u16, 0, 0, 0, 6, 0] {
				buf.write_u16(v);
			}
			buf.write_u32(0); //Win32VersionValue
			buf.write_u32(0x3000); //SizeOfImage
			buf.write_u32(0x400); //SizeOfHeaders
			buf.write_u32(0); //Checksum
			buf.write_u16(3); //Subsystem
			buf.write_u16(0x8140); //DLLCharacteristics
			word(&mut buf, 0x10_0000);
			word(&mut buf, 0x1000);
			word(&mut buf, 0x10_0000);
			word(&mut buf, 0x1000);
			buf.write_u32(0); //LoaderFlags
			buf.write_u32(self.directories);

			for i in 0..self.directories {
				buf.write_u32(i * 0x100); //RVA
				buf.write_u32(i); //Size
			}
		}

		//Section headers
		for s in &self.sections {
			buf.write_bytes(&s.name);
			buf.write_u32(s.virtual_size);
			buf.write_u32(s.virtual_address);
			buf.write_u32(s.raw_size);
			buf.write_u32(s.raw_pointer);
			buf.write_u32(0);
			buf.write_u32(0);
			buf.write_u16(0);
			buf.write_u16(0);
			buf.write_u32(s.characteristics);
		}

		buf.as_bytes().to_vec()
	}
}
