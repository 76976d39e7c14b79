use nutil::NError;

use crate::context::Context;
use crate::node::{DecodedNode, Value};
use crate::schema::{Alternative, Finding, Flag, Layout, Primitive, Schema};

pub const SIZEOF_DOS_HEADER: u64 = 0x40;
pub const SIZEOF_PE_HEADER: usize = 24;
pub const SIZEOF_DIRECTORY_ENTRY: usize = 8;
pub const SIZEOF_SECTION_ENTRY: usize = 40;

pub const DOS_MAGIC: [u8; 2] = [0x4d, 0x5a];
pub const PE_MAGIC: [u8; 4] = [0x50, 0x45, 0x00, 0x00];
pub const OPTIONAL_MAGIC_PE32: [u8; 2] = [0x0b, 0x01];
pub const OPTIONAL_MAGIC_PE32_PLUS: [u8; 2] = [0x0b, 0x02];

pub static MACHINE_TYPES: &[(&str, u64)] = &[
	("UNKNOWN", 0),
	("AM33", 0x1d3),
	("AMD64", 0x8664),
	("ARM", 0x1c0),
	("ARM64", 0xaa64),
	("ARMV7", 0x1c4),
	("EBC", 0xebc),
	("I386", 0x14c),
	("IA64", 0x200),
	("M32R", 0x9041),
	("MIPS16", 0x266),
	("MIPSFPU", 0x366),
	("MIPSFPU16", 0x466),
	("POWERPC", 0x1f0),
	("POWERPCFP", 0x1f1),
	("R4000", 0x166),
	("SH3", 0x1a2),
	("SH3DSP", 0x1a3),
	("SH4", 0x1a6),
	("SH5", 0x1a8),
	("THUMB", 0x1c2),
	("WCEMIPSV2", 0x169),
];

//IMAGE_FILE_* flags, bit 0 first
pub static CHARACTERISTICS: &[Flag] = &[
	Flag::bit("BaseRelocationsStripped", "Base relocations stripped"),
	Flag::bit("ExecutableImage", "Executable image"),
	Flag::bit("LineNumbersStripped", "Line numbers stripped"),
	Flag::bit("SymbolsStripped", "Symbols stripped"),
	Flag::bit("AggressivelyTrim", "Aggressively trim"),
	Flag::bit("LargeAddressSpace", ">2GB address space"),
	Flag::bit("Reserved", "Reserved"),
	Flag::bit("LittleEndian", "Little endian"),
	Flag::bit("ThirtyTwoBit", "32-bit"),
	Flag::bit("DebuggingInfoStripped", "Debugging information stripped"),
	Flag::bit("SwapRemovableMedia", "Copy to swap from removable media"),
	Flag::bit("SwapNetworkMedia", "Copy to swap from network media"),
	Flag::bit("SystemFile", "System file"),
	Flag::bit("DLLImage", "DLL image"),
	Flag::bit("UniprocessorMachine", "Uniprocessor machine"),
	Flag::bit("BigEndian", "Big endian"),
];

static STUB_READS: &[&str] = &["DOSHeader.lfanew"];
static OPTIONAL_MAGIC_READS: &[&str] = &["OptionalHeaders.Header.Magic.Byte0", "OptionalHeaders.Header.Magic.Byte1"];
static DIRECTORY_READS: &[&str] = &["OptionalHeaders.Data.NumberOfDataDirectories"];
static SECTION_READS: &[&str] = &["PEHeader.NumSections"];

//Magic{Byte0..ByteN} made of single characters
fn magic(n: usize) -> Schema {
	Schema::structure((0..n).map(|i| (format!("Byte{}", i), Schema::char())).collect::<Vec<_>>())
}

fn magic_findings(node: &DecodedNode, expected: &[u8]) -> Vec<Finding> {
	let mut out = Vec::new();
	for (i, want) in expected.iter().enumerate() {
		let path = format!("Magic.Byte{}", i);
		if node.lookup(&path).and_then(|n| n.as_u64()) != Some(*want as u64) {
			out.push(Finding::new(path, format!("Must == 0x{:02X}", want)));
		}
	}
	out
}

fn validate_dos_header(node: &DecodedNode, _: &Context<'_>) -> Vec<Finding> {
	magic_findings(node, &DOS_MAGIC)
}

fn validate_pe_header(node: &DecodedNode, _: &Context<'_>) -> Vec<Finding> {
	magic_findings(node, &PE_MAGIC)
}

fn validate_optional_header(node: &DecodedNode, _: &Context<'_>) -> Vec<Finding> {
	let byte = |i: usize| node.lookup(&format!("Magic.Byte{}", i)).and_then(|n| n.as_u64());

	let mut out = Vec::new();
	if byte(0) != Some(OPTIONAL_MAGIC_PE32[0] as u64) {
		out.push(Finding::new("Magic.Byte0", format!("Must == 0x{:02X}", OPTIONAL_MAGIC_PE32[0])));
	}
	let known = [OPTIONAL_MAGIC_PE32[1], OPTIONAL_MAGIC_PE32_PLUS[1]];
	if !known.iter().any(|b| byte(1) == Some(*b as u64)) {
		out.push(Finding::new("Magic.Byte1", format!("Must == 0x{:02X} or 0x{:02X}", known[0], known[1])));
	}
	out
}

// The section table is read right after the optional header, so the size the
// COFF header declares has to agree with what was decoded
fn validate_optional_header_size(root: &DecodedNode, _: &Context<'_>) -> Vec<Finding> {
	let optional = match root.lookup("OptionalHeaders") {
		Some(n) if matches!(n.value(), Value::TaggedUnion { variant: Some(_), .. }) => n,
		_ => return Vec::new(),
	};
	match root.lookup("PEHeader.OptionalHeaderSize").and_then(|n| n.as_u64()) {
		Some(declared) if declared != optional.len() as u64 => {
			vec![Finding::new("PEHeader.OptionalHeaderSize", format!("Must == 0x{:X}", optional.len()))]
		}
		_ => Vec::new(),
	}
}

fn dos_stub_length(ctx: &Context<'_>) -> Result<i128, NError> {
	let lfanew = ctx.uint("DOSHeader.lfanew")? as i128;
	Ok((lfanew - SIZEOF_DOS_HEADER as i128).max(0))
}

fn optional_magic(ctx: &Context<'_>) -> Result<[u8; 2], NError> {
	Ok([ctx.byte(OPTIONAL_MAGIC_READS[0])?, ctx.byte(OPTIONAL_MAGIC_READS[1])?])
}
fn is_optional_pe32(ctx: &Context<'_>) -> Result<bool, NError> {
	Ok(optional_magic(ctx)? == OPTIONAL_MAGIC_PE32)
}
fn is_optional_pe32_plus(ctx: &Context<'_>) -> Result<bool, NError> {
	Ok(optional_magic(ctx)? == OPTIONAL_MAGIC_PE32_PLUS)
}

fn number_of_data_directories(ctx: &Context<'_>) -> Result<i128, NError> {
	Ok(ctx.uint(DIRECTORY_READS[0])? as i128)
}
fn number_of_sections(ctx: &Context<'_>) -> Result<i128, NError> {
	Ok(ctx.uint(SECTION_READS[0])? as i128)
}

//DOS Header
pub fn dos_header() -> Schema {
	Schema::structure(vec![
		("Magic", magic(2)),
		("CBLP", Schema::u16()),
		("CP", Schema::u16()),
		("crlc", Schema::u16()),
		("cparhdr", Schema::u16()),
		("minalloc", Schema::u16()),
		("maxalloc", Schema::u16()),
		("ss", Schema::u16()),
		("sp", Schema::u16()),
		("csum", Schema::u16()),
		("ip", Schema::u16()),
		("cs", Schema::u16()),
		("lfarlc", Schema::u16()),
		("ovno", Schema::u16()),
		("res_1", Schema::array(Schema::u16(), 4)),
		("oemid", Schema::u16()),
		("oeminfo", Schema::u16()),
		("res_2", Schema::array(Schema::u16(), 10)),
		("lfanew", Schema::u32().labelled("PE header offset")),
	])
	.validated(validate_dos_header)
}

//COFF File Header
pub fn pe_header() -> Schema {
	Schema::structure(vec![
		("Magic", magic(4)),
		("Machine", Schema::enumeration("MachineType", Primitive::U16, MACHINE_TYPES)),
		("NumSections", Schema::u16()),
		("TimeDate", Schema::u32()),
		("SymbolTableAddress", Schema::u32()),
		("NumSymbols", Schema::u32()),
		("OptionalHeaderSize", Schema::u16()),
		("Characteristics", Schema::bitfield(Primitive::U16, CHARACTERISTICS)),
	])
	.validated(validate_pe_header)
}

//Optional Header, fields shared by PE32 and PE32+
pub fn optional_header() -> Schema {
	Schema::structure(vec![
		("Magic", magic(2)),
		("MajorLinkerVersion", Schema::u8()),
		("MinorLinkerVersion", Schema::u8()),
		("SizeOfCode", Schema::u32().labelled("Size of all sections")),
		("SizeOfInitializedData", Schema::u32()),
		("SizeOfUninitializedData", Schema::u32()),
		("AddressOfEntryPointRVA", Schema::u32()),
		("BaseOfCodeRVA", Schema::u32()),
	])
	.validated(validate_optional_header)
}

//Optional Header Windows-Specific; `wide` picks the PE32+ field widths
fn optional_header_windows(wide: bool) -> Schema {
	let word = || if wide { Schema::u64() } else { Schema::u32() };

	let mut fields = Vec::new();
	if !wide {
		fields.push(("BaseOfDataRVA", Schema::u32()));
	}
	fields.extend([
		("ImageBase", word()),
		("SectionAlignment", Schema::u32()),
		("FileAlignment", Schema::u32()),
		("MajorOSVersion", Schema::u16()),
		("MinorOSVersion", Schema::u16()),
		("MajorImageVersion", Schema::u16()),
		("MinorImageVersion", Schema::u16()),
		("MajorSubsystemVersion", Schema::u16()),
		("MinorSubsystemVersion", Schema::u16()),
		("Win32VersionValue", Schema::u32()),
		("SizeOfImage", Schema::u32()),
		("SizeOfHeaders", Schema::u32()),
		("Checksum", Schema::u32()),
		("Subsystem", Schema::u16()),
		("DLLCharacteristics", Schema::u16()),
		("SizeOfStackReserve", word()),
		("SizeOfStackCommit", word()),
		("SizeOfHeapReserve", word()),
		("SizeOfHeapCommit", word()),
		("LoaderFlags", Schema::u32()),
		("NumberOfDataDirectories", Schema::u32()),
	]);
	Schema::structure(fields)
}

pub fn directory_entry() -> Schema {
	Schema::structure(vec![
		("RVA", Schema::u32()),
		("Size", Schema::u32()),
	])
}

//Section Headers
pub fn section_entry() -> Schema {
	Schema::structure(vec![
		("Name", Schema::array(Schema::char(), 8)),
		("VirtualSize", Schema::u32()),
		("VirtualAddressRVA", Schema::u32()),
		("SizeOfRawData", Schema::u32()),
		("PointerToRawData", Schema::u32()),
		("PointerToRelocations", Schema::u32()),
		("PointerToLineNumbers", Schema::u32()),
		("NumberOfRelocations", Schema::u16()),
		("NumberOfLineNumbers", Schema::u16()),
		("Characteristics", Schema::u32()),
	])
}

fn optional_variant(wide: bool) -> Vec<(&'static str, Schema)> {
	vec![
		("Data", optional_header_windows(wide)),
		("Directories", Schema::array_dependent(directory_entry(), DIRECTORY_READS, number_of_data_directories)),
	]
}

pub fn pe_schema() -> Schema {
	Schema::structure(vec![
		("DOSHeader", dos_header()),
		("DOSStub", Schema::array_dependent(Schema::char(), STUB_READS, dos_stub_length)),
		("PEHeader", pe_header()),
		(
			"OptionalHeaders",
			Schema::tagged_union(
				vec![("Header", optional_header())],
				vec![
					Alternative::new("PE32", OPTIONAL_MAGIC_READS, is_optional_pe32, optional_variant(false)),
					Alternative::new("PE32+", OPTIONAL_MAGIC_READS, is_optional_pe32_plus, optional_variant(true)),
				],
				vec![("invalid", Schema::array(Schema::char(), 0))],
			),
		),
		("SectionHeaders", Schema::array_dependent(section_entry(), SECTION_READS, number_of_sections)),
	])
	.validated(validate_optional_header_size)
}

pub fn pe_layout() -> Result<Layout, NError> {
	Layout::new(pe_schema())
}
