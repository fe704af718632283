use smol_str::SmolStr;
use std::fmt;

// ─── Field Types ────────────────────────────────────────────────────────────

/// Declared type of a field. The discriminant is the type code carried in
/// the high bits of every [`FieldId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Short = 0,
    Long = 1,
    Char = 2,
    Float = 3,
    Double = 4,
    String = 5,
    Carray = 6,
    Ptr = 9,
    Ubf = 10,
    View = 11,
}

impl FieldType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => FieldType::Short,
            1 => FieldType::Long,
            2 => FieldType::Char,
            3 => FieldType::Float,
            4 => FieldType::Double,
            5 => FieldType::String,
            6 => FieldType::Carray,
            9 => FieldType::Ptr,
            10 => FieldType::Ubf,
            11 => FieldType::View,
            _ => return None,
        })
    }

    /// Parse the type keyword used in field and view definition files.
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "short" => FieldType::Short,
            "long" => FieldType::Long,
            "char" => FieldType::Char,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "string" => FieldType::String,
            "carray" => FieldType::Carray,
            "ptr" => FieldType::Ptr,
            "ubf" => FieldType::Ubf,
            "view" => FieldType::View,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            FieldType::Short => "short",
            FieldType::Long => "long",
            FieldType::Char => "char",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Carray => "carray",
            FieldType::Ptr => "ptr",
            FieldType::Ubf => "ubf",
            FieldType::View => "view",
        }
    }

    /// Types whose occurrences hold another record buffer.
    #[inline]
    pub fn is_nested(self) -> bool {
        matches!(self, FieldType::Ptr | FieldType::Ubf)
    }
}

// ─── Field Id ───────────────────────────────────────────────────────────────

pub const FIELD_NUMBER_BITS: u32 = 25;
pub const MAX_FIELD_NUMBER: u32 = (1 << FIELD_NUMBER_BITS) - 1;

/// Compiled field identifier: type code in the top bits, field number below.
/// Ordering of ids is the ordering of fields inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(u32);

impl FieldId {
    /// Build an id from a type and a number in `1..=MAX_FIELD_NUMBER`.
    pub fn new(ftype: FieldType, number: u32) -> Option<Self> {
        if number == 0 || number > MAX_FIELD_NUMBER {
            return None;
        }
        Some(FieldId(((ftype as u32) << FIELD_NUMBER_BITS) | number))
    }

    /// Wrap a raw id read from a buffer. Fails if the type code is unknown
    /// or the number is zero.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let code = (raw >> FIELD_NUMBER_BITS) as u8;
        FieldType::from_code(code)?;
        if raw & MAX_FIELD_NUMBER == 0 {
            return None;
        }
        Some(FieldId(raw))
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn number(self) -> u32 {
        self.0 & MAX_FIELD_NUMBER
    }

    #[inline]
    pub fn field_type(self) -> FieldType {
        // from_raw/new only admit known codes
        FieldType::from_code((self.0 >> FIELD_NUMBER_BITS) as u8).unwrap_or(FieldType::Carray)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "((BFLDID32){})", self.0)
    }
}

// ─── Field Key ──────────────────────────────────────────────────────────────

/// A field addressed either by name or by compiled id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Name(SmolStr),
    Id(FieldId),
}

impl FieldKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            FieldKey::Name(n) => Some(n.as_str()),
            FieldKey::Id(_) => None,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(n) => f.write_str(n),
            FieldKey::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        FieldKey::Name(SmolStr::from(s))
    }
}

impl From<&String> for FieldKey {
    fn from(s: &String) -> Self {
        FieldKey::Name(SmolStr::from(s.as_str()))
    }
}

impl From<String> for FieldKey {
    fn from(s: String) -> Self {
        FieldKey::Name(SmolStr::from(s))
    }
}

impl From<SmolStr> for FieldKey {
    fn from(s: SmolStr) -> Self {
        FieldKey::Name(s)
    }
}

impl From<&SmolStr> for FieldKey {
    fn from(s: &SmolStr) -> Self {
        FieldKey::Name(s.clone())
    }
}

impl From<FieldId> for FieldKey {
    fn from(id: FieldId) -> Self {
        FieldKey::Id(id)
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(k: &FieldKey) -> Self {
        k.clone()
    }
}

// ─── Buffer Handles ─────────────────────────────────────────────────────────

/// Generation-checked address of a buffer in a [`crate::pool::BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl BufferHandle {
    /// Packed form stored inside pointer field occurrences.
    #[inline]
    pub fn to_bits(self) -> u64 {
        (self.index as u64) | ((self.generation as u64) << 32)
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        BufferHandle {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Byte range of an embedded buffer inside its root buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

/// Where a map's bytes live: a whole pool buffer, or a span inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufLoc {
    pub handle: BufferHandle,
    pub span: Option<Span>,
}

impl BufLoc {
    #[inline]
    pub fn root(handle: BufferHandle) -> Self {
        BufLoc { handle, span: None }
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.span.map_or(0, |s| s.start)
    }
}

// ─── Binary Layout ──────────────────────────────────────────────────────────
//
//  ┌──────────────────────────────────────────────┐
//  │ Header (16 bytes)                            │
//  │   magic:       u32 (LE)                      │
//  │   total_len:   u32 (LE)                      │
//  │   field_count: u32 (LE)                      │
//  │   occ_count:   u32 (LE)                      │
//  ├──────────────────────────────────────────────┤
//  │ Entries (variable)  ← SORTED by field_id     │
//  │   field_id:  u32 (LE)                        │
//  │   data_len:  u32 (LE)                        │
//  │   data:      [u8; data_len]                  │
//  └──────────────────────────────────────────────┘

pub const BUFFER_MAGIC: u32 = 0x4655_4246; // "FBUF"
pub const HEADER_SIZE: usize = 16;
pub const ENTRY_HEADER_SIZE: usize = 8;
pub const PTR_DATA_SIZE: usize = 8;

/// A raw, zero-copy reference to one occurrence. No decoding.
#[derive(Debug, Clone, Copy)]
pub struct RawOccurrence<'a> {
    pub field_id: FieldId,
    pub occ: usize,
    /// Offset of the entry header within the record bytes.
    pub offset: usize,
    /// Offset of `data` within the record bytes.
    pub data_offset: usize,
    pub data: &'a [u8],
}

/// Position of the next field during iteration (byte offset of its first
/// entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCursor(pub(crate) usize);

impl FieldCursor {
    pub const START: FieldCursor = FieldCursor(HEADER_SIZE);
}
