//! Field and enumerated type dictionaries served to consumers.
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::io;

pub mod loader;
pub mod parts;

pub use self::parts::{enum_entry, enum_summary, field_entry, field_summary, DictionaryKind, DictionaryParts};

/// Dictionary verbosity filters, carried in the request key filter.
pub const VERBOSITY_INFO: u32 = 0x0;
pub const VERBOSITY_MINIMAL: u32 = 0x3;
pub const VERBOSITY_NORMAL: u32 = 0x7;
pub const VERBOSITY_VERBOSE: u32 = 0xF;

/// Download names of the two dictionaries.
pub const FIELD_DICTIONARY_NAME: &str = "RWFFld";
pub const ENUM_TYPE_DICTIONARY_NAME: &str = "RWFEnum";

/// Dictionary type identifiers carried in the summary.
pub const TYPE_FIELD_DEFINITIONS: u64 = 1;
pub const TYPE_ENUM_TABLES: u64 = 2;

/// Field types of the legacy feed format.
pub const FIELD_TYPES: &[(&str, i8)] = &[
    ("NONE", -1),
    ("TIME_SECONDS", 0),
    ("INTEGER", 1),
    ("NUMERIC", 2),
    ("DATE", 3),
    ("PRICE", 4),
    ("ALPHANUMERIC", 5),
    ("ENUMERATED", 6),
    ("TIME", 7),
    ("BINARY", 8),
    ("LONG_ALPHANUMERIC", 9),
    ("OPAQUE", 10),
];

/// Wire data types.
pub const RWF_TYPES: &[(&str, u8)] = &[
    ("INT32", 3),
    ("INT64", 3),
    ("UINT32", 4),
    ("UINT64", 4),
    ("FLOAT", 5),
    ("DOUBLE", 6),
    ("REAL32", 8),
    ("REAL64", 8),
    ("DATE", 9),
    ("TIME", 10),
    ("DATETIME", 11),
    ("QOS", 12),
    ("STATE", 13),
    ("ENUM", 14),
    ("ARRAY", 15),
    ("BUFFER", 16),
    ("ASCII_STRING", 17),
    ("UTF8_STRING", 18),
    ("RMTES_STRING", 19),
];

#[derive(Debug)]
pub enum DictionaryError {
    Io(io::Error),
    Parse { line: usize, reason: String },
    Duplicate(i16),
    Malformed(String),
}

impl fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DictionaryError::Io(err) => write!(f, "{}", err),
            DictionaryError::Parse { line, reason } => write!(f, "line {}: {}", line, reason),
            DictionaryError::Duplicate(fid) => write!(f, "duplicate definition for fid {}", fid),
            DictionaryError::Malformed(reason) => write!(f, "malformed dictionary payload: {}", reason),
        }
    }
}

impl std::error::Error for DictionaryError {}

impl From<io::Error> for DictionaryError {
    #[inline]
    fn from(err: io::Error) -> Self {
        DictionaryError::Io(err)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldDefinition {
    pub acronym: String,
    pub dde_acronym: String,
    pub fid: i16,
    pub ripples_to: i16,
    pub field_type: i8,
    pub length: u16,
    pub enum_length: u8,
    pub rwf_type: u8,
    pub rwf_length: u16,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EnumEntry {
    pub value: u16,
    pub display: String,
    pub meaning: String,
}

/// Enumerated values shared by one or more fields.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct EnumTable {
    pub fids: Vec<i16>,
    pub entries: Vec<EnumEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataDictionary {
    fields: BTreeMap<i16, FieldDefinition>,
    acronyms: HashMap<String, i16>,
    enum_tables: Vec<EnumTable>,
    enum_index: HashMap<i16, usize>,
    field_tags: BTreeMap<String, String>,
    enum_tags: BTreeMap<String, String>,
}

impl DataDictionary {
    #[inline]
    pub fn new() -> DataDictionary {
        DataDictionary::default()
    }

    /// Number of field definitions.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn field(&self, fid: i16) -> Option<&FieldDefinition> {
        self.fields.get(&fid)
    }

    #[inline]
    pub fn field_by_acronym(&self, acronym: &str) -> Option<&FieldDefinition> {
        self.acronyms.get(acronym).and_then(|fid| self.fields.get(fid))
    }

    /// Lowest defined fid, zero for an empty dictionary.
    #[inline]
    pub fn min_fid(&self) -> i16 {
        self.fields.keys().next().cloned().unwrap_or(0)
    }

    /// Highest defined fid, zero for an empty dictionary.
    #[inline]
    pub fn max_fid(&self) -> i16 {
        self.fields.keys().next_back().cloned().unwrap_or(0)
    }

    /// Field definitions in fid order, starting at `cursor`.
    pub fn fields_from(&self, cursor: i32) -> impl Iterator<Item = &FieldDefinition> + '_ {
        let start = cursor.max(i32::from(i16::MIN)).min(i32::from(i16::MAX)) as i16;

        self.fields
            .range(start..)
            .map(|(_, def)| def)
            .filter(move |def| i32::from(def.fid) >= cursor)
    }

    #[inline]
    pub fn enum_tables(&self) -> &[EnumTable] {
        &self.enum_tables
    }

    /// Enum table referenced by the given fid.
    #[inline]
    pub fn enum_table(&self, fid: i16) -> Option<&EnumTable> {
        self.enum_index.get(&fid).map(|&idx| &self.enum_tables[idx])
    }

    /// Display text for an enumerated value of a field.
    pub fn enum_display(&self, fid: i16, value: u16) -> Option<&str> {
        self.enum_table(fid)?
            .entries
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.display.as_str())
    }

    #[inline]
    pub fn field_tag(&self, name: &str) -> Option<&str> {
        self.field_tags.get(name).map(String::as_str)
    }

    #[inline]
    pub fn enum_tag(&self, name: &str) -> Option<&str> {
        self.enum_tags.get(name).map(String::as_str)
    }

    #[inline]
    pub fn set_field_tag<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.field_tags.insert(name.into(), value.into());
    }

    #[inline]
    pub fn set_enum_tag<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.enum_tags.insert(name.into(), value.into());
    }

    /// Adds a field definition. Each fid may be defined once.
    pub fn insert_field(&mut self, def: FieldDefinition) -> Result<(), DictionaryError> {
        if self.fields.contains_key(&def.fid) {
            return Err(DictionaryError::Duplicate(def.fid));
        }

        self.acronyms.insert(def.acronym.clone(), def.fid);
        self.fields.insert(def.fid, def);
        Ok(())
    }

    /// Adds an enum table. A fid may reference at most one table.
    pub fn insert_enum_table(&mut self, table: EnumTable) -> Result<(), DictionaryError> {
        if let Some(&fid) = table.fids.iter().find(|fid| self.enum_index.contains_key(*fid)) {
            return Err(DictionaryError::Duplicate(fid));
        }

        let idx = self.enum_tables.len();
        for &fid in &table.fids {
            self.enum_index.insert(fid, idx);
        }
        self.enum_tables.push(table);
        Ok(())
    }
}

/// Name of a legacy field type code.
pub fn field_type_name(code: i8) -> Option<&'static str> {
    FIELD_TYPES.iter().find(|(_, c)| *c == code).map(|(name, _)| *name)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups() {
        let dictionary = fixtures::dictionary();

        assert_eq!(dictionary.field_count(), 14);
        assert_eq!(dictionary.min_fid(), 1);
        assert_eq!(dictionary.max_fid(), 26);
        assert_eq!(dictionary.field_by_acronym("BID").map(|def| def.fid), Some(22));
        assert_eq!(dictionary.field(6).map(|def| def.ripples_to), Some(7));
        assert_eq!(dictionary.enum_display(15, 840), Some("USD"));
        assert_eq!(dictionary.enum_display(131, 0), Some(" "));
        assert_eq!(dictionary.enum_display(15, 1), None);
        assert_eq!(dictionary.field_tag("Version"), Some("4.20.29"));
        assert_eq!(dictionary.enum_tag("DT_Version"), Some("17.91"));
    }

    #[test]
    fn test_fields_from_cursor() {
        let dictionary = fixtures::dictionary();

        let fids: Vec<i16> = dictionary.fields_from(20).map(|def| def.fid).collect();
        assert_eq!(fids, vec![22, 23, 25, 26]);

        assert_eq!(dictionary.fields_from(i32::from(i16::MAX) + 1).count(), 0);
        assert_eq!(dictionary.fields_from(i32::MIN).count(), 14);
    }

    #[test]
    fn test_duplicate_definitions() {
        let mut dictionary = fixtures::dictionary();
        let def = dictionary.field(22).cloned().unwrap();

        match dictionary.insert_field(def) {
            Err(DictionaryError::Duplicate(22)) => (),
            other => panic!("Expected duplicate error, got {:?}", other),
        }

        let table = EnumTable {
            fids: vec![15],
            entries: Vec::new(),
        };

        match dictionary.insert_enum_table(table) {
            Err(DictionaryError::Duplicate(15)) => (),
            other => panic!("Expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_field_type_names() {
        assert_eq!(field_type_name(4), Some("PRICE"));
        assert_eq!(field_type_name(42), None);
    }
}
