//! Multi-part dictionary refreshes.
//!
//! A dictionary usually exceeds a single message, so it is sent as a sequence of refresh parts.
//! Only the first part clears the consumer cache and carries the summary, only the last part is
//! flagged refresh complete.
use super::{
    DataDictionary, DictionaryError, EnumEntry, EnumTable, FieldDefinition, ENUM_TYPE_DICTIONARY_NAME,
    FIELD_DICTIONARY_NAME, TYPE_ENUM_TABLES, TYPE_FIELD_DEFINITIONS, VERBOSITY_NORMAL, VERBOSITY_VERBOSE,
};
use crate::codec::{CodecError, CodecResult, DictionaryProgress, MessageCodec};
use crate::rdm::{Data, DomainType, ElementList, Msg, MsgFlags, MsgKey, Series, State};
use std::convert::TryFrom;

/// Enum table parts are capped independently of the channel fragment size.
pub const MAX_ENUM_TYPE_DICTIONARY_MSG_SIZE: usize = 12800;

const VERBOSE_ONLY: u32 = VERBOSITY_VERBOSE & !VERBOSITY_NORMAL;
const NORMAL_ONLY: u32 = VERBOSITY_NORMAL & !super::VERBOSITY_MINIMAL;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DictionaryKind {
    Field,
    EnumType,
}

impl DictionaryKind {
    /// Resolves a download name.
    #[inline]
    pub fn from_name(name: &str) -> Option<DictionaryKind> {
        match name {
            FIELD_DICTIONARY_NAME => Some(DictionaryKind::Field),
            ENUM_TYPE_DICTIONARY_NAME => Some(DictionaryKind::EnumType),
            _ => None,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            DictionaryKind::Field => FIELD_DICTIONARY_NAME,
            DictionaryKind::EnumType => ENUM_TYPE_DICTIONARY_NAME,
        }
    }

    #[inline]
    fn label(self) -> &'static str {
        match self {
            DictionaryKind::Field => "Field Dictionary",
            DictionaryKind::EnumType => "Enum Type Dictionary",
        }
    }

    /// Cursor of the first part.
    #[inline]
    pub fn start(self, dictionary: &DataDictionary) -> i32 {
        match self {
            DictionaryKind::Field => i32::from(dictionary.min_fid()),
            DictionaryKind::EnumType => 0,
        }
    }

    /// Size cap of a single part given the channel fragment size.
    #[inline]
    pub fn max_part_size(self, max_fragment_size: usize) -> usize {
        match self {
            DictionaryKind::Field => max_fragment_size,
            DictionaryKind::EnumType => MAX_ENUM_TYPE_DICTIONARY_MSG_SIZE,
        }
    }
}

/// Summary of the field dictionary, carried by the first part.
pub fn field_summary(dictionary: &DataDictionary) -> Data {
    let mut summary = ElementList::new();
    summary
        .push("Type", Data::UInt(TYPE_FIELD_DEFINITIONS))
        .push("Version", Data::ascii(dictionary.field_tag("Version").unwrap_or("")));
    Data::ElementList(summary)
}

/// Summary of the enum type dictionary, carried by the first part.
pub fn enum_summary(dictionary: &DataDictionary) -> Data {
    let mut summary = ElementList::new();
    summary
        .push("Type", Data::UInt(TYPE_ENUM_TABLES))
        .push("Version", Data::ascii(dictionary.enum_tag("DT_Version").unwrap_or("")));
    Data::ElementList(summary)
}

/// Series entry describing one field.
pub fn field_entry(def: &FieldDefinition, verbosity: u32) -> Data {
    let mut entry = ElementList::new();
    entry
        .push("NAME", Data::ascii(def.acronym.as_str()))
        .push("FID", Data::Int(i64::from(def.fid)))
        .push("RIPPLETO", Data::Int(i64::from(def.ripples_to)))
        .push("TYPE", Data::Int(i64::from(def.field_type)))
        .push("LENGTH", Data::UInt(u64::from(def.length)))
        .push("RWFTYPE", Data::UInt(u64::from(def.rwf_type)))
        .push("RWFLEN", Data::UInt(u64::from(def.rwf_length)));

    if verbosity & NORMAL_ONLY != 0 {
        entry
            .push("ENUMLENGTH", Data::UInt(u64::from(def.enum_length)))
            .push("LONGNAME", Data::ascii(def.dde_acronym.as_str()));
    }

    Data::ElementList(entry)
}

/// Series entry describing one enum table.
pub fn enum_entry(table: &EnumTable, verbosity: u32) -> Data {
    let mut entry = ElementList::new();
    entry
        .push(
            "FIDS",
            Data::Array(table.fids.iter().map(|&fid| Data::Int(i64::from(fid))).collect()),
        )
        .push(
            "VALUE",
            Data::Array(table.entries.iter().map(|item| Data::Enum(item.value)).collect()),
        )
        .push(
            "DISPLAY",
            Data::ascii_array(table.entries.iter().map(|item| item.display.as_str())),
        );

    if verbosity & VERBOSE_ONLY != 0 {
        entry.push(
            "MEANING",
            Data::ascii_array(table.entries.iter().map(|item| item.meaning.as_str())),
        );
    }

    Data::ElementList(entry)
}

/// Refresh message for one part, with an empty series payload.
pub fn part_envelope(kind: DictionaryKind, stream_id: i32, key: &MsgKey, cursor: i32, first: bool) -> Msg {
    let text = format!("{} Refresh (starting fid {})", kind.label(), cursor);

    let mut flags = MsgFlags::SOLICITED;
    if first {
        flags |= MsgFlags::CLEAR_CACHE;
    }

    Msg::refresh(DomainType::DICTIONARY, stream_id, State::open_ok(text))
        .with_flags(flags)
        .with_key(key.clone())
        .with_payload(Data::Series(Series::default()))
}

/// Lazy sequence of refresh parts for one dictionary request.
pub struct DictionaryParts<'a> {
    codec: &'a dyn MessageCodec,
    dictionary: &'a DataDictionary,
    kind: DictionaryKind,
    stream_id: i32,
    key: MsgKey,
    verbosity: u32,
    max_size: usize,
    cursor: Option<i32>,
    first: bool,
}

impl<'a> DictionaryParts<'a> {
    /// Parts of at most `max_size` encoded bytes each. The verbosity comes from the key filter.
    pub fn new(
        codec: &'a dyn MessageCodec,
        dictionary: &'a DataDictionary,
        kind: DictionaryKind,
        stream_id: i32,
        key: MsgKey,
        max_size: usize,
    ) -> DictionaryParts<'a> {
        let verbosity = key.filter.unwrap_or(VERBOSITY_NORMAL);

        DictionaryParts {
            codec,
            dictionary,
            kind,
            stream_id,
            key,
            verbosity,
            max_size,
            cursor: Some(kind.start(dictionary)),
            first: true,
        }
    }

    fn encode_part(&mut self, cursor: i32) -> CodecResult<Msg> {
        let mut msg = part_envelope(self.kind, self.stream_id, &self.key, cursor, self.first);

        // Everything but the series contents
        let overhead = self.codec.encoded_len(&msg)? - self.codec.series_len(&Series::default())?;
        let budget = self
            .max_size
            .checked_sub(overhead)
            .ok_or(CodecError::BufferTooSmall {
                needed: overhead,
                capacity: self.max_size,
            })?;

        let part = match self.kind {
            DictionaryKind::Field => {
                self.codec
                    .encode_field_dictionary_part(self.dictionary, cursor, self.verbosity, budget)?
            }
            DictionaryKind::EnumType => {
                self.codec
                    .encode_enum_dictionary_part(self.dictionary, cursor, self.verbosity, budget)?
            }
        };

        match part.progress {
            DictionaryProgress::PartEncoded(next) => self.cursor = Some(next),
            DictionaryProgress::Complete => {
                self.cursor = None;
                msg.flags |= MsgFlags::REFRESH_COMPLETE;
            }
        }

        self.first = false;
        msg.payload = Data::Series(part.series);
        Ok(msg)
    }
}

impl<'a> Iterator for DictionaryParts<'a> {
    type Item = CodecResult<Msg>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        let result = self.encode_part(cursor);

        if result.is_err() {
            self.cursor = None;
        }

        Some(result)
    }
}

fn malformed<T>(reason: &str) -> Result<T, DictionaryError> {
    Err(DictionaryError::Malformed(reason.to_string()))
}

fn element_list(data: &Data) -> Result<&ElementList, DictionaryError> {
    match data {
        Data::ElementList(list) => Ok(list),
        _ => malformed("entry is not an element list"),
    }
}

fn narrow<T: TryFrom<i64>>(value: Option<i64>, what: &str) -> Result<T, DictionaryError> {
    match value.map(T::try_from) {
        Some(Ok(value)) => Ok(value),
        Some(Err(_)) => Err(DictionaryError::Malformed(format!("{} out of range", what))),
        None => Err(DictionaryError::Malformed(format!("missing {}", what))),
    }
}

fn unsigned<T: TryFrom<u64> + Default>(list: &ElementList, name: &str) -> Result<T, DictionaryError> {
    match list.uint(name).map(T::try_from) {
        Some(Ok(value)) => Ok(value),
        Some(Err(_)) => Err(DictionaryError::Malformed(format!("{} out of range", name))),
        None => Ok(T::default()),
    }
}

fn ascii_items(list: &ElementList, name: &str) -> Result<Vec<String>, DictionaryError> {
    match list.get(name) {
        Some(Data::Array(items)) => items
            .iter()
            .map(|item| match item {
                Data::Ascii(text) => Ok(text.clone()),
                _ => malformed("expected ascii array item"),
            })
            .collect(),
        Some(_) => malformed("expected array"),
        None => Ok(Vec::new()),
    }
}

impl DataDictionary {
    /// Adds the definitions carried by a received field dictionary part.
    pub fn apply_field_part(&mut self, series: &Series) -> Result<(), DictionaryError> {
        if let Some(summary) = &series.summary {
            if let Some(version) = element_list(summary)?.ascii("Version") {
                self.set_field_tag("Version", version);
            }
        }

        for entry in &series.entries {
            let list = element_list(entry)?;

            let def = FieldDefinition {
                acronym: match list.ascii("NAME") {
                    Some(name) => name.to_string(),
                    None => return malformed("field entry without NAME"),
                },
                dde_acronym: list.ascii("LONGNAME").unwrap_or("").to_string(),
                fid: narrow(list.int("FID"), "FID")?,
                ripples_to: narrow(list.int("RIPPLETO").or(Some(0)), "RIPPLETO")?,
                field_type: narrow(list.int("TYPE"), "TYPE")?,
                length: unsigned(list, "LENGTH")?,
                enum_length: unsigned(list, "ENUMLENGTH")?,
                rwf_type: unsigned(list, "RWFTYPE")?,
                rwf_length: unsigned(list, "RWFLEN")?,
            };

            self.insert_field(def)?;
        }

        Ok(())
    }

    /// Adds the enum tables carried by a received enum type dictionary part.
    pub fn apply_enum_part(&mut self, series: &Series) -> Result<(), DictionaryError> {
        if let Some(summary) = &series.summary {
            if let Some(version) = element_list(summary)?.ascii("Version") {
                self.set_enum_tag("DT_Version", version);
            }
        }

        for entry in &series.entries {
            let list = element_list(entry)?;

            let fids = match list.get("FIDS") {
                Some(Data::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Data::Int(fid) => narrow(Some(*fid), "FIDS"),
                        _ => malformed("expected int fid"),
                    })
                    .collect::<Result<Vec<i16>, _>>()?,
                _ => return malformed("enum entry without FIDS"),
            };

            let values = match list.get("VALUE") {
                Some(Data::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Data::Enum(value) => Ok(*value),
                        _ => malformed("expected enum value"),
                    })
                    .collect::<Result<Vec<u16>, _>>()?,
                _ => return malformed("enum entry without VALUE"),
            };

            let displays = ascii_items(list, "DISPLAY")?;
            let meanings = ascii_items(list, "MEANING")?;

            if displays.len() != values.len() || (!meanings.is_empty() && meanings.len() != values.len()) {
                return malformed("enum entry arrays differ in length");
            }

            let entries = values
                .into_iter()
                .zip(displays.into_iter())
                .enumerate()
                .map(|(idx, (value, display))| EnumEntry {
                    value,
                    display,
                    meaning: meanings.get(idx).cloned().unwrap_or_default(),
                })
                .collect();

            self.insert_enum_table(EnumTable { fids, entries })?;
        }

        Ok(())
    }
}
