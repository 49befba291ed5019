//! Parsers for the text dictionary formats (`RDMFieldDictionary` and `enumtype.def`).
use super::{DataDictionary, DictionaryError, EnumEntry, EnumTable, FieldDefinition, FIELD_TYPES, RWF_TYPES};
use std::fs;
use std::path::Path;
use std::str::FromStr;

const TAG_PREFIX: &str = "!tag";
const NULL_RIPPLE: &str = "NULL";

impl DataDictionary {
    /// Loads field definitions from a field dictionary file.
    pub fn load_field_dictionary<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DictionaryError> {
        let text = fs::read_to_string(path)?;
        self.parse_field_dictionary(&text)
    }

    /// Loads enum tables from an enum type definition file.
    pub fn load_enum_dictionary<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DictionaryError> {
        let text = fs::read_to_string(path)?;
        self.parse_enum_dictionary(&text)
    }

    pub fn parse_field_dictionary(&mut self, text: &str) -> Result<(), DictionaryError> {
        // Ripple targets may be defined further down, resolve them once everything is loaded
        let mut ripples = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;

            match classify(raw) {
                Line::Blank | Line::Comment => continue,
                Line::Tag(name, value) => {
                    self.set_field_tag(name, value);
                    continue;
                }
                Line::Content => (),
            }

            let tokens = tokenize(raw).map_err(|reason| DictionaryError::Parse { line, reason })?;
            let (def, ripple) = parse_field(&tokens).map_err(|reason| DictionaryError::Parse { line, reason })?;

            if ripple != NULL_RIPPLE {
                ripples.push((def.fid, ripple, line));
            }

            self.insert_field(def).map_err(|err| match err {
                DictionaryError::Duplicate(fid) => DictionaryError::Parse {
                    line,
                    reason: format!("duplicate definition for fid {}", fid),
                },
                other => other,
            })?;
        }

        for (fid, ripple, line) in ripples {
            let target = self
                .field_by_acronym(&ripple)
                .map(|def| def.fid)
                .ok_or_else(|| DictionaryError::Parse {
                    line,
                    reason: format!("unknown ripple target {}", ripple),
                })?;

            if let Some(def) = self.fields.get_mut(&fid) {
                def.ripples_to = target;
            }
        }

        Ok(())
    }

    pub fn parse_enum_dictionary(&mut self, text: &str) -> Result<(), DictionaryError> {
        let mut current: Option<EnumTable> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;

            match classify(raw) {
                Line::Blank | Line::Comment => continue,
                Line::Tag(name, value) => {
                    self.set_enum_tag(name, value);
                    continue;
                }
                Line::Content => (),
            }

            let tokens = tokenize(raw).map_err(|reason| DictionaryError::Parse { line, reason })?;
            let parse_err = |reason: String| DictionaryError::Parse { line, reason };

            match tokens[0].text.parse::<u16>() {
                // Value row: VALUE DISPLAY [MEANING...]
                Ok(value) => {
                    let table = current
                        .as_mut()
                        .ok_or_else(|| parse_err("enum value without a referencing field".into()))?;

                    let display = tokens
                        .get(1)
                        .ok_or_else(|| parse_err("missing display value".into()))
                        .and_then(|token| parse_display(token).map_err(parse_err))?;

                    let meaning = tokens[2.min(tokens.len())..]
                        .iter()
                        .map(|token| token.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ");

                    table.entries.push(EnumEntry { value, display, meaning });
                }
                // Reference row: ACRONYM FID. A reference after values starts a new table.
                Err(_) => {
                    let fid = tokens
                        .get(1)
                        .ok_or_else(|| parse_err("missing fid".into()))
                        .and_then(|token| parse_number::<i16>(&token.text, "fid").map_err(parse_err))?;

                    if current.as_ref().map_or(false, |table| !table.entries.is_empty()) {
                        if let Some(table) = current.take() {
                            self.insert_enum_table(table)?;
                        }
                    }

                    current.get_or_insert_with(EnumTable::default).fids.push(fid);
                }
            }
        }

        if let Some(table) = current {
            self.insert_enum_table(table)?;
        }

        Ok(())
    }
}

enum Line<'a> {
    Blank,
    Comment,
    Tag(&'a str, String),
    Content,
}

fn classify(raw: &str) -> Line {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Line::Blank;
    }

    if trimmed.starts_with(TAG_PREFIX) {
        let mut parts = trimmed[TAG_PREFIX.len()..].split_whitespace();

        return match parts.next() {
            Some(name) => Line::Tag(name, parts.collect::<Vec<_>>().join(" ")),
            None => Line::Comment,
        };
    }

    match trimmed.starts_with('!') {
        true => Line::Comment,
        false => Line::Content,
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Splits a line into whitespace separated tokens. Quoted strings form a single token and
/// parentheses are tokens of their own.
fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => text.push(ch),
                    None => return Err("unterminated quoted string".into()),
                }
            }
            tokens.push(Token { text, quoted: true });
            continue;
        }

        if c == '(' || c == ')' {
            chars.next();
            tokens.push(Token {
                text: c.to_string(),
                quoted: false,
            });
            continue;
        }

        let mut text = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == '"' || ch == '(' || ch == ')' {
                break;
            }
            text.push(ch);
            chars.next();
        }
        tokens.push(Token { text, quoted: false });
    }

    Ok(tokens)
}

fn parse_number<T: FromStr>(text: &str, what: &str) -> Result<T, String> {
    text.parse::<T>().map_err(|_| format!("invalid {} '{}'", what, text))
}

fn lookup<T: Copy>(table: &[(&str, T)], name: &str, what: &str) -> Result<T, String> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, code)| *code)
        .ok_or_else(|| format!("unknown {} '{}'", what, name))
}

/// Parses `ACRONYM "DDE" FID RIPPLES TYPE LENGTH [( ENUMLEN )] RWFTYPE RWFLEN`, returning the
/// definition along with the unresolved ripple acronym.
fn parse_field(tokens: &[Token]) -> Result<(FieldDefinition, String), String> {
    let (enum_length, rest) = match tokens.len() {
        8 => (0, &tokens[6..]),
        11 if tokens[6].text == "(" && tokens[8].text == ")" => {
            (parse_number::<u8>(&tokens[7].text, "enum length")?, &tokens[9..])
        }
        count => return Err(format!("expected 8 or 11 columns, found {}", count)),
    };

    if !tokens[1].quoted {
        return Err(format!("DDE acronym must be quoted, found '{}'", tokens[1].text));
    }

    let def = FieldDefinition {
        acronym: tokens[0].text.clone(),
        dde_acronym: tokens[1].text.clone(),
        fid: parse_number(&tokens[2].text, "fid")?,
        ripples_to: 0,
        field_type: lookup(FIELD_TYPES, &tokens[4].text, "field type")?,
        length: parse_number(&tokens[5].text, "length")?,
        enum_length,
        rwf_type: lookup(RWF_TYPES, &rest[0].text, "rwf type")?,
        rwf_length: parse_number(&rest[1].text, "rwf length")?,
    };

    Ok((def, tokens[3].text.clone()))
}

/// Display values are either quoted text or hex encoded bytes enclosed in `#`.
fn parse_display(token: &Token) -> Result<String, String> {
    let text = &token.text;

    if token.quoted || !text.starts_with('#') {
        return Ok(text.clone());
    }

    if text.len() < 2 || !text.ends_with('#') || text.len() % 2 != 0 {
        return Err(format!("invalid hex display '{}'", text));
    }

    let hex = &text[1..text.len() - 1];
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(&hex[idx..idx + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| format!("invalid hex display '{}'", text))?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
