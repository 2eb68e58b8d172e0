//! CSV roster → `RecipientRecord`s.
//!
//! Recognized columns (case-sensitive, all optional): `name` or
//! `first` + `last`, `email` or `mail`, `new`, `send`. Any other column is
//! carried through untouched in `raw_fields` for the preview table.

use std::collections::BTreeMap;

use serde::Serialize;

use super::decode::{TextEncoding, decode_roster_bytes};
use crate::error::ValidationError;

/// Column names the parser understands.
pub mod columns {
    pub const NAME: &str = "name";
    pub const FIRST: &str = "first";
    pub const LAST: &str = "last";
    pub const EMAIL: &str = "email";
    pub const MAIL: &str = "mail";
    pub const NEW: &str = "new";
    pub const SEND: &str = "send";
}

/// One roster row, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRecord {
    /// Zero-based position of the row among the data rows.
    pub index: usize,
    pub first: String,
    pub last: String,
    /// The `name` column when present and non-empty, else `"first last"`.
    pub full_name: String,
    /// May be empty; such records are always skipped.
    pub email: String,
    /// Expected `"1"` for recipients added since the last run.
    pub new_flag: String,
    /// Non-empty once a diploma has been sent.
    pub send_flag: String,
    /// Original (trimmed) column values keyed by header.
    pub raw_fields: BTreeMap<String, String>,
}

impl RecipientRecord {
    /// New and not yet sent. Email and selection are checked separately.
    pub fn is_eligible(&self) -> bool {
        self.new_flag == "1" && self.send_flag.is_empty()
    }

    /// Email when present, otherwise the display name.
    pub fn label(&self) -> &str {
        if self.email.is_empty() {
            &self.full_name
        } else {
            &self.email
        }
    }
}

/// The send form: normalized records plus the resolved header list.
#[derive(Debug, Clone)]
pub struct ParsedRoster {
    /// Source headers with `new` and `send` appended when missing.
    pub headers: Vec<String>,
    pub records: Vec<RecipientRecord>,
    pub encoding: TextEncoding,
}

/// A row of the preview table.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub index: usize,
    pub name: String,
    pub email: String,
    pub new: String,
    pub send: String,
    pub eligible: bool,
    pub raw: BTreeMap<String, String>,
}

/// The preview form returned to the operator before sending.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRoster {
    pub headers: Vec<String>,
    pub rows: Vec<PreviewRow>,
    pub encoding: TextEncoding,
}

/// Decode and parse an uploaded roster.
pub fn parse_roster(bytes: &[u8]) -> Result<ParsedRoster, ValidationError> {
    let decoded = decode_roster_bytes(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(decoded.text.as_bytes());

    let source_headers: Vec<String> = reader
        .headers()
        .map_err(invalid_roster)?
        .iter()
        .map(str::to_string)
        .collect();
    let has_name_column = source_headers.iter().any(|h| h == columns::NAME);

    let mut headers = source_headers.clone();
    for required in [columns::NEW, columns::SEND] {
        if !headers.iter().any(|h| h == required) {
            headers.push(required.to_string());
        }
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(invalid_roster)?;

        // Later duplicate headers overwrite earlier ones.
        let mut by_column: BTreeMap<&str, &str> = BTreeMap::new();
        for (header, value) in source_headers.iter().zip(row.iter()) {
            by_column.insert(header.as_str(), value.trim());
        }
        let get = |key: &str| by_column.get(key).copied().unwrap_or("").to_string();

        let raw_fields = headers
            .iter()
            .map(|h| (h.clone(), get(h)))
            .collect::<BTreeMap<_, _>>();

        records.push(normalize_row(index, &get, has_name_column, raw_fields));
    }

    tracing::info!(
        rows = records.len(),
        encoding = %decoded.encoding,
        "Roster parsed"
    );

    Ok(ParsedRoster {
        headers,
        records,
        encoding: decoded.encoding,
    })
}

/// Parse a roster into the indexed preview form.
pub fn preview_roster(bytes: &[u8]) -> Result<PreviewRoster, ValidationError> {
    let parsed = parse_roster(bytes)?;
    let rows = parsed
        .records
        .into_iter()
        .map(|record| PreviewRow {
            index: record.index,
            eligible: record.is_eligible(),
            name: record.full_name,
            email: record.email,
            new: record.new_flag,
            send: record.send_flag,
            raw: record.raw_fields,
        })
        .collect();

    Ok(PreviewRoster {
        headers: parsed.headers,
        rows,
        encoding: parsed.encoding,
    })
}

fn normalize_row(
    index: usize,
    get: &dyn Fn(&str) -> String,
    has_name_column: bool,
    raw_fields: BTreeMap<String, String>,
) -> RecipientRecord {
    let name = get(columns::NAME);
    let first = get(columns::FIRST);
    let last = get(columns::LAST);

    let full_name = if has_name_column && !name.is_empty() {
        name
    } else {
        format!("{first} {last}").trim().to_string()
    };

    let email = match get(columns::EMAIL) {
        e if !e.is_empty() => e,
        _ => get(columns::MAIL),
    };

    RecipientRecord {
        index,
        first,
        last,
        full_name,
        email,
        new_flag: get(columns::NEW),
        send_flag: get(columns::SEND),
        raw_fields,
    }
}

fn invalid_roster(e: csv::Error) -> ValidationError {
    ValidationError::InvalidField {
        field: "csv_file".to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedRoster {
        parse_roster(text.as_bytes()).unwrap()
    }

    #[test]
    fn record_count_and_order_match_data_rows() {
        let roster = parse("name,email\nA,a@x.com\nB,b@x.com\nC,c@x.com\n");
        assert_eq!(roster.records.len(), 3);
        let names: Vec<&str> = roster.records.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        let indices: Vec<usize> = roster.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn name_column_takes_priority() {
        let roster = parse("name,first,last,email\nNoa Levi,X,Y,n@x.com\n");
        assert_eq!(roster.records[0].full_name, "Noa Levi");
    }

    #[test]
    fn empty_name_falls_back_to_first_last() {
        let roster = parse("name,first,last,email\n,Noa,Levi,n@x.com\n");
        assert_eq!(roster.records[0].full_name, "Noa Levi");
    }

    #[test]
    fn first_only_has_no_trailing_space() {
        let roster = parse("first,last,email\nNoa,,n@x.com\n");
        assert_eq!(roster.records[0].full_name, "Noa");
    }

    #[test]
    fn mail_column_used_when_email_empty() {
        let roster = parse("name,email,mail\nA,,a@x.com\nB,b@x.com,other@x.com\n");
        assert_eq!(roster.records[0].email, "a@x.com");
        assert_eq!(roster.records[1].email, "b@x.com");
    }

    #[test]
    fn values_are_trimmed() {
        let roster = parse("name,email,new\n  Dana  , d@x.com ,1 \n");
        let r = &roster.records[0];
        assert_eq!(r.full_name, "Dana");
        assert_eq!(r.email, "d@x.com");
        assert_eq!(r.new_flag, "1");
    }

    #[test]
    fn new_and_send_headers_are_ensured() {
        let roster = parse("name,email,group\nA,a@x.com,g1\n");
        assert_eq!(roster.headers, vec!["name", "email", "group", "new", "send"]);
        let r = &roster.records[0];
        assert_eq!(r.new_flag, "");
        assert_eq!(r.send_flag, "");
        assert_eq!(r.raw_fields.get("group").map(String::as_str), Some("g1"));
        assert_eq!(r.raw_fields.get("send").map(String::as_str), Some(""));
    }

    #[test]
    fn existing_new_send_headers_not_duplicated() {
        let roster = parse("send,name,new\nx,A,1\n");
        assert_eq!(roster.headers, vec!["send", "name", "new"]);
    }

    #[test]
    fn short_rows_default_missing_cells() {
        let roster = parse("name,email,new,send\nA,a@x.com\n");
        assert_eq!(roster.records.len(), 1);
        assert_eq!(roster.records[0].new_flag, "");
    }

    #[test]
    fn header_only_roster_is_empty() {
        let roster = parse("name,email\n");
        assert!(roster.records.is_empty());
    }

    #[test]
    fn eligibility_is_exact_conjunction() {
        let mut r = parse("name,email,new,send\nA,a@x.com,1,\n").records.remove(0);
        assert!(r.is_eligible());

        r.new_flag = "0".into();
        assert!(!r.is_eligible());
        r.new_flag = "".into();
        assert!(!r.is_eligible());
        r.new_flag = "1".into();
        r.send_flag = "x".into();
        assert!(!r.is_eligible());
        r.new_flag = "yes".into();
        assert!(!r.is_eligible());
    }

    #[test]
    fn label_prefers_email() {
        let roster = parse("name,email\nA,a@x.com\nB,\n");
        assert_eq!(roster.records[0].label(), "a@x.com");
        assert_eq!(roster.records[1].label(), "B");
    }

    #[test]
    fn preview_rows_are_indexed_and_flag_eligibility() {
        let preview = preview_roster(
            "name,email,new,send,notes\nA,a@x.com,1,,hi\nB,b@x.com,1,2024\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[0].index, 0);
        assert!(preview.rows[0].eligible);
        assert_eq!(preview.rows[0].raw["notes"], "hi");
        assert_eq!(preview.rows[1].index, 1);
        assert!(!preview.rows[1].eligible);
        assert_eq!(preview.encoding, TextEncoding::Utf8Sig);
    }

    #[test]
    fn quoted_fields_with_commas() {
        let roster = parse("name,email\n\"Levi, Noa\",n@x.com\n");
        assert_eq!(roster.records[0].full_name, "Levi, Noa");
    }
}
