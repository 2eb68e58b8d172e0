//! Roster parsing — uploaded spreadsheet bytes → normalized recipient records.

pub mod decode;
pub mod parser;

pub use decode::{DecodedText, TextEncoding, decode_roster_bytes};
pub use parser::{
    ParsedRoster, PreviewRoster, PreviewRow, RecipientRecord, parse_roster, preview_roster,
};
