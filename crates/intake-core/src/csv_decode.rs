use std::collections::HashMap;

use crate::error::DecodeError;

/// One data row keyed by the header names of the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    line: u64,
    fields: HashMap<String, String>,
}

impl DecodedRow {
    pub fn new(line: u64, fields: HashMap<String, String>) -> Self {
        Self { line, fields }
    }

    /// 1-based line of the upload this row started on.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).map(String::as_str)
    }
}

/// Decodes an uploaded CSV. The first row names the fields; every following
/// non-empty line becomes one [`DecodedRow`], in file order.
pub fn decode(contents: &[u8]) -> Result<Vec<DecodedRow>, DecodeError> {
    let text = std::str::from_utf8(contents)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    if text.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    check_quoting(text)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let fields = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(DecodedRow::new(line, fields));
    }

    Ok(rows)
}

#[derive(Clone, Copy)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// The csv reader runs an unclosed quoted field to end of input and glues
/// text after a closing quote onto the field, merging lines without error.
/// Both are rejected here. A `"` only opens a field at its first byte; inside
/// an unquoted field it is literal text.
fn check_quoting(text: &str) -> Result<(), DecodeError> {
    let mut state = QuoteState::FieldStart;
    let mut line: u64 = 1;

    for byte in text.bytes() {
        state = match (state, byte) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::FieldStart, b'"') => QuoteState::Quoted,
            (_, b',' | b'\n' | b'\r') => QuoteState::FieldStart,
            (QuoteState::QuoteInQuoted, _) => {
                return Err(DecodeError::TextAfterClosingQuote { line })
            }
            (QuoteState::FieldStart | QuoteState::Unquoted, _) => QuoteState::Unquoted,
        };
        if byte == b'\n' {
            line += 1;
        }
    }

    match state {
        QuoteState::Quoted => Err(DecodeError::UnterminatedQuote),
        _ => Ok(()),
    }
}
