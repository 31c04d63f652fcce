//! File-layout detection and tabular text parsing.
//!
//! Downloaded files are either delimited text or a fixed-width
//! "strict-column" layout whose field boundaries are marked by a ruler line.
//! Detection is a heuristic over a bounded sample of leading lines; it is a
//! classifier, not a guaranteed-correct parser, so everything here is a pure
//! function over the file text.

use crate::error::ConnectorError;
use crate::types::DataTable;

/// Hard cap on parsed data rows per file.
pub const MAX_PARSED_ROWS: usize = 5000;

/// How many leading lines the layout sniffer inspects.
const DETECT_SAMPLE_LINES: usize = 5;

/// Detected physical layout of a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// Fixed-width columns delimited by a ruler line.
    StrictColumn,
    /// Delimiter-separated text (csv-like).
    Delimited,
}

/// A separator/ruler line: no letters or digits, and one dominant repeated
/// character. Spaces are ignored, so `"-----  -----"` qualifies, and so does
/// `"----+----+----"` where `+` marks column breaks.
pub fn is_ruler_line(line: &str) -> bool {
    let stripped: Vec<char> = line.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return false;
    }
    if stripped.iter().any(|c| c.is_alphanumeric()) {
        return false;
    }

    let mut best = 0;
    for candidate in &stripped {
        let count = stripped.iter().filter(|c| *c == candidate).count();
        if count > best {
            best = count;
        }
    }
    best * 2 >= stripped.len()
}

/// Parenthesis-wrapped trailer such as `"(5 rows)"`.
fn is_footer_line(line: &str) -> bool {
    let stripped: String = line.trim().chars().filter(|c| !c.is_whitespace()).collect();
    stripped.starts_with('(') && stripped.ends_with(')') && stripped.len() >= 2
}

/// Scan leading lines: any ruler line within the sample means fixed-width,
/// otherwise the file is treated as delimited text.
pub fn detect_layout(content: &str) -> FileLayout {
    for (index, line) in content.lines().enumerate() {
        if is_ruler_line(line) {
            return FileLayout::StrictColumn;
        }
        if index == DETECT_SAMPLE_LINES {
            break;
        }
    }
    FileLayout::Delimited
}

/// Sniff the delimiter from one line. Only `,` and `;` are supported
/// downstream; anything else (including an undecidable line) falls back to
/// a comma.
pub fn sniff_delimiter(line: &str) -> char {
    let mut best = ',';
    let mut best_count = line.matches(',').count();
    for candidate in [';', '\t', '|'] {
        let count = line.matches(candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    if best_count == 0 || !matches!(best, ',' | ';') {
        return ',';
    }
    best
}

/// Parse delimiter-separated text into a table. The first record is the
/// header; short records are padded with nulls, long ones truncated.
pub fn parse_delimited(content: &str, delimiter: char) -> Result<DataTable, ConnectorError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = DataTable::new(columns);
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(table.columns.len())
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        row.resize(table.columns.len(), None);
        table.rows.push(row);
        if table.rows.len() == MAX_PARSED_ROWS {
            break;
        }
    }
    Ok(table)
}

/// Field cut points of a ruler line: position zero plus the start of every
/// run of spaces, measured in characters.
fn column_cuts(ruler: &str) -> Vec<usize> {
    let chars: Vec<char> = ruler.trim_end().chars().collect();
    let mut cuts = vec![0];
    let mut in_space_run = false;
    for (index, ch) in chars.iter().enumerate() {
        if *ch == ' ' {
            if !in_space_run {
                cuts.push(index);
                in_space_run = true;
            }
        } else {
            in_space_run = false;
        }
    }
    cuts.push(chars.len());
    cuts
}

fn slice_fields(line: &str, cuts: &[usize]) -> Vec<Option<String>> {
    let chars: Vec<char> = line.chars().collect();
    let mut fields = Vec::with_capacity(cuts.len().saturating_sub(1));
    for window in cuts.windows(2) {
        let start = window[0].min(chars.len());
        let end = window[1].min(chars.len());
        let field: String = chars[start..end].iter().collect();
        let field = field.trim().to_string();
        fields.push(if field.is_empty() { None } else { Some(field) });
    }
    fields
}

/// Parse a fixed-width file. The header sits directly above the ruler line;
/// ruler and footer lines are skipped when reconstructing rows.
pub fn parse_strict_column(content: &str) -> Result<DataTable, ConnectorError> {
    let lines: Vec<&str> = content.lines().collect();
    let ruler_index = lines.iter().position(|l| is_ruler_line(l)).ok_or_else(|| {
        ConnectorError::Internal("strict-column parse requested without a ruler line".to_string())
    })?;

    let cuts = column_cuts(lines[ruler_index]);

    let mut header_seen = false;
    let mut table = DataTable::default();

    for line in lines.iter().skip(ruler_index.saturating_sub(1)) {
        if is_ruler_line(line) || is_footer_line(line) || line.trim().is_empty() {
            continue;
        }

        let fields = slice_fields(line, &cuts);
        if !header_seen {
            table.columns = fields.into_iter().map(|f| f.unwrap_or_default()).collect();
            header_seen = true;
        } else {
            table.rows.push(fields);
            if table.rows.len() == MAX_PARSED_ROWS {
                break;
            }
        }
    }

    Ok(table)
}

/// Detect the layout of `content` and parse accordingly.
pub fn parse_auto(content: &str) -> Result<DataTable, ConnectorError> {
    match detect_layout(content) {
        FileLayout::StrictColumn => parse_strict_column(content),
        FileLayout::Delimited => {
            let first_line = content.lines().next().unwrap_or_default();
            parse_delimited(content, sniff_delimiter(first_line))
        }
    }
}
