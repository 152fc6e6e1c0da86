//! Line grammar: raw source lines to indentation-tagged records.

use crate::error::{ConfigError, SourceFile, SyntaxError};

/// Width of one indentation level in spaces. A tab counts as one level.
pub const INDENT_UNIT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// A class header. `key` is stripped of `<...>` when `root` is set.
    Class { key: String, root: bool },
    /// A `key: value` line under the nearest preceding class header.
    Attribute { key: String, value: String },
}

/// One structural line of a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// 1-based line number.
    pub number: usize,
    /// Indentation level (spaces divided by [`INDENT_UNIT`]).
    pub indent: usize,
    pub raw: String,
    pub kind: LineKind,
}

fn leading_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += INDENT_UNIT,
            _ => break,
        }
    }
    width
}

/// Splits `source` into records, skipping blank lines and `#` comments.
pub(crate) fn parse_lines(source: &SourceFile) -> Result<Vec<LineRecord>, ConfigError> {
    let mut records = Vec::new();
    let mut last_indent: isize = -1;
    let mut attr_indent: isize = -1;

    for (index, line) in source.text.split('\n').enumerate() {
        let number = index + 1;
        let raw = line.trim_end_matches('\r');
        let fail = |err: SyntaxError| ConfigError::new(err, number, source);

        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let width = leading_width(raw);
        if width % INDENT_UNIT != 0 {
            return Err(fail(SyntaxError::InvalidIndentation));
        }
        let indent = width / INDENT_UNIT;
        let level = indent as isize;
        if level - last_indent >= 2 {
            return Err(fail(SyntaxError::BadUnindent));
        }
        last_indent = level;

        let (key, value) = match text.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            // Class headers may omit the trailing colon.
            None if text.starts_with(|c: char| c.is_ascii_lowercase()) => {
                return Err(fail(SyntaxError::MissingSeparator));
            }
            None => (text, ""),
        };
        if key.is_empty() {
            return Err(fail(SyntaxError::EmptyKey));
        }

        let kind = if value.is_empty() {
            let key = if indent == 0 {
                let Some(inner) = key.strip_prefix('<').and_then(|k| k.strip_suffix('>')) else {
                    return Err(fail(SyntaxError::KeyFormatError));
                };
                let inner = inner.trim();
                if inner.is_empty() {
                    return Err(fail(SyntaxError::EmptyClass));
                }
                inner
            } else {
                key
            };
            attr_indent = level + 1;
            LineKind::Class {
                key: key.to_string(),
                root: indent == 0,
            }
        } else {
            if level != attr_indent {
                return Err(fail(SyntaxError::AttributeMustFollowClass));
            }
            LineKind::Attribute {
                key: key.to_string(),
                value: value.to_string(),
            }
        };

        records.push(LineRecord {
            number,
            indent,
            raw: raw.to_string(),
            kind,
        });
    }
    Ok(records)
}
