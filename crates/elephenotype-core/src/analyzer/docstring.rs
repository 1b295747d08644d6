//! Docstring decoding: literal prefix/quote stripping, escape sequences,
//! adjacent-literal concatenation and indentation cleanup.

use std::str::Chars;

/// Decode a Python string literal used as a docstring.
///
/// Returns `None` for bytes and f-string literals, which are never docstrings.
pub fn decode_docstring(literal: &str) -> Option<String> {
    decode_literal(literal).map(|text| clean_indentation(&text))
}

/// Decode adjacent literals (`"a" "b"`) that together form one docstring.
pub fn decode_concatenated_docstring(literals: &[&str]) -> Option<String> {
    if literals.is_empty() {
        return None;
    }
    let mut text = String::new();
    for literal in literals {
        text.push_str(&decode_literal(literal)?);
    }
    Some(clean_indentation(&text))
}

fn decode_literal(literal: &str) -> Option<String> {
    let quote_at = literal.find(['"', '\''])?;
    let prefix = literal[..quote_at].to_ascii_lowercase();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }
    let raw = prefix.contains('r');
    let body = &literal[quote_at..];

    let inner = if body.len() >= 6 && (body.starts_with("\"\"\"") || body.starts_with("'''")) {
        &body[3..body.len() - 3]
    } else if body.len() >= 2 {
        &body[1..body.len() - 1]
    } else {
        return None;
    };

    Some(if raw { inner.to_string() } else { unescape(inner) })
}

/// Take `digits` hex digits from `chars` as one code point, advancing only
/// on success.
fn take_hex(chars: &mut Chars<'_>, digits: usize) -> Option<char> {
    let lookahead: String = chars.clone().take(digits).collect();
    if lookahead.len() != digits || !lookahead.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = u32::from_str_radix(&lookahead, 16).ok().and_then(char::from_u32)?;
    chars.nth(digits - 1);
    Some(decoded)
}

fn take_octal(first: char, chars: &mut Chars<'_>) -> Option<char> {
    let mut value = first.to_digit(8)?;
    for _ in 0..2 {
        match chars.clone().next().and_then(|d| d.to_digit(8)) {
            Some(d) => {
                value = value * 8 + d;
                chars.next();
            }
            None => break,
        }
    }
    char::from_u32(value)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        let decoded = match escape {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            'f' => Some('\u{0c}'),
            'v' => Some('\u{0b}'),
            '\\' | '\'' | '"' => Some(escape),
            '\n' => continue,
            '0'..='7' => take_octal(escape, &mut chars),
            'x' => take_hex(&mut chars, 2),
            'u' => take_hex(&mut chars, 4),
            'U' => take_hex(&mut chars, 8),
            _ => None,
        };
        match decoded {
            Some(ch) => out.push(ch),
            None => {
                out.push('\\');
                out.push(escape);
            }
        }
    }
    out
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let pad = 8 - column % 8;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
        } else {
            out.push(c);
            column = if c == '\n' { 0 } else { column + 1 };
        }
    }
    out
}

/// Strip the common leading indentation of all lines after the first, trim
/// the first line, and drop leading and trailing blank lines.
pub fn clean_indentation(text: &str) -> String {
    let expanded = expand_tabs(text);
    let lines: Vec<&str> = expanded.split('\n').collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim_start().is_empty())
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .min();

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    if let Some(first) = lines.first() {
        cleaned.push(first.trim_start().to_string());
    }
    for line in lines.iter().skip(1) {
        let stripped = match margin {
            Some(m) if line.len() >= m && line.is_char_boundary(m) => &line[m..],
            _ => line.trim_start(),
        };
        cleaned.push(stripped.to_string());
    }

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_docstring() {
        assert_eq!(decode_docstring("\"\"\"Add two numbers.\"\"\""), Some("Add two numbers.".into()));
        assert_eq!(decode_docstring("'short'"), Some("short".into()));
    }

    #[test]
    fn test_multiline_docstring_is_dedented() {
        let literal = "\"\"\"Summary line.\n\n        Details here.\n          indented more.\n        \"\"\"";
        assert_eq!(
            decode_docstring(literal).unwrap(),
            "Summary line.\n\nDetails here.\n  indented more."
        );
    }

    #[test]
    fn test_raw_docstring_keeps_backslashes() {
        assert_eq!(decode_docstring(r#"r"""a\nb""""#), Some(r"a\nb".into()));
        assert_eq!(decode_docstring(r#""""a\nb""""#), Some("a\nb".into()));
    }

    #[test]
    fn test_bytes_and_fstrings_are_not_docstrings() {
        assert_eq!(decode_docstring("b'data'"), None);
        assert_eq!(decode_docstring("f\"{x}\""), None);
    }

    #[test]
    fn test_numeric_escapes_are_decoded() {
        assert_eq!(decode_docstring(r#""caf\xe9 \u00e9 \U0001F600 \101\0""#), Some("café é 😀 A\0".into()));
        assert_eq!(decode_docstring(r#""bad \xZZ \q""#), Some(r"bad \xZZ \q".into()));
    }

    #[test]
    fn test_adjacent_literals_join() {
        assert_eq!(
            decode_concatenated_docstring(&["\"Adds \"", "'two numbers.'"]),
            Some("Adds two numbers.".into())
        );
        assert_eq!(decode_concatenated_docstring(&["\"a\"", "f\"{b}\""]), None);
        assert_eq!(decode_concatenated_docstring(&[]), None);
    }
}
