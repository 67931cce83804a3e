//! JSON-with-comments normalization.
//!
//! Strips `//` line comments, `/* */` block comments and trailing commas
//! before handing the text to `serde_json`. String literals are copied
//! verbatim, including escaped quotes.

use serde_json::Value;

use crate::error::{Error, Result};

/// Parses JSON-with-comments text into a JSON value.
///
/// # Errors
///
/// Returns a validation error on an unterminated block comment or if the
/// stripped text is not valid JSON.
///
/// # Examples
///
/// ```
/// use flagvault::jsonc;
/// use serde_json::json;
///
/// let value = jsonc::parse("{ /* flag */ \"enabled\": true, // on\n }").unwrap();
/// assert_eq!(value, json!({"enabled": true}));
/// ```
pub fn parse(text: &str) -> Result<Value> {
    let stripped = strip(text)?;
    serde_json::from_str(&stripped)
        .map_err(|e| Error::validation("value", format!("Invalid JSON: {e}")))
}

/// Returns `text` with comments and trailing commas removed.
///
/// # Errors
///
/// Returns a validation error on an unterminated block comment.
pub fn strip(text: &str) -> Result<String> {
    let without_comments = strip_comments(text)?;
    Ok(strip_trailing_commas(&without_comments))
}

fn strip_comments(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                copy_string(&mut chars, &mut out);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        closed = true;
                        break;
                    }
                    prev = next;
                }
                if !closed {
                    return Err(Error::validation("value", "Unterminated block comment"));
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                copy_string(&mut chars, &mut out);
            }
            ',' => {
                let next = chars.clone().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Copies the remainder of a string literal whose opening quote was already
/// consumed.
fn copy_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    let mut escaped = false;
    for c in chars.by_ref() {
        out.push(c);
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            break;
        }
    }
}
