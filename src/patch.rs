//! Targeted, format-preserving edits of a manifest's `revision` fields.
//!
//! Manifests are maintained by hand, so an automatic update must leave
//! every byte it does not own untouched: comments, quoting style, spacing
//! and line endings all survive. Only single string literals are edited;
//! a revision spelled as concatenated literals is left for a human.

use std::path::Path;

use crate::error::{Error, Result};
use crate::literal::{self, MapNode, Node, Value};

pub const BADLY_FORMATTED_LINE_ERR: &str = "badly formatted line for automatic update";

/// Point the dependency called `dependency_name` at `new_revision`.
///
/// Returns the complete new text. On any failure nothing is returned, so a
/// caller can never persist a half-edited manifest.
pub fn patch(text: &str, dependency_name: &str, new_revision: &str) -> Result<String> {
    let root = literal::parse(text)?;
    let root = root
        .as_ref()
        .and_then(Value::as_map)
        .ok_or_else(|| Error::patch_format("expression was not a mapping"))?;

    let dependencies = root
        .get("dependencies")
        .and_then(Value::as_seq)
        .ok_or_else(|| Error::patch_format("could not find dependencies list"))?;

    // Last match wins, mirroring how a reader scanning the file top to
    // bottom would see the entry.
    let target = dependencies
        .iter()
        .filter_map(Value::as_map)
        .filter(|dep| dep.get("name").and_then(Value::as_str) == Some(dependency_name))
        .last()
        .ok_or_else(|| Error::patch_format("could not find target dependency"))?;

    match target.get("revision") {
        Some(revision) => replace_revision(text, revision, new_revision),
        None => insert_revision(text, target, new_revision),
    }
}

/// Apply [`patch`] to a file on disk, writing it back only when the text
/// changed. Returns whether the file was rewritten.
pub fn patch_file(
    path: impl AsRef<Path>,
    dependency_name: &str,
    new_revision: &str,
) -> Result<bool> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let new_text = patch(&text, dependency_name, new_revision)?;
    if new_text == text {
        return Ok(false);
    }
    std::fs::write(path, new_text).map_err(|e| Error::io(path, e))?;
    Ok(true)
}

/// The line ending used by a strict majority of lines, else `\n`.
pub fn detect_line_ending(text: &str) -> &'static str {
    let mut lines = 0;
    let mut crlf = 0;
    for line in text.split_inclusive('\n') {
        lines += 1;
        if line.ends_with("\r\n") {
            crlf += 1;
        }
    }
    if crlf * 2 > lines {
        "\r\n"
    } else {
        "\n"
    }
}

fn replace_revision(text: &str, revision: &Value, new_revision: &str) -> Result<String> {
    let Node::Str {
        pieces: 1,
        content,
        quote,
        raw,
        ..
    } = &revision.node
    else {
        return Err(Error::patch_format(BADLY_FORMATTED_LINE_ERR));
    };

    check_embeddable(new_revision, quote, *raw)?;

    let mut out = String::with_capacity(text.len() + new_revision.len());
    out.push_str(&text[..content.start]);
    out.push_str(new_revision);
    out.push_str(&text[content.end..]);
    Ok(out)
}

fn insert_revision(text: &str, target: &MapNode, new_revision: &str) -> Result<String> {
    let (last_key, last_value) = target
        .entries
        .last()
        .ok_or_else(|| Error::patch_format(BADLY_FORMATTED_LINE_ERR))?;
    if !last_value.is_single_string_literal() {
        return Err(Error::patch_format(BADLY_FORMATTED_LINE_ERR));
    }
    check_embeddable(new_revision, "\"", false)?;

    // The token right before the closing brace: the trailing comma if the
    // entry has one, otherwise the last value itself.
    let (prev_end, add_comma) = match target.trailing_comma {
        Some(comma) => (comma + 1, false),
        None => (last_value.span.end, true),
    };
    let insertion = format!("\"revision\": \"{}\",", new_revision);
    let same_line = !text[prev_end..target.close].contains('\n');

    let mut out = String::with_capacity(text.len() + insertion.len() + 16);
    out.push_str(&text[..prev_end]);
    if add_comma {
        out.push(',');
    }

    if same_line {
        let spaced = text[prev_end..]
            .chars()
            .next()
            .map(char::is_whitespace)
            .unwrap_or(false);
        out.push(' ');
        out.push_str(&insertion);
        if !spaced {
            out.push(' ');
        }
        out.push_str(&text[prev_end..]);
    } else {
        // Keep whatever follows the previous token on its line (comments
        // included), then add the new key on a line of its own.
        let line_end = text[prev_end..]
            .find('\n')
            .map(|i| prev_end + i + 1)
            .unwrap_or(text.len());
        out.push_str(&text[prev_end..line_end]);
        out.push_str(&" ".repeat(column_of(text, last_key.span.start)));
        out.push_str(&insertion);
        out.push_str(detect_line_ending(text));
        out.push_str(&text[line_end..]);
    }

    Ok(out)
}

fn column_of(text: &str, offset: usize) -> usize {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    text[line_start..offset].chars().count()
}

fn check_embeddable(new_revision: &str, quote: &str, raw: bool) -> Result<()> {
    let quote_char = quote.chars().next().unwrap_or('"');
    let bad = new_revision
        .chars()
        .any(|c| c == quote_char || c == '\n' || c == '\r' || (c == '\\' && !raw))
        || (raw && new_revision.ends_with('\\'));
    if bad {
        return Err(Error::patch_format(format!(
            "revision '{}' cannot be written into the existing string literal",
            new_revision
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
