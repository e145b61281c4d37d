//! Outer-XML extraction for `FOR XML` results.

use crate::error::SqlFluentError;

fn malformed(what: &str) -> SqlFluentError {
    SqlFluentError::ExecutionError(format!("Malformed XML result: {what}"))
}

/// Byte offset just past `terminator`, searching from `from`.
fn find_end(doc: &str, from: usize, terminator: &str, what: &str) -> Result<usize, SqlFluentError> {
    doc[from..]
        .find(terminator)
        .map(|at| from + at + terminator.len())
        .ok_or_else(|| malformed(what))
}

/// Offset just past the `>` that closes the tag starting at `from`,
/// honouring quoted attribute values, plus whether the tag self-closes.
fn tag_end(doc: &str, from: usize) -> Result<(usize, bool), SqlFluentError> {
    let bytes = doc.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Ok((i + 1, i > from && bytes[i - 1] == b'/')),
            None => {}
        }
        i += 1;
    }
    Err(malformed("unterminated tag"))
}

/// End offset of the markup node starting at `start` (which holds `<`),
/// for everything except elements.
fn markup_end(doc: &str, start: usize) -> Result<Option<usize>, SqlFluentError> {
    let rest = &doc[start..];
    let end = if rest.starts_with("<!--") {
        find_end(doc, start + 4, "-->", "unterminated comment")?
    } else if rest.starts_with("<![CDATA[") {
        find_end(doc, start + 9, "]]>", "unterminated CDATA section")?
    } else if rest.starts_with("<?") {
        find_end(doc, start + 2, "?>", "unterminated processing instruction")?
    } else if rest.starts_with("<!") {
        tag_end(doc, start)?.0
    } else {
        return Ok(None);
    };
    Ok(Some(end))
}

fn element_end(doc: &str, start: usize) -> Result<usize, SqlFluentError> {
    let mut depth = 0_usize;
    let mut pos = start;
    loop {
        let open = doc[pos..]
            .find('<')
            .map(|at| pos + at)
            .ok_or_else(|| malformed("unclosed element"))?;
        if let Some(end) = markup_end(doc, open)? {
            pos = end;
            continue;
        }
        if doc[open..].starts_with("</") {
            pos = find_end(doc, open, ">", "unterminated end tag")?;
            depth = depth.checked_sub(1).ok_or_else(|| malformed("unexpected end tag"))?;
        } else {
            let (end, self_closing) = tag_end(doc, open)?;
            pos = end;
            if !self_closing {
                depth += 1;
            }
        }
        if depth == 0 {
            return Ok(pos);
        }
    }
}

fn is_declaration(doc: &str, start: usize) -> bool {
    let rest = &doc[start..];
    rest.starts_with("<?xml")
        && rest[5..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '?')
}

/// Outer XML of the first node of `doc`, skipping leading whitespace and
/// an XML declaration. `None` for an empty document.
///
/// # Errors
///
/// Returns `SqlFluentError::ExecutionError` when the first node is not
/// well formed.
pub fn first_outer_xml(doc: &str) -> Result<Option<String>, SqlFluentError> {
    let mut start = 0;
    loop {
        let trimmed = doc[start..].trim_start();
        start = doc.len() - trimmed.len();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if is_declaration(doc, start) {
            start = find_end(doc, start, "?>", "unterminated XML declaration")?;
            continue;
        }
        break;
    }

    if !doc[start..].starts_with('<') {
        let end = doc[start..].find('<').map_or(doc.len(), |at| start + at);
        return Ok(Some(doc[start..end].to_string()));
    }
    let end = match markup_end(doc, start)? {
        Some(end) => end,
        None => element_end(doc, start)?,
    };
    Ok(Some(doc[start..end].to_string()))
}
