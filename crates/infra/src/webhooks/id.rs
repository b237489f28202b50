//! Top-level event id extraction from the raw body
//!
//! Ids can exceed what an `f64` holds exactly, so the digits are taken from
//! the wire text instead of a decoded number. Only the `id` key of the
//! outermost object counts; nested `id`s (recording, creator, bucket) are
//! ignored.

/// Text of the top-level `id` value
///
/// Strings are unescaped, numbers returned verbatim, `null` and other
/// values yield `None`. Expects syntactically valid JSON.
#[must_use]
pub fn extract_top_level_id(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let end = string_end(bytes, i)?;
                if depth == 1 {
                    let colon = skip_whitespace(bytes, end + 1);
                    if bytes.get(colon) == Some(&b':') && decode_string(&raw[i..=end]).as_deref() == Some("id") {
                        return scalar_at(raw, colon + 1);
                    }
                }
                i = end + 1;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    None
}

/// Index of the quote closing the string that opens at `start`
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn decode_string(quoted: &str) -> Option<String> {
    serde_json::from_str::<String>(quoted).ok()
}

fn scalar_at(raw: &str, pos: usize) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = skip_whitespace(bytes, pos);

    match bytes.get(start)? {
        b'"' => decode_string(&raw[start..=string_end(bytes, start)?]),
        b'-' | b'0'..=b'9' => {
            let len = bytes[start..]
                .iter()
                .position(|b| matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace())
                .unwrap_or(bytes.len() - start);
            Some(raw[start..start + len].to_string())
        }
        _ => None,
    }
}
