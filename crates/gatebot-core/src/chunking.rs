/// Split `text` into consecutive slices of at most `limit` characters.
///
/// Slicing is fixed-size and ignores word boundaries; it never cuts inside a
/// UTF-8 code point. Empty input yields no chunks. A `limit` of zero is
/// treated as one.
pub fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;

    for (idx, _) in text.char_indices() {
        if count == limit {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
