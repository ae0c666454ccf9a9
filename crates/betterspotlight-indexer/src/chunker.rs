//! Plain-text chunking: fixed byte budget with boundary-aware splits.

use betterspotlight_domain::entities::Chunk;

/// Split `text` into chunks of roughly `chunk_size_bytes`, breaking at a
/// newline (preferred) or space inside the last quarter of the window so
/// sentences survive. Chunk ids derive from `path` and the chunk index.
#[must_use]
pub fn chunk_text(path: &str, text: &str, chunk_size_bytes: usize) -> Vec<Chunk> {
    let budget = chunk_size_bytes.max(256);
    let mut chunks = Vec::new();
    let mut rest = text;
    let mut index: i32 = 0;

    while !rest.is_empty() {
        if rest.len() <= budget {
            push_chunk(&mut chunks, path, index, rest);
            break;
        }

        // Largest char boundary within budget.
        let mut cut = budget;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let floor = cut.saturating_sub(budget / 4);
        let boundary = window
            .rfind('\n')
            .filter(|i| *i > floor)
            .or_else(|| window.rfind(' ').filter(|i| *i > floor))
            .map_or(cut, |i| i + 1);

        push_chunk(&mut chunks, path, index, &rest[..boundary]);
        index += 1;
        rest = &rest[boundary..];
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, path: &str, index: i32, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(Chunk::new(path, index, trimmed.to_owned()));
    }
}
