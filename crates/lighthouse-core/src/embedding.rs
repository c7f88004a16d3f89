//! Demo text embedding for the semantic index.
//!
//! Bag-of-code-points: lowercase the input, then add 1.0 at
//! `code_point % dim` for every character. Only for demo purposes — in
//! production you'd plug a real embedding model behind the same two
//! entry points. The one property the registry relies on is bit-identical
//! output between the registration and query paths.

use crate::protocol::ServiceCard;

/// Dimension used when a card does not carry its own vector.
pub const EMBEDDING_DIM: usize = 64;

/// Embed arbitrary text into a `dim`-length vector.
pub fn embed_text(text: &str, dim: usize) -> Vec<f32> {
    let dim = if dim == 0 { EMBEDDING_DIM } else { dim };
    let mut vec = vec![0.0f32; dim];
    for ch in text.to_lowercase().chars() {
        vec[(ch as usize) % dim] += 1.0;
    }
    vec
}

/// Embed a service card: name, description, and space-joined tags.
pub fn embed_card(card: &ServiceCard) -> Vec<f32> {
    let mut parts = vec![card.name.clone(), card.description.clone()];
    if let Some(tags) = &card.tags {
        if !tags.is_empty() {
            parts.push(tags.join(" "));
        }
    }
    embed_text(&parts.join(" "), EMBEDDING_DIM)
}

/// Embed a search query. Must stay in lockstep with [`embed_card`].
pub fn embed_query(query: &str) -> Vec<f32> {
    embed_text(query, EMBEDDING_DIM)
}
