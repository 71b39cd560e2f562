//! Character-level fallback used when no trained vocabulary is supplied.
//!
//! One id per ASCII byte; anything outside ASCII is dropped on both encode
//! and decode.

use snake_common::TextCodec;

use crate::token::{TokenId, NUM_BYTE_ROOTS};

#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn vocab_size(&self) -> usize {
        NUM_BYTE_ROOTS
    }

    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        text.bytes()
            .filter(u8::is_ascii)
            .map(TokenId::from)
            .collect()
    }

    pub fn decode(&self, ids: &[TokenId]) -> String {
        ids.iter()
            .filter_map(|&id| u8::try_from(id).ok())
            .filter(u8::is_ascii)
            .map(char::from)
            .collect()
    }
}

impl TextCodec for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        ByteTokenizer::encode(self, text)
    }

    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        Ok(ByteTokenizer::decode(self, ids))
    }

    fn vocab_size(&self) -> usize {
        ByteTokenizer::vocab_size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_ascii() {
        let tok = ByteTokenizer::new();
        assert_eq!(tok.encode("Aé!"), vec![65, 33]);
        assert_eq!(tok.decode(&[72, 200, 105, 4000]), "Hi");
    }

    #[test]
    fn ascii_round_trip() {
        let tok = ByteTokenizer::new();
        let text = "One day, a little girl named Lily.";
        assert_eq!(tok.decode(&tok.encode(text)), text);
        assert_eq!(TextCodec::vocab_size(&tok), 256);
    }
}
