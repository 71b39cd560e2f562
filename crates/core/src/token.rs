//! Vocabulary entries and their fixed 3-byte on-disk record.
//!
//! ```text
//! [byte: u8][parent: u16 native-endian]
//! ```
//!
//! No header, count or magic: a vocabulary file is just these records back
//! to back, in id order.

/// Position of a token in its vocabulary.
pub type TokenId = u32;

/// Parent value of the byte-level roots.
pub const ROOT: TokenId = 0;

/// Number of byte-level roots at the start of every vocabulary.
pub const NUM_BYTE_ROOTS: usize = 256;

/// Size of one serialized token.
pub const RECORD_LEN: usize = 3;

/// One vocabulary entry: the last byte of its text plus the token it extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub byte: u8,
    pub parent: TokenId,
}

impl Token {
    pub fn new(byte: u8, parent: TokenId) -> Self {
        Self { byte, parent }
    }

    /// Byte-level root for `byte`.
    pub fn root(byte: u8) -> Self {
        Self { byte, parent: ROOT }
    }

    pub fn is_root(&self) -> bool {
        self.parent == ROOT
    }

    /// Encode as a record. `None` when the parent exceeds `u16::MAX`.
    pub fn to_record(&self) -> Option<[u8; RECORD_LEN]> {
        let parent = u16::try_from(self.parent).ok()?.to_ne_bytes();
        Some([self.byte, parent[0], parent[1]])
    }

    pub fn from_record(record: [u8; RECORD_LEN]) -> Self {
        let parent = u16::from_ne_bytes([record[1], record[2]]);
        Self {
            byte: record[0],
            parent: TokenId::from(parent),
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.byte, self.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let rec = Token::new(b'x', 0x1234).to_record().unwrap();
        assert_eq!(rec[0], b'x');
        assert_eq!(&rec[1..], &0x1234u16.to_ne_bytes());
        assert_eq!(Token::from_record(rec), Token::new(b'x', 0x1234));
    }

    #[test]
    fn parent_must_fit_u16() {
        assert!(Token::new(0, 65_535).to_record().is_some());
        assert!(Token::new(0, 65_536).to_record().is_none());
    }
}
