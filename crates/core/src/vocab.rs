//! Append-only vocabulary of byte chains.
//!
//! Every entry names the byte it adds and the entry it extends, so the
//! vocabulary is a forest: ids 0–255 are the byte roots and every later
//! entry points at a strictly smaller id. Ids are positions and never change.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::token::{Token, TokenId, NUM_BYTE_ROOTS, RECORD_LEN, ROOT};

/// Ordered token store with `(byte, parent)` lookup.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    tokens: Vec<Token>,
    /// First id holding each `(byte, parent)` pair.
    index: HashMap<Token, TokenId>,
}

impl Vocab {
    /// Empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary holding only the 256 byte roots.
    pub fn byte_level() -> Self {
        let mut vocab = Self::new();
        vocab.init_byte_level();
        vocab
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.index.clear();
    }

    /// Reset to exactly the 256 byte roots (`byte = id`, `parent = 0`).
    pub fn init_byte_level(&mut self) {
        self.clear();
        for byte in 0..=u8::MAX {
            self.push(Token::root(byte));
        }
        debug_assert_eq!(self.tokens.len(), NUM_BYTE_ROOTS);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, id: TokenId) -> Option<Token> {
        self.tokens.get(id as usize).copied()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether ids 0–255 are exactly the byte roots.
    pub fn has_byte_roots(&self) -> bool {
        self.tokens.len() >= NUM_BYTE_ROOTS
            && self.tokens[..NUM_BYTE_ROOTS]
                .iter()
                .enumerate()
                .all(|(id, &token)| token == Token::root(id as u8))
    }

    /// Append `(byte, parent)` and return its id.
    ///
    /// `parent` must be [`ROOT`] or an existing id, which keeps every parent
    /// strictly below the id of its child.
    pub fn add(&mut self, byte: u8, parent: TokenId) -> Result<TokenId> {
        if parent != ROOT && parent as usize >= self.tokens.len() {
            return Err(CoreError::InvalidParent {
                parent,
                len: self.tokens.len(),
            });
        }
        Ok(self.push(Token::new(byte, parent)))
    }

    /// First id whose entry is `(byte, parent)`.
    pub fn find(&self, byte: u8, parent: TokenId) -> Option<TokenId> {
        self.index.get(&Token::new(byte, parent)).copied()
    }

    fn push(&mut self, token: Token) -> TokenId {
        let id = self.tokens.len() as TokenId;
        self.tokens.push(token);
        self.index.entry(token).or_insert(id);
        id
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Write every entry as a 3-byte record, in id order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (id, token) in self.tokens.iter().enumerate() {
            let record = token.to_record().ok_or(CoreError::ParentOverflow {
                id,
                parent: token.parent,
            })?;
            writer.write_all(&record)?;
        }
        Ok(())
    }

    /// Replace the contents with records read until a short or empty read.
    ///
    /// A trailing partial record is end-of-stream, not an error. Entries whose
    /// parent does not precede them are rejected.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.clear();
        let mut record = [0u8; RECORD_LEN];
        loop {
            let filled = read_full(reader, &mut record)?;
            if filled < RECORD_LEN {
                if filled > 0 {
                    tracing::debug!(trailing = filled, "Ignoring partial vocabulary record");
                }
                break;
            }
            let token = Token::from_record(record);
            let id = self.tokens.len();
            if !token.is_root() && token.parent as usize >= id {
                return Err(CoreError::CorruptVocabulary(format!(
                    "token {id} has parent {}",
                    token.parent
                )));
            }
            self.push(token);
        }
        Ok(())
    }

    /// Append the vocabulary to `path`, creating the file if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a vocabulary file written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut vocab = Self::new();
        vocab.read_from(&mut reader)?;
        Ok(vocab)
    }
}

/// Read into `buf` until it is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl std::fmt::Display for Vocab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{{{token}}}")?;
        }
        f.write_str("]")
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
