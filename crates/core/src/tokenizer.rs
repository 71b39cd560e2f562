//! Byte-chain tokenizer: merge training, greedy encoding, chain decoding.
//!
//! A merge only ever extends an existing chain by one raw byte, so every
//! token is a `(byte, parent)` pair and decoding is a walk to the root.
//!
//! Training picks the most frequent adjacent pair whose right side is a raw
//! byte. Ties go to the pair that occurs first in a left-to-right scan of the
//! current sequence, which makes training deterministic.

use std::collections::HashMap;
use std::path::Path;

use snake_common::TextCodec;

use crate::error::{CoreError, Result};
use crate::token::{Token, TokenId, NUM_BYTE_ROOTS, ROOT};
use crate::vocab::Vocab;

/// Outcome of one [`Tokenizer::train`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainReport {
    /// New tokens appended to the vocabulary.
    pub merges: usize,
    /// Merges that matched an existing token instead of adding one.
    pub reused: usize,
    /// Vocabulary size after training.
    pub vocab_size: usize,
    /// Length of the training sequence after the last merge.
    pub sequence_len: usize,
}

/// Tokenizer owning one vocabulary.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocab,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Byte-level tokenizer (256 roots, no merges).
    pub fn new() -> Self {
        Self {
            vocab: Vocab::byte_level(),
        }
    }

    pub fn from_vocab(vocab: Vocab) -> Self {
        Self { vocab }
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    // ── Training ────────────────────────────────────────────────────────────

    /// Learn merges from `text` until the vocabulary reaches `target_size`
    /// or no pair is left. `None` trains to exhaustion.
    ///
    /// The vocabulary must start with the 256 byte roots
    /// ([`CoreError::MissingByteRoots`] otherwise).
    pub fn train(&mut self, text: &str, target_size: Option<usize>) -> Result<TrainReport> {
        self.train_bytes(text.as_bytes(), target_size)
    }

    pub fn train_bytes(&mut self, data: &[u8], target_size: Option<usize>) -> Result<TrainReport> {
        self.train_bytes_with(data, target_size, |_, _| {})
    }

    /// [`train_bytes`](Self::train_bytes) with a callback after every merge,
    /// receiving the merged id and the new sequence length.
    pub fn train_bytes_with<F>(
        &mut self,
        data: &[u8],
        target_size: Option<usize>,
        mut on_merge: F,
    ) -> Result<TrainReport>
    where
        F: FnMut(TokenId, usize),
    {
        // The sequence starts as raw byte values, which are only ids if the roots are in place.
        if !self.vocab.has_byte_roots() {
            return Err(CoreError::MissingByteRoots {
                len: self.vocab.len(),
            });
        }
        let mut seq: Vec<TokenId> = data.iter().map(|&b| TokenId::from(b)).collect();
        let mut merges = 0;
        let mut reused = 0;

        loop {
            if target_size.is_some_and(|target| self.vocab.len() >= target) {
                break;
            }
            let Some((left, right)) = most_frequent_pair(&seq) else {
                break;
            };
            let byte = right as u8;
            let id = match self.vocab.find(byte, left) {
                Some(existing) => {
                    reused += 1;
                    existing
                }
                None => {
                    merges += 1;
                    self.vocab.add(byte, left)?
                }
            };
            seq = replace_pair(&seq, (left, right), id);
            tracing::debug!(left, right, id, len = seq.len(), "merge");
            on_merge(id, seq.len());
        }

        let report = TrainReport {
            merges,
            reused,
            vocab_size: self.vocab.len(),
            sequence_len: seq.len(),
        };
        tracing::info!(
            merges = report.merges,
            vocab_size = report.vocab_size,
            sequence_len = report.sequence_len,
            "Tokenizer trained"
        );
        Ok(report)
    }

    // ── Encode / decode ─────────────────────────────────────────────────────

    /// Try to grow `chain` by `byte`. With no chain, look up the byte's root.
    fn extend(&self, chain: Option<TokenId>, byte: u8) -> Option<TokenId> {
        match chain {
            None => self.vocab.find(byte, ROOT),
            // id 0 is the NUL root; a parent of 0 means "root", so it has no children.
            Some(ROOT) => None,
            Some(parent) => self.vocab.find(byte, parent),
        }
    }

    /// Greedy longest-chain encoding of the UTF-8 bytes of `text`.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        self.encode_bytes(text.as_bytes())
    }

    /// Greedy longest-chain encoding. Bytes without a root token are skipped.
    pub fn encode_bytes(&self, data: &[u8]) -> Vec<TokenId> {
        let mut ids = Vec::new();
        let mut chain: Option<TokenId> = None;
        let mut skipped = 0usize;

        for &byte in data {
            if let Some(next) = self.extend(chain, byte) {
                chain = Some(next);
                continue;
            }
            if let Some(id) = chain.take() {
                ids.push(id);
            }
            match self.extend(None, byte) {
                Some(root) => chain = Some(root),
                None => skipped += 1,
            }
        }
        if let Some(id) = chain {
            ids.push(id);
        }
        if skipped > 0 {
            tracing::warn!(skipped, "Dropped bytes with no root token in the vocabulary");
        }
        ids
    }

    /// Bytes spelled by `ids`, in order.
    pub fn decode_bytes(&self, ids: &[TokenId]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ids.len());
        let mut chain = Vec::new();
        for &id in ids {
            chain.clear();
            self.walk_chain(id, &mut chain)?;
            out.extend(chain.iter().rev());
        }
        Ok(out)
    }

    /// Decode to text; invalid UTF-8 is replaced.
    pub fn decode(&self, ids: &[TokenId]) -> Result<String> {
        let bytes = self.decode_bytes(ids)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Push the bytes of `id` leaf-first into `out`.
    fn walk_chain(&self, id: TokenId, out: &mut Vec<u8>) -> Result<()> {
        let mut current = id;
        loop {
            let token = self.vocab.get(current).ok_or_else(|| {
                CoreError::CorruptVocabulary(format!("unknown token id {current}"))
            })?;
            out.push(token.byte);
            if token.is_root() {
                return Ok(());
            }
            if token.parent >= current {
                return Err(CoreError::CorruptVocabulary(format!(
                    "token {current} has parent {}",
                    token.parent
                )));
            }
            current = token.parent;
        }
    }

    // ── Special tokens ──────────────────────────────────────────────────────

    /// Insert `text` as a chain, reusing any existing prefix; returns its id.
    pub fn add_special_token(&mut self, text: &str) -> Result<TokenId> {
        let mut chain: Option<TokenId> = None;
        for byte in text.bytes() {
            if let Some(next) = self.extend(chain, byte) {
                chain = Some(next);
                continue;
            }
            let parent = match chain {
                None => ROOT,
                Some(ROOT) => return Err(CoreError::InvalidSpecialToken(text.to_string())),
                Some(parent) => parent,
            };
            chain = Some(self.vocab.add(byte, parent)?);
        }
        chain.ok_or_else(|| CoreError::InvalidSpecialToken(text.to_string()))
    }

    pub fn add_special_tokens<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<TokenId>> {
        texts
            .iter()
            .map(|t| self.add_special_token(t.as_ref()))
            .collect()
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Append the vocabulary to `path` (see [`Vocab::save`]).
    pub fn save(&self, path: &Path) -> Result<()> {
        self.vocab.save(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_vocab(Vocab::load(path)?))
    }
}

impl std::fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.vocab.fmt(f)
    }
}

impl TextCodec for Tokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        Tokenizer::encode(self, text)
    }

    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        Ok(Tokenizer::decode(self, ids)?)
    }

    fn vocab_size(&self) -> usize {
        self.len()
    }
}

// ── Training helpers ────────────────────────────────────────────────────────

/// Most frequent adjacent pair `(a, b)` with `b` a raw byte and `a` not the
/// NUL root. Ties resolve to the leftmost first occurrence.
fn most_frequent_pair(seq: &[TokenId]) -> Option<(TokenId, TokenId)> {
    // pair -> (count, first position)
    let mut counts: HashMap<(TokenId, TokenId), (usize, usize)> = HashMap::new();
    for (pos, w) in seq.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        if a == ROOT || b as usize >= NUM_BYTE_ROOTS {
            continue;
        }
        counts.entry((a, b)).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(pair, _)| pair)
}

/// Replace non-overlapping left-to-right occurrences of `pair` with `id`.
fn replace_pair(seq: &[TokenId], pair: (TokenId, TokenId), id: TokenId) -> Vec<TokenId> {
    let mut out = Vec::with_capacity(seq.len());
    let mut i = 0;
    while i < seq.len() {
        if i + 1 < seq.len() && seq[i] == pair.0 && seq[i + 1] == pair.1 {
            out.push(id);
            i += 2;
        } else {
            out.push(seq[i]);
            i += 1;
        }
    }
    out
}

// ── Tests ───────────────────────────────────────────────────────────────────
