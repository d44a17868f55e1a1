use std::collections::HashMap;

use crate::source::{ChunkStream, DataSource};
use crate::{LlamaError, Result};

/// The SentencePiece word-boundary marker, replaced by an ordinary space on
/// load.
const WORD_BOUNDARY: char = '\u{2581}';

#[derive(Debug)]
pub struct VocabEntry {
    pub token_id: usize,
    pub token: String,
    pub score: f32,
}

/// Ordered vocabulary entries plus a reverse token-string lookup. Built once
/// at load time, immutable afterwards.
pub struct Vocab {
    entries: Vec<VocabEntry>,
    ids_by_token: HashMap<String, usize>,
}

impl Vocab {
    pub fn new(tokens: impl IntoIterator<Item = (String, f32)>) -> Self {
        let mut entries = Vec::new();
        let mut ids_by_token = HashMap::new();

        for (token_id, (token, score)) in tokens.into_iter().enumerate() {
            // duplicate token strings resolve to the last entry
            ids_by_token.insert(token.clone(), token_id);
            entries.push(VocabEntry {
                token_id,
                token,
                score,
            });
        }

        Self {
            entries,
            ids_by_token,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token_id: usize) -> Option<&VocabEntry> {
        self.entries.get(token_id)
    }

    pub fn lookup(&self, token: &str) -> Option<&VocabEntry> {
        self.ids_by_token.get(token).map(|&id| &self.entries[id])
    }
}

/// Reads `vocab_size` entries: per entry an f32 score, an i32 token byte
/// length, and that many raw UTF-8 bytes.
pub fn load_vocab<S: ChunkStream>(
    source: &mut DataSource<S>,
    vocab_size: usize,
) -> Result<Vocab> {
    let mut tokens = Vec::with_capacity(vocab_size);
    let mut buf = [0u8; 4];

    for _ in 0..vocab_size {
        source.request(&mut buf)?;
        let score = f32::from_le_bytes(buf);

        source.request(&mut buf)?;
        let Ok(token_length) = usize::try_from(i32::from_le_bytes(buf)) else {
            return Err(LlamaError::UnknownCheckpointFormat);
        };

        let mut token_bytes = vec![0; token_length];
        source.request(&mut token_bytes)?;

        let token = String::from_utf8(token_bytes)?.replace(WORD_BOUNDARY, " ");
        tokens.push((token, score));
    }

    Ok(Vocab::new(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn serialize(entries: &[(&str, f32)]) -> Vec<u8> {
        let mut bytes = Vec::new();

        for (token, score) in entries {
            bytes.extend_from_slice(&score.to_le_bytes());
            bytes.extend_from_slice(&(token.len() as i32).to_le_bytes());
            bytes.extend_from_slice(token.as_bytes());
        }

        bytes
    }

    fn load(entries: &[(&str, f32)]) -> Result<Vocab> {
        let bytes = serialize(entries);
        let chunks: VecDeque<Vec<u8>> = bytes.chunks(3).map(<[u8]>::to_vec).collect();
        load_vocab(&mut DataSource::new(chunks), entries.len())
    }

    #[test]
    fn loads_entries_in_token_id_order() {
        let vocab = load(&[("<unk>", 0.0), ("\u{2581}the", -1.5), ("s", -2.0)]).unwrap();

        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.get(0).unwrap().token, "<unk>");
        assert_eq!(vocab.get(1).unwrap().token, " the");
        assert_eq!(vocab.get(1).unwrap().score, -1.5);
        assert_eq!(vocab.lookup(" the").unwrap().token_id, 1);
        assert!(vocab.lookup("\u{2581}the").is_none());
    }

    #[test]
    fn duplicate_tokens_resolve_to_the_last_entry() {
        let vocab = load(&[("a", 0.0), ("a", 1.0)]).unwrap();

        assert_eq!(vocab.lookup("a").unwrap().token_id, 1);
    }

    #[test]
    fn truncated_vocab_fails() {
        let mut bytes = serialize(&[("ab", 0.5)]);
        bytes.truncate(bytes.len() - 1);

        let chunks: VecDeque<Vec<u8>> = VecDeque::from([bytes]);
        assert!(matches!(
            load_vocab(&mut DataSource::new(chunks), 1),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
    }
}
