use crate::vocab::Vocab;
use crate::{LlamaError, Result};

/// Reserved token ids at the head of every supported vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialToken {
    Unk = 0,
    Bos = 1,
    Eos = 2,
}

/// Token ids for raw bytes start here: byte `b` maps to id `b + 3`.
pub const BYTE_FALLBACK_BASE: usize = 3;

const RESERVED_TOKENS: [&str; 5] = ["<unk>", "<s>", "</s>", "<0x00>", "<0x01>"];

pub struct Tokenizer {
    vocab: Vocab,
}

impl Tokenizer {
    /// Fails, naming the expected and found tokens, unless the first five
    /// vocabulary entries are exactly `<unk>`, `<s>`, `</s>`, `<0x00>`,
    /// `<0x01>`.
    pub fn new(vocab: Vocab) -> Result<Self> {
        for (position, &expected) in RESERVED_TOKENS.iter().enumerate() {
            let found = vocab
                .get(position)
                .map(|entry| entry.token.as_str())
                .unwrap_or_default();

            if found != expected {
                return Err(LlamaError::UnsupportedVocab {
                    expected,
                    found: found.to_string(),
                    position,
                });
            }
        }

        Ok(Self { vocab })
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Segments `text` into token ids.
    ///
    /// A single space is prepended to the raw text before segmenting,
    /// matching the training-time convention of treating text as following a
    /// word boundary. Code points missing from the vocabulary fall back to
    /// their UTF-8 bytes. Adjacent pairs are then merged greedily: each round
    /// replaces the pair whose concatenation scores strictly highest, the
    /// earliest such pair winning ties.
    pub fn encode(&self, text: &str, bos: bool, eos: bool) -> Vec<usize> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut token_ids = Vec::new();

        if bos {
            token_ids.push(SpecialToken::Bos as usize);
        }

        let mut utf8 = [0u8; 4];

        for ch in format!(" {text}").chars() {
            let token = ch.encode_utf8(&mut utf8);

            match self.vocab.lookup(token) {
                Some(entry) => token_ids.push(entry.token_id),
                None => {
                    for &byte in token.as_bytes() {
                        token_ids.push(byte as usize + BYTE_FALLBACK_BASE);
                    }
                }
            }
        }

        if eos {
            token_ids.push(SpecialToken::Eos as usize);
        }

        loop {
            let mut best: Option<(usize, usize, f32)> = None;

            for index in 0..token_ids.len().saturating_sub(1) {
                let (Some(left), Some(right)) = (
                    self.vocab.get(token_ids[index]),
                    self.vocab.get(token_ids[index + 1]),
                ) else {
                    continue;
                };

                let Some(merged) = self.vocab.lookup(&format!("{}{}", left.token, right.token))
                else {
                    continue;
                };

                if best.map_or(true, |(_, _, score)| merged.score > score) {
                    best = Some((index, merged.token_id, merged.score));
                }
            }

            let Some((index, token_id, _)) = best else {
                break;
            };

            token_ids[index] = token_id;
            token_ids.remove(index + 1);
        }

        token_ids
    }

    /// Renders a token id, or `None` for the unk/bos/eos ids.
    ///
    /// Following the bos token, one leading space is stripped. `<0xHH>` byte
    /// escapes fold back to their literal character when printable or
    /// whitespace; anything else stays escaped.
    pub fn decode(&self, token_id: usize, prev_token_id: usize) -> Option<String> {
        if token_id == SpecialToken::Unk as usize
            || token_id == SpecialToken::Bos as usize
            || token_id == SpecialToken::Eos as usize
        {
            return None;
        }

        let token = self.vocab.get(token_id)?.token.as_str();

        let token = if prev_token_id == SpecialToken::Bos as usize {
            token.strip_prefix(' ').unwrap_or(token)
        } else {
            token
        };

        Some(format_token(token))
    }
}

fn format_token(token: &str) -> String {
    if let Some(code) = parse_byte_escape(token) {
        if is_printable(code) || is_whitespace(code) {
            return char::from(code).to_string();
        }
    }

    token.to_string()
}

fn parse_byte_escape(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;

    if hex.len() != 2 || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }

    u8::from_str_radix(hex, 16).ok()
}

fn is_printable(code: u8) -> bool {
    (0x20..=0x7e).contains(&code)
}

fn is_whitespace(code: u8) -> bool {
    matches!(code, 0x09..=0x0d | 0xa0)
}
