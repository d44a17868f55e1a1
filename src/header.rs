use std::io::Read;

use crate::source::{ChunkStream, DataSource};
use crate::{LlamaError, Result};

/// Magic constant opening a fixed-layout checkpoint header.
pub const CHECKPOINT_MAGIC: u32 = 0x616b3432;

const HEADER_SIZE: usize = 256;
const MODEL_TYPE_LLAMA: &str = "llama";

/// Model shape read from a checkpoint header.
///
/// Derived quantities (head size, key/value projection width) are recomputed
/// from these fields wherever they are needed and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hyperparams {
    pub embedding_size: usize,
    pub hidden_size: usize,
    pub layer_count: usize,
    pub query_head_count: usize,
    pub key_value_head_count: usize,
    pub vocab_size: usize,
    pub max_sequence_length: usize,
    pub shared_output_weight: bool,
}

impl Hyperparams {
    pub fn head_size(&self) -> usize {
        self.embedding_size / self.query_head_count
    }

    /// Width of the key and value projections.
    pub fn key_value_size(&self) -> usize {
        self.key_value_head_count * self.head_size()
    }
}

/// The two checkpoint header generations. Both carry the same hyperparameter
/// record; they differ only in how the file identifies itself.
#[derive(Debug)]
pub enum Header {
    /// Fixed-layout header opening with [`CHECKPOINT_MAGIC`].
    Ak42(Hyperparams),
    /// Self-describing header: version byte plus a length-prefixed model
    /// type. Only the `llama` model type is recognized.
    ModelTagged {
        model_type: String,
        hyperparams: Hyperparams,
    },
}

impl Header {
    /// Reads and validates the fixed 256-byte header. Bytes beyond the
    /// parsed fields are reserved and ignored.
    pub fn from_source<S: ChunkStream>(source: &mut DataSource<S>) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        source.request(&mut header)?;
        Self::parse(&header)
    }

    fn parse(header: &[u8; HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

        if magic == CHECKPOINT_MAGIC {
            return Self::parse_ak42(&header[4..]);
        }

        Self::parse_model_tagged(header[0], &header[1..])
    }

    fn parse_ak42(mut rest: &[u8]) -> Result<Self> {
        let version = read_u32(&mut rest)?;

        if version != 1 {
            return Err(LlamaError::UnsupportedCheckpointVersion(version));
        }

        Ok(Self::Ak42(Hyperparams {
            embedding_size: read_i32(&mut rest)? as usize,
            hidden_size: read_i32(&mut rest)? as usize,
            layer_count: read_i32(&mut rest)? as usize,
            query_head_count: read_i32(&mut rest)? as usize,
            key_value_head_count: read_i32(&mut rest)? as usize,
            vocab_size: read_i32(&mut rest)? as usize,
            max_sequence_length: read_i32(&mut rest)? as usize,
            shared_output_weight: read_u8(&mut rest)? == 1,
        }))
    }

    fn parse_model_tagged(version: u8, mut rest: &[u8]) -> Result<Self> {
        let Ok(model_type_len) = usize::try_from(read_i32(&mut rest)?) else {
            return Err(LlamaError::UnknownCheckpointFormat);
        };

        // the tag plus the seven fields and the shared flag must fit
        if model_type_len > rest.len().saturating_sub(7 * 4 + 1) {
            return Err(LlamaError::UnknownCheckpointFormat);
        }

        let (tag, mut rest) = rest.split_at(model_type_len);

        let Ok(model_type) = std::str::from_utf8(tag) else {
            return Err(LlamaError::UnknownCheckpointFormat);
        };

        match (version, model_type) {
            (1, MODEL_TYPE_LLAMA) => {
                let embedding_size = read_i32(&mut rest)? as usize;
                let hidden_size = read_i32(&mut rest)? as usize;
                let max_sequence_length = read_i32(&mut rest)? as usize;
                let vocab_size = read_i32(&mut rest)? as usize;
                let layer_count = read_i32(&mut rest)? as usize;
                let query_head_count = read_i32(&mut rest)? as usize;
                let key_value_head_count = read_i32(&mut rest)? as usize;
                let shared_output_weight = read_u8(&mut rest)? == 1;

                Ok(Self::ModelTagged {
                    model_type: model_type.to_string(),
                    hyperparams: Hyperparams {
                        embedding_size,
                        hidden_size,
                        layer_count,
                        query_head_count,
                        key_value_head_count,
                        vocab_size,
                        max_sequence_length,
                        shared_output_weight,
                    },
                })
            }
            (_, MODEL_TYPE_LLAMA) => Err(LlamaError::UnsupportedCheckpointVersion(version.into())),
            (1, _) => Err(LlamaError::UnknownModelType(model_type.to_string())),
            _ => Err(LlamaError::UnknownCheckpointFormat),
        }
    }

    pub fn hyperparams(&self) -> &Hyperparams {
        match self {
            Self::Ak42(hyperparams) => hyperparams,
            Self::ModelTagged { hyperparams, .. } => hyperparams,
        }
    }
}

fn read_u8(r: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn hyperparams() -> Hyperparams {
        Hyperparams {
            embedding_size: 288,
            hidden_size: 768,
            layer_count: 6,
            query_head_count: 6,
            key_value_head_count: 6,
            vocab_size: 32000,
            max_sequence_length: 256,
            shared_output_weight: true,
        }
    }

    fn ak42_header(hyperparams: &Hyperparams, version: u32) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&CHECKPOINT_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&version.to_le_bytes());

        let fields = [
            hyperparams.embedding_size,
            hyperparams.hidden_size,
            hyperparams.layer_count,
            hyperparams.query_head_count,
            hyperparams.key_value_head_count,
            hyperparams.vocab_size,
            hyperparams.max_sequence_length,
        ];

        for (index, field) in fields.iter().enumerate() {
            let offset = 8 + index * 4;
            header[offset..offset + 4].copy_from_slice(&(*field as i32).to_le_bytes());
        }

        header[36] = hyperparams.shared_output_weight as u8;
        header
    }

    fn model_tagged_header(
        hyperparams: &Hyperparams,
        version: u8,
        model_type: &str,
    ) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = version;
        header[1..5].copy_from_slice(&(model_type.len() as i32).to_le_bytes());
        header[5..5 + model_type.len()].copy_from_slice(model_type.as_bytes());

        let fields = [
            hyperparams.embedding_size,
            hyperparams.hidden_size,
            hyperparams.max_sequence_length,
            hyperparams.vocab_size,
            hyperparams.layer_count,
            hyperparams.query_head_count,
            hyperparams.key_value_head_count,
        ];

        let mut offset = 5 + model_type.len();

        for field in fields {
            header[offset..offset + 4].copy_from_slice(&(field as i32).to_le_bytes());
            offset += 4;
        }

        header[offset] = hyperparams.shared_output_weight as u8;
        header
    }

    fn parse(header: [u8; HEADER_SIZE]) -> Result<Header> {
        let chunks: VecDeque<Vec<u8>> = VecDeque::from([header.to_vec()]);
        Header::from_source(&mut DataSource::new(chunks))
    }

    #[test]
    fn parses_ak42_header() {
        let header = parse(ak42_header(&hyperparams(), 1)).unwrap();

        assert!(matches!(header, Header::Ak42(_)));
        assert_eq!(*header.hyperparams(), hyperparams());
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut header = ak42_header(&hyperparams(), 1);
        header[0..4].copy_from_slice(&0xdeadbeefu32.to_le_bytes());

        assert!(matches!(
            parse(header),
            Err(LlamaError::UnknownCheckpointFormat)
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let header = ak42_header(&hyperparams(), 2);

        assert!(matches!(
            parse(header),
            Err(LlamaError::UnsupportedCheckpointVersion(2))
        ));
    }

    #[test]
    fn parses_model_tagged_header() {
        let header = parse(model_tagged_header(&hyperparams(), 1, "llama")).unwrap();

        assert!(matches!(header, Header::ModelTagged { .. }));
        assert_eq!(*header.hyperparams(), hyperparams());
    }

    #[test]
    fn rejects_unknown_model_type() {
        assert!(matches!(
            parse(model_tagged_header(&hyperparams(), 1, "gpt2")),
            Err(LlamaError::UnknownModelType(model_type)) if model_type == "gpt2"
        ));
    }

    #[test]
    fn rejects_unsupported_tagged_version() {
        assert!(matches!(
            parse(model_tagged_header(&hyperparams(), 3, "llama")),
            Err(LlamaError::UnsupportedCheckpointVersion(3))
        ));
    }

    #[test]
    fn ignores_reserved_trailing_bytes() {
        let mut header = ak42_header(&hyperparams(), 1);
        header[64..].fill(0xff);

        assert_eq!(*parse(header).unwrap().hyperparams(), hyperparams());
    }

    #[test]
    fn derived_quantities() {
        let hyperparams = Hyperparams {
            query_head_count: 8,
            key_value_head_count: 2,
            embedding_size: 64,
            ..hyperparams()
        };

        assert_eq!(hyperparams.head_size(), 8);
        assert_eq!(hyperparams.key_value_size(), 16);
    }
}
