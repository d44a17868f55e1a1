use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlamaError {
    #[error("failed to read")]
    Reader(#[from] std::io::Error),

    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error("unknown checkpoint format")]
    UnknownCheckpointFormat,

    #[error("unsupported checkpoint version {0}")]
    UnsupportedCheckpointVersion(u32),

    #[error("unknown model type {0:?}")]
    UnknownModelType(String),

    #[error("vocab entry is not valid utf-8")]
    Vocab(#[from] std::string::FromUtf8Error),

    #[error("unsupported vocab: expected {expected:?} at position {position} but found {found:?}")]
    UnsupportedVocab {
        expected: &'static str,
        found: String,
        position: usize,
    },

    #[error("failed to allocate storage for {0}")]
    KernelAlloc(&'static str),
}

pub type Result<T> = std::result::Result<T, LlamaError>;
