use thiserror::Error;

/// 模型后端返回的错误类型。
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required vocabulary field `{0}`")]
    MissingRequiredVocabularyField(&'static str),
    #[error("invalid tokenizer document: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("end-of-sequence token encodes to no ids")]
    InvalidEosToken,
    #[error("begin-of-sequence token encodes to no ids")]
    InvalidBosToken,
    #[error("unsupported message role `{0}`, only system (leading), user and assistant are allowed")]
    UnsupportedMessageRole(String),
    #[error("model inference failed: {0}")]
    InferenceFailure(#[source] BoxError),
    #[error("model actor is not running")]
    ModelUnavailable,
    #[error("model returned an empty logits vector")]
    EmptyLogits,
    #[error("invalid generation parameters: {0}")]
    InvalidParameters(String),
}
