use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("{kind} '{name}' が重複して定義されています")]
    DuplicateResource { kind: String, name: String },

    #[error("{from} が未定義の {kind} '{name}' を参照しています")]
    UnknownReference {
        from: String,
        kind: String,
        name: String,
    },

    #[error(transparent)]
    Config(#[from] tidemark_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, StackError>;
