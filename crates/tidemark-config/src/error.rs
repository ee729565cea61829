use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "スタックファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: stack.local.kdl, stack.kdl\n\
        - ./.tidemark/ ディレクトリ\n\
        - ~/.config/tidemark/stack.kdl\n\
        または TIDEMARK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound,

    #[error("TIDEMARK_CONFIG_PATH が存在しないファイルを指しています: {0}")]
    ConfigPathMissing(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
