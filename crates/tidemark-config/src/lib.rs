pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// スタックファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "TIDEMARK_CONFIG_PATH";

/// プロジェクトローカルの設定ディレクトリ名
pub const PROJECT_DIR: &str = ".tidemark";

/// 検索するファイル名（優先順）
pub const STACK_FILE_CANDIDATES: [&str; 2] = ["stack.local.kdl", "stack.kdl"];

/// tidemarkのグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("tidemark");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのstack.kdlファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 TIDEMARK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, stack.kdl
/// 3. ./.tidemark/ ディレクトリ内: 同様の順序
/// 4. ~/.config/tidemark/stack.kdl (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定。指定先が無い場合は他を探さずにエラー
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathMissing(config_path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_stack_file_in(&current_dir) {
        return Ok(path);
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("tidemark").join("stack.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// `dir` と `dir/.tidemark/` の中からスタックファイルを探す
pub fn find_stack_file_in(dir: &Path) -> Option<PathBuf> {
    let search_dirs = [dir.to_path_buf(), dir.join(PROJECT_DIR)];

    for search_dir in search_dirs.iter().filter(|d| d.is_dir()) {
        for filename in &STACK_FILE_CANDIDATES {
            let path = search_dir.join(filename);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    None
}
