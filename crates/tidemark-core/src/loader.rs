//! 統合ローダー
//!
//! ファイル発見とパースを統合

use crate::error::Result;
use crate::model::Stack;
use crate::parser::parse_stack_file;
use std::path::Path;
use tracing::{info, instrument};

/// 発見ルールに従ってスタックファイルを探し、ロードする
#[instrument]
pub fn load_discovered_stack() -> Result<Stack> {
    let path = tidemark_config::find_stack_file()?;
    load_stack(&path)
}

/// 指定されたスタックファイルをロード
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_stack(path: impl AsRef<Path>) -> Result<Stack> {
    let stack = parse_stack_file(path.as_ref())?;
    info!(
        cluster = %stack.cluster,
        resources = stack.resource_count(),
        "Stack loaded"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_load_stack_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stack.kdl");
        fs::write(
            &path,
            r#"
            cluster "dev.example.com"
            load-balancer "api" { subnets "subnet-a" }
            "#,
        )
        .unwrap();

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.cluster, "dev.example.com");
        assert_eq!(stack.load_balancers.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = load_stack(temp_dir.path().join("nope.kdl"));
        assert!(matches!(result, Err(StackError::IoError { .. })));
    }

    #[test]
    #[serial]
    fn test_load_discovered_stack_from_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.kdl");
        fs::write(&path, r#"cluster "from-env""#).unwrap();

        unsafe {
            std::env::set_var(tidemark_config::CONFIG_PATH_ENV, path.to_str().unwrap());
        }

        let result = load_discovered_stack();

        unsafe {
            std::env::remove_var(tidemark_config::CONFIG_PATH_ENV);
        }
        assert_eq!(result.unwrap().cluster, "from-env");
    }
}
