//! Tidemark Core
//!
//! 宣言されたスタック（ロードバランサー、ターゲットグループ、リスナー）の
//! モデルと、スタックファイル（stack.kdl）のパーサーを提供します。

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;

pub use error::{Result, StackError};
pub use loader::{load_discovered_stack, load_stack};
pub use model::*;
pub use parser::{parse_stack_file, parse_stack_string};
