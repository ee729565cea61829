//! モデル定義
//!
//! スタックファイルから読み込む宣言モデル。

mod elb;
mod stack;

// Re-exports
pub use elb::*;
pub use stack::*;
