//! AWS backend error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    /// An ELBv2 API call failed
    #[error("ELBv2 {operation} failed: {message}")]
    Api { operation: String, message: String },

    /// An ELBv2 response lacked a field the engine relies on
    #[error("ELBv2 {operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Stack error: {0}")]
    Stack(#[from] tidemark_core::StackError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] tidemark_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;
