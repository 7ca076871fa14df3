pub mod binary_metadata;
pub mod retry;
