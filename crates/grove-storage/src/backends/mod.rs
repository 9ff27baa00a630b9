//! Storage backend implementations

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;
