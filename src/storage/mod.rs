pub mod error;
#[cfg(test)]
pub mod fake;
pub mod models;
pub mod service;
pub mod signer;
pub mod v4;

#[cfg(test)]
pub use fake::FakeSigner;
pub use models::{CloudStorageBucket, CloudStorageObject, SignedBucketUrl};
pub use service::CloudStorageService;
pub use v4::V4Signer;
