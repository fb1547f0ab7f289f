//! Repertory Providers - the backend implementations (spec §4.5-§4.8,
//! C5-C8): S3-compatible, Sia renterd, and local-directory encrypt.

pub mod encrypt;
pub mod provider;
pub mod s3;
pub mod sia;
pub mod xml;

pub use encrypt::EncryptProvider;
pub use provider::{AnyProvider, ItemAddedCallback, Provider};
pub use s3::S3Provider;
pub use sia::SiaProvider;
