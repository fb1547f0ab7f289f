//! Repertory Net - the HTTP transport core for outbound S3 and Sia renterd
//! requests (spec §4.2, C2).
//!
//! Typed request variants, AWS SigV4 request signing, a shared process-wide
//! `reqwest::Client`, and bounded cancel/retry semantics matching the
//! original's curl-based transport (retry only on DNS-resolution failure).

pub mod client;
pub mod error;
pub mod request;
pub mod sigv4;

pub use client::{CancelToken, HttpTransport, ResolvedHost, Response};
pub use error::{is_dns_failure, to_api_error};
pub use request::{PutSource, Request};
pub use sigv4::{sign_request, SignedHeaders, SigningCredentials};
