// pour-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::HttpFetcher;
pub use validation::{sha256_hex, validate_url, Sha256Verifier};
