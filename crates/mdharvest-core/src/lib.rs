//! mdharvest Core - Common infrastructure for metadata harvest pipelines
//!
//! This crate provides the pieces every source fetcher shares: the
//! normalized record shape, the error taxonomy, a blocking HTTP transport
//! seam, and logging setup.

pub mod error;
pub mod logging;
pub mod record;
pub mod transport;

// Re-exports for convenience
pub use error::FetchError;
pub use logging::init_logging;
pub use record::{Record, attrib_text, first_text, push_field};
pub use transport::{
    HttpTransport, MAX_DECODE_RETRIES, SHARED_RUNTIME, Transport, get_with_retry, http_client,
};
