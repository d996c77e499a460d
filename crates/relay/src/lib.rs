//! Minimal file relay
//!
//! Accepts uploads as multipart form data or base64-encoded JSON, stores
//! the bytes on local disk under a generated identifier, and serves them
//! back at `/file/<id>`. An optional tunnel exposes the local listener
//! under a public domain.

mod error;
mod server;
mod state;
mod store;
mod token;
mod tunnel;

pub use error::{RelayError, RelayResult};
pub use server::{FileRelayApi, UploadResponse};
pub use state::{content_type_for, FileRecord, RelayState};
pub use store::BlobStore;
pub use token::{generate_file_id, ID_LENGTH};
pub use tunnel::{start_tunnel, TunnelHandle, TunnelInfo, TunnelProvider};

/// Result type alias for file relay operations
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
