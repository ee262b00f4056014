//! ddrop-transfer: presigned object transfer and the backend API
//!
//! - `transport`: the `ObjectTransport` seam (PUT/GET against presigned URLs)
//! - `backend`: the `DropBackend` seam (presign, finalize, resolve, pickup, burn)
//! - `http`: reqwest implementations of both
//! - `simulated`: an in-process implementation of both over an OpenDAL
//!   memory operator, for tests and local dry runs
//! - `operator`: OpenDAL operator factory and endpoint checks

pub mod backend;
pub mod http;
pub mod operator;
pub mod simulated;
pub mod transport;

pub use backend::DropBackend;
pub use http::{HttpBackend, HttpTransport};
pub use operator::build_memory_operator;
pub use simulated::{SimulatedBackend, SimulatedOptions};
pub use transport::{
    is_expired_response, redact_url, upload_headers, ObjectTransport, CHUNK_CONTENT_TYPE,
    MANIFEST_CONTENT_TYPE,
};
