// Application layer: the ledger engine, request validation and the error
// taxonomy callers match on.

pub mod error;
pub mod reporting;
pub mod requests;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use requests::*;
pub use service::*;
