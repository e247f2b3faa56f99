//! Upload client for the ferry file service.
//!
//! Connects to a server over plain TCP, authenticates, negotiates a
//! storage slot (renaming once if the key is taken), streams the file in
//! server-sized blocks, and verifies the stored copy's digest against a
//! locally computed one. One session drives one file over one connection.

pub mod config;
pub mod error;
pub mod namer;
pub mod plan;
pub mod report;
pub mod session;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use plan::TransferPlan;
pub use report::UploadReport;
pub use session::{SessionState, UploadSession, UploadSource};
