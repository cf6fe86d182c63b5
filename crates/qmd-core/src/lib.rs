pub mod config;
pub mod error;
pub mod types;

pub use error::{QmdError, QmdResult};
pub use types::{Protection, Status};
