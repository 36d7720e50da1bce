pub mod config;
pub mod error;
pub mod profiles;
pub mod types;

pub use config::AppConfig;
pub use error::{QgError, QgResult};
