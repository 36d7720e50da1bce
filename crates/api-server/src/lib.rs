#![warn(clippy::unwrap_used)]

pub mod device_rest;
pub mod jobs_rest;
pub mod queue_rest;
pub mod rest;
pub mod server;
pub mod swagger;

pub use server::ApiServer;
pub use swagger::ApiDoc;
