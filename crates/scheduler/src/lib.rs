pub mod devices;
pub mod manager;
pub mod processor;
pub mod queue;
pub mod results;
pub mod runner;
pub mod store;
pub mod worker;

pub use devices::{DeviceManager, DeviceProbe};
pub use manager::Scheduler;
pub use processor::BatchProcessor;
pub use queue::PriorityQueues;
pub use results::ResultRegistry;
pub use runner::{build_runner, TestRunner};
pub use store::{JobFilter, JobStore};
pub use worker::BatchWorker;
