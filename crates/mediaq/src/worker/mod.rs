pub mod runner;

pub use runner::{JobOutcome, Worker, WorkerOptions};
