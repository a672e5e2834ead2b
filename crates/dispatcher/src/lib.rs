//! Job dispatcher: a pool of workers draining the priority transport, plus
//! the time-based scheduler emitting recurring jobs into it.

pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use config::WorkerConfig;
pub use error::DispatchError;
pub use registry::{HandlerRegistry, JobHandler};
pub use retry::RetryPolicy;
pub use scheduler::{ScheduleEntry, Scheduler};
pub use worker::WorkerPool;
