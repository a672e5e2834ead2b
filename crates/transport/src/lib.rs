//! Durable priority job transport.
//!
//! A single logical table of rows `{id, queue_name, body, headers,
//! created_at, available_at, delivered_at}` backs four fixed queues. A row
//! is *claimable* when `available_at <= now` and `delivered_at` is null;
//! claiming marks `delivered_at` atomically so concurrent workers never
//! receive the same row. Handlers ack (delete), release (retry with
//! backoff), or fail (move to the `failed` queue) their claim.

pub mod error;
pub mod job;
pub mod memory;
pub mod transport;

pub use error::TransportError;
pub use job::{JobHeaders, QueuedJob};
pub use memory::MemoryTransport;
pub use transport::{JobTransport, enqueue_job};
