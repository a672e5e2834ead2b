//! Mail transport seam.
//!
//! The send gate talks to a [`MailTransport`]; production wires the SMTP
//! implementation, tests and foreground runs use the recording in-memory
//! transport. Every successful transmission yields a provider `message_id`
//! that keys the email log for webhook routing.

pub mod config;
pub mod error;
pub mod memory;
pub mod smtp;
pub mod transport;

pub use config::SmtpConfig;
pub use error::EmailError;
pub use memory::MemoryMailTransport;
pub use smtp::SmtpMailTransport;
pub use transport::{MailTransport, OutboundEmail, SendReceipt};
