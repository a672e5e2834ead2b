//! Sending gates: the suppression list, per-tenant rate-limit counters, and
//! the offer send protocol that consults both before any transmission.

pub mod ratelimit;
pub mod send;
pub mod suppression;

pub use ratelimit::{RateLimitDecision, RateLimitUsage, RateLimiter, recipient_domain};
pub use send::{SendEmailHandler, SendGate};
pub use suppression::SuppressionService;
