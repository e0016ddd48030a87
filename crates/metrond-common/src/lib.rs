//! Shared wire model and plumbing for the metrond agent and server.
//!
//! Contains the [`metric::Metric`] domain entity, the classified retry
//! engine ([`retry`]), gzip body helpers ([`compress`]) and HMAC body
//! signing ([`sign`]).

pub mod classify;
pub mod compress;
pub mod metric;
pub mod retry;
pub mod sign;
