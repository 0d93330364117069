//! Request dispatch: normalization, routing, handler contract, response
//! writing, and the plaintext/TLS listeners.
//!
//! # Data flow
//! ```text
//! listener (http | https) ─► pipeline ─► normalize ─► router ─► handler
//!                                                                  │
//!                      wire response ◄─ response writer ◄─ completion
//! ```
//!
//! Both listeners hand connections to the same [`pipeline::Pipeline`]; there
//! is no transport-specific branching past the TLS handshake.

pub mod handler;
pub mod handlers;
pub mod listener;
pub mod normalize;
pub mod pipeline;
pub mod response;
pub mod router;
pub mod tls;
