//! Remote client for the Flow generation service.
//!
//! [`api::FlowClient`] implements the [`api::RemoteClient`] trait over
//! HTTP: project creation on the interactive web host, generation
//! submission and batched status checks on the generation API host.
//! Wire-format types live in [`responses`]; the authenticated session
//! context and the external session-driver seam live in [`session`].

pub mod api;
pub mod responses;
pub mod session;
