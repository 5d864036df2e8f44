//! Evalon Backend Client
//!
//! HTTP client for the registration backend, via reqwest.
//!
//! [`HttpBackend`] implements the wizard engine's
//! [`RegistrationBackend`](evalon_wizard::RegistrationBackend) and
//! [`LocationLookup`](evalon_wizard::LocationLookup) seams against the
//! backend's REST routes. Every route answers with the
//! `{ success, data, message }` envelope; failures are mapped onto
//! [`EvalonError::Backend`](evalon_wizard::EvalonError::Backend) with a
//! [`BackendErrorKind`](evalon_wizard::BackendErrorKind) describing what went
//! wrong.

mod client;

pub use client::HttpBackend;
