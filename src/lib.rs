//! Booking scheduling engine for a field-service dispatch dashboard
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
