//! Gatehouse - Request Admission Gateway
//!
//! This crate implements the admission layer in front of the onboarding
//! portal: per-client sliding window rate limiting on the API surface and
//! sealed-cookie session checks on protected and admin-only routes.

pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ratelimit;
pub mod routing;
pub mod session;
