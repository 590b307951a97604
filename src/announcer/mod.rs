//! Time announcer core.
//!
//! Components:
//! - `session`: authorization/voice/active state and its invariant
//! - `platform`: traits for the speech engine, voice catalog, authorizer and clock
//! - `schedule`: next-minute computation, spoken time format, repeating ticker
//! - `controller`: single-task controller driving announcements

pub mod controller;
pub mod platform;
pub mod schedule;
pub mod session;
