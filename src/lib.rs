//! time-announcer: speaks the current time at the top of every minute using a
//! personal synthetic voice.
//!
//! - `announcer`: session state, scheduling and the announcement controller
//! - `speech`: espeak-ng engine, voice catalog and authorization
//! - `display`: terminal status view
//! - `notifier`: desktop notifications for session transitions
//! - `config`: YAML configuration

pub mod announcer;
pub mod config;
pub mod display;
pub mod notifier;
pub mod speech;
