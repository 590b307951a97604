//! espeak-ng backed implementations of the announcer's platform traits.
//!
//! - `espeak`: speech engine, one child process per utterance
//! - `catalog`: stock voices plus personal voice profiles
//! - `consent`: personal voice authorization

pub mod catalog;
pub mod consent;
pub mod espeak;
