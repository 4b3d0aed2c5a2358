pub mod backend;
pub mod chain;
pub mod config;
pub mod layout;
pub mod plan;
pub mod runtime;
pub mod sequencer;
