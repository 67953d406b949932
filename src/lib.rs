// region:    --- Modules
pub mod action;
pub mod actor;
pub mod auction;
pub mod config;
pub mod event_sink;
pub mod handoff;
pub mod outcome;
pub mod scheduler;
pub mod script;

// endregion: --- Modules
