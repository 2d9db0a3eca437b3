//! Council TUI - Terminal interface for the LLM council
//!
//! A thin display client over `council-core`: the terminal loop gathers
//! keystrokes, hands sends to the turn controller, drains stream events
//! once per frame, and renders whatever transcript value the controller
//! currently holds.
//!
//! # Architecture
//!
//! - **App**: Event loop, input handling, frame pacing
//! - **Display**: Pure transcript-to-lines formatting

pub mod app;
pub mod display;

pub use app::App;
