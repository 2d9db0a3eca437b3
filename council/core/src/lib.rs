//! Council Core - Headless Client for the Three-Stage Answer Ensemble
//!
//! This crate is the business logic of a council chat client, completely
//! independent of any UI framework. The backend runs a three-stage
//! pipeline per user message: several models draft answers in parallel
//! (stage 1), the same models rank each other's anonymized drafts
//! (stage 2), and a chairman model synthesizes the final answer
//! (stage 3). Progress for all three stages streams back as discrete,
//! ordered events over one long-lived connection per send.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       UI Surfaces                            │
//! │        ┌─────────┐   ┌─────────┐   ┌──────────────┐          │
//! │        │   TUI   │   │   Web   │   │   Headless   │          │
//! │        │(ratatui)│   │         │   │   (tests)    │          │
//! │        └────┬────┘   └────┬────┘   └──────┬───────┘          │
//! │             └─────────────┴───────────────┘                  │
//! │                           │                                  │
//! │              send(..) / poll_events() (down)                 │
//! │              Transcript + ControllerSignals (up)             │
//! └───────────────────────────┼──────────────────────────────────┘
//! ┌───────────────────────────┼──────────────────────────────────┐
//! │                      COUNCIL CORE                            │
//! │  ┌────────────────────────┴───────────────────────────────┐  │
//! │  │                   TurnController                       │  │
//! │  │   ┌────────────┐  ┌─────────────┐  ┌───────────────┐   │  │
//! │  │   │ Transcript │  │ StreamEvent │  │  CouncilApi   │   │  │
//! │  │   │  (reducer) │  │  (envelope) │  │  (transport)  │   │  │
//! │  │   └────────────┘  └─────────────┘  └───────────────┘   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TurnController`]: drives one send-and-stream cycle, with
//!   optimistic update and identity-tagged rollback
//! - [`Transcript`]: the conversation as a value; folding an event
//!   produces a new transcript, published values are never mutated
//! - [`StreamEvent`]: the closed event envelope from the backend,
//!   with an `Unknown` arm for forward compatibility
//! - [`AssistantTurn`]: one turn's three stage accumulators plus
//!   per-stage loading flags
//! - [`CouncilApi`]: the transport contract; [`HttpCouncilApi`] is the
//!   production SSE implementation
//!
//! # Module Overview
//!
//! - [`events`]: wire event envelope and payload types
//! - [`turn`]: stage accumulators and per-turn loading state
//! - [`transcript`]: conversation transcript and the stream reducer
//! - [`controller`]: send orchestration, rollback, signals
//! - [`ranking`]: `FINAL RANKING:` extraction and aggregate standings
//! - [`api`]: transport contract and HTTP/SSE implementation
//! - [`config`]: backend connection configuration
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on ratatui, crossterm, or any
//! other UI framework. It's pure client logic that can be used anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod controller;
pub mod events;
pub mod ranking;
pub mod transcript;
pub mod turn;

// Re-exports for convenience
pub use api::{CouncilApi, HttpCouncilApi};
pub use config::CouncilConfig;
pub use controller::{ControllerSignals, SendError, TurnController};
pub use events::{
    AggregateRanking, Stage1Entry, Stage2Entry, Stage3Result, StageMetadata, StreamEvent,
};
pub use ranking::{aggregate_rankings, parse_final_ranking};
pub use transcript::{
    Conversation, ConversationId, ConversationSummary, FoldOutcome, Message, Transcript, TurnId,
};
pub use turn::{AssistantTurn, LoadingFlags};
