//! `backbone-orchestrator` — the per-turn pipeline (spec.md §4.5 C5 "Brain").
//!
//! For each inbound message: resolve identity → admin gate → pre-intent pass
//! → mode/memory fetch → ledger sync → summary fetch → dispatch → post-intent
//! pass → ledger write → last-seen update. See [`pipeline::Orchestrator`].

pub mod brainlet;
pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod sanitize;
pub mod state;

pub use brainlet::{Brainlet, BrainletContext, BrainletRegistry};
pub use intent::{IntentFlags, IntentHandler};
pub use pipeline::{InboundTurn, Orchestrator, TurnOutcome, TurnState};
pub use prompt::SystemPromptContext;
pub use state::ModeState;
