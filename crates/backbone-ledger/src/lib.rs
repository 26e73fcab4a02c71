pub mod db;
pub mod ledger;
pub mod review;
pub mod summarizer;
pub mod types;

pub use ledger::Ledger;
pub use review::{ExtractedMemory, ReviewLlm, ReviewOutcome};
pub use summarizer::{Summarizer, SummarizerLlm};
pub use types::{MessageFilter, Summary, SyncEntry, Topic};
