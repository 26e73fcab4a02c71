pub mod cluster;
pub mod db;
pub mod embed;
pub mod keyword;
pub mod llm;
pub mod memory;
pub mod types;

pub use embed::{Embedder, FastEmbedEmbedder};
pub use llm::DedupLlm;
pub use memory::MemoryStore;
pub use types::{DedupGroup, DedupOutcome, Memory, MergeDecision, NewMemory, TopicMergeDecision, TopicWithCount};
