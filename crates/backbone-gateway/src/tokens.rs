//! Shared prompt/completion token counting for the OpenAI-compatible routes.
//! Grounded on `backbone-ledger::summarizer::Summarizer`'s use of
//! `tiktoken_rs::cl100k_base` for token accounting.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base vocab is embedded"))
}

pub fn count_tokens(text: &str) -> u32 {
    bpe().encode_ordinary(text).len() as u32
}
