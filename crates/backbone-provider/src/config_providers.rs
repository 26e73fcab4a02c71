//! Builds the provider set `backbone_proxy::ProxyPool::start` expects
//! straight from a loaded `Config`. Factored out of `backbone-gateway`'s
//! bootstrap so `backbone-cli`'s one-shot commands (which need a `ProxyPool`
//! but no HTTP server) don't have to re-derive the same provider wiring.

use std::sync::Arc;

use backbone_core::config::Config;

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, ProviderTag};

/// Worker count per provider queue; no single-provider load figures are
/// given in spec.md, so this is a small fixed default rather than a
/// per-provider tunable.
const WORKERS_PER_PROVIDER: usize = 4;

/// One entry per configured provider, plus a direct handle to the ollama
/// provider (if configured) for callers that also need its native model
/// enumeration.
pub struct ConfiguredProviders {
    pub entries: Vec<(ProviderTag, Arc<dyn LlmProvider>, usize, Option<usize>)>,
    pub ollama: Option<Arc<OllamaProvider>>,
}

pub fn providers_from_config(config: &Config) -> ConfiguredProviders {
    let mut entries: Vec<(ProviderTag, Arc<dyn LlmProvider>, usize, Option<usize>)> = Vec::new();
    let mut ollama = None;

    if let Some(anthropic_cfg) = &config.providers.anthropic {
        entries.push((
            ProviderTag::Anthropic,
            Arc::new(AnthropicProvider::new(anthropic_cfg.api_key.clone(), anthropic_cfg.base_url.clone())),
            WORKERS_PER_PROVIDER,
            None,
        ));
    }
    if let Some(openai_cfg) = &config.providers.openai {
        entries.push((
            ProviderTag::Openai,
            Arc::new(OpenAiProvider::new(openai_cfg.api_key.clone(), openai_cfg.base_url.clone())),
            WORKERS_PER_PROVIDER,
            None,
        ));
    }
    if let Some(ollama_cfg) = &config.providers.ollama {
        let handle = Arc::new(OllamaProvider::new(ollama_cfg.base_url.clone()));
        entries.push((ProviderTag::Ollama, handle.clone(), WORKERS_PER_PROVIDER, None));
        ollama = Some(handle);
    }

    ConfiguredProviders { entries, ollama }
}
