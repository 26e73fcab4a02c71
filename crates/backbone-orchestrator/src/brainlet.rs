use async_trait::async_trait;
use backbone_core::types::{Id, Mode, Platform};

/// Per-turn context handed to every registered brainlet.
pub struct BrainletContext<'a> {
    pub user_id: &'a Id,
    pub platform: &'a Platform,
    pub mode: &'a Mode,
    pub content: &'a str,
}

/// A small named orchestrator plug-in that augments a turn (GLOSSARY
/// "Brainlet"; SPEC_FULL.md supplemented feature). Concrete brainlets
/// (emoji selection, memory-keyword extraction) are out of scope — spec.md
/// names only the `{name, model, options}` configuration shape — so this
/// crate builds only the extension point plus a no-op default registry.
#[async_trait]
pub trait Brainlet: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Some(text)` to append to the turn's enrichment context, or
    /// `None` if the brainlet has nothing to contribute this turn.
    async fn run(&self, ctx: &BrainletContext<'_>) -> Option<String>;
}

/// Ordered set of active brainlets, run in registration order. A brainlet
/// failure never aborts the turn: `run` returns `Option`, not `Result`.
#[derive(Default)]
pub struct BrainletRegistry {
    brainlets: Vec<std::sync::Arc<dyn Brainlet>>,
}

impl BrainletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, brainlet: std::sync::Arc<dyn Brainlet>) {
        self.brainlets.push(brainlet);
    }

    pub async fn run_all(&self, ctx: &BrainletContext<'_>) -> Vec<String> {
        let mut out = Vec::new();
        for brainlet in &self.brainlets {
            if let Some(text) = brainlet.run(ctx).await {
                out.push(text);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Brainlet for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, ctx: &BrainletContext<'_>) -> Option<String> {
            Some(ctx.content.to_string())
        }
    }

    #[tokio::test]
    async fn empty_registry_yields_no_contributions() {
        let registry = BrainletRegistry::new();
        let user_id = Id::new();
        let platform = Platform::Api;
        let mode = Mode::default();
        let ctx = BrainletContext {
            user_id: &user_id,
            platform: &platform,
            mode: &mode,
            content: "hi",
        };
        assert!(registry.run_all(&ctx).await.is_empty());
    }

    #[tokio::test]
    async fn registered_brainlet_contributes_text() {
        let mut registry = BrainletRegistry::new();
        registry.register(std::sync::Arc::new(Echo));
        let user_id = Id::new();
        let platform = Platform::Api;
        let mode = Mode::default();
        let ctx = BrainletContext {
            user_id: &user_id,
            platform: &platform,
            mode: &mode,
            content: "hi",
        };
        assert_eq!(registry.run_all(&ctx).await, vec!["hi".to_string()]);
    }
}
