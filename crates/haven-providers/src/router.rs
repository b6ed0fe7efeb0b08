use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

/// How a model string resolves to a concrete provider.
///
/// `Auto` prefers the proxy provider when one is configured and the model
/// carries no `provider/model` prefix; otherwise it falls back to the
/// prefix hint, then to the first registered provider. `Proxy` always
/// targets the configured OpenAI-compatible local gateway. `Direct`
/// requires an explicit `provider/model` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Auto,
    Proxy,
    Direct,
}

/// Resolves `(mode, provider_name)` to a concrete `LlmProvider` and walks a
/// model's configured fallback chain on retryable errors.
///
/// The model string a caller sends may carry a `provider/model` prefix
/// (e.g. `groq/llama-3.1-70b`) to hint direct routing; a bare model name
/// (e.g. `claude-sonnet-4`) routes per `mode`.
pub struct Router {
    mode: RoutingMode,
    /// Concrete providers keyed by provider name, used for `direct` routing
    /// and as the `auto` prefix-hint lookup.
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// The OpenAI-compatible local gateway provider, used by `proxy` mode
    /// and preferred by `auto` for un-prefixed models.
    proxy: Option<Arc<dyn LlmProvider>>,
    /// Models tried, in order, after the caller's requested model fails
    /// with a retryable error.
    fallback_models: Vec<String>,
}

impl Router {
    pub fn new(mode: RoutingMode, fallback_models: Vec<String>) -> Self {
        Self {
            mode,
            providers: HashMap::new(),
            proxy: None,
            fallback_models,
        }
    }

    /// Register a provider for `direct` routing and as an `auto` prefix hint.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Direct access to the provider map, for callers (e.g. the plugin
    /// seam's `register_provider_plugins`) that need to insert several
    /// providers at once rather than one `register` call at a time.
    pub fn providers_mut(&mut self) -> &mut HashMap<String, Arc<dyn LlmProvider>> {
        &mut self.providers
    }

    /// Set the provider used for `proxy` mode and preferred by `auto`.
    pub fn set_proxy(&mut self, provider: Arc<dyn LlmProvider>) {
        self.proxy = Some(provider);
    }

    /// Split `provider/model` into `(Some(provider), model)`; a bare model
    /// string returns `(None, model)`.
    fn split_model(model: &str) -> (Option<&str>, &str) {
        match model.split_once('/') {
            Some((provider, rest)) => (Some(provider), rest),
            None => (None, model),
        }
    }

    fn resolve(&self, model: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let (prefix, _) = Self::split_model(model);

        match self.mode {
            RoutingMode::Proxy => self.proxy.clone().ok_or_else(|| {
                ProviderError::Unavailable("no proxy provider configured".to_string())
            }),
            RoutingMode::Direct => {
                let name = prefix.ok_or_else(|| {
                    ProviderError::Unavailable(format!(
                        "direct routing requires a provider/model prefix, got '{model}'"
                    ))
                })?;
                self.providers.get(name).cloned().ok_or_else(|| {
                    ProviderError::Unavailable(format!("unknown provider '{name}'"))
                })
            }
            RoutingMode::Auto => {
                if let Some(name) = prefix {
                    if let Some(p) = self.providers.get(name) {
                        return Ok(p.clone());
                    }
                }
                if let Some(p) = &self.proxy {
                    return Ok(p.clone());
                }
                self.providers
                    .values()
                    .next()
                    .cloned()
                    .ok_or_else(|| ProviderError::Unavailable("no providers configured".to_string()))
            }
        }
    }

    /// Candidate models to try in order: the caller's requested model first,
    /// then the configured fallback chain.
    fn candidate_models(&self, requested: &str) -> Vec<String> {
        let mut models = vec![requested.to_string()];
        models.extend(self.fallback_models.iter().cloned());
        models
    }
}

#[async_trait]
impl LlmProvider for Router {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for model in self.candidate_models(&req.model) {
            let provider = match self.resolve(&model) {
                Ok(p) => p,
                Err(e) => {
                    warn!(model = %model, err = %e, "could not resolve provider for model, trying next");
                    last_err = Some(e);
                    continue;
                }
            };

            let mut attempt_req = req.clone();
            attempt_req.model = Self::split_model(&model).1.to_string();

            match provider.send(&attempt_req).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        model = %model,
                        provider = provider.name(),
                        retryable,
                        err = %e,
                        "provider send failed"
                    );
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                    info!(model = %model, "trying next fallback model");
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("no candidate models".to_string())))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for model in self.candidate_models(&req.model) {
            let provider = match self.resolve(&model) {
                Ok(p) => p,
                Err(e) => {
                    warn!(model = %model, err = %e, "could not resolve provider for model, trying next");
                    last_err = Some(e);
                    continue;
                }
            };

            let mut attempt_req = req.clone();
            attempt_req.model = Self::split_model(&model).1.to_string();

            match provider.send_stream(&attempt_req, tx.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        model = %model,
                        provider = provider.name(),
                        retryable,
                        err = %e,
                        "provider send_stream failed"
                    );
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                    info!(model = %model, "trying next fallback model");
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("no candidate models".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, Message, Role};
    use async_trait::async_trait;

    struct AlwaysFail {
        name: &'static str,
        err: fn() -> ProviderError,
    }

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            self.name
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err((self.err)())
        }
    }

    struct AlwaysOk {
        name: &'static str,
    }

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            self.name
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: format!("ok from {}", self.name),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn dummy_request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            system: "You are a test.".to_string(),
            system_prompt: None,
            messages: vec![Message {
                role: Role::User,
                content: "hello".to_string(),
            }],
            max_tokens: 64,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        }
    }

    #[tokio::test]
    async fn direct_mode_resolves_by_prefix() {
        let mut router = Router::new(RoutingMode::Direct, Vec::new());
        router.register("groq", Arc::new(AlwaysOk { name: "groq" }));

        let result = router.send(&dummy_request("groq/llama-3.1-70b")).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().content, "ok from groq");
    }

    #[tokio::test]
    async fn direct_mode_errors_without_prefix() {
        let mut router = Router::new(RoutingMode::Direct, Vec::new());
        router.register("groq", Arc::new(AlwaysOk { name: "groq" }));

        let result = router.send(&dummy_request("llama-3.1-70b")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn auto_mode_prefers_proxy_for_bare_model() {
        let mut router = Router::new(RoutingMode::Auto, Vec::new());
        router.register("groq", Arc::new(AlwaysOk { name: "groq" }));
        router.set_proxy(Arc::new(AlwaysOk { name: "proxy" }));

        let result = router.send(&dummy_request("claude-sonnet-4")).await;
        assert_eq!(result.unwrap().content, "ok from proxy");
    }

    #[tokio::test]
    async fn retryable_error_walks_fallback_models() {
        let mut router = Router::new(
            RoutingMode::Direct,
            vec!["backup/llama-3.1-70b".to_string()],
        );
        router.register(
            "primary",
            Arc::new(AlwaysFail {
                name: "primary",
                err: || ProviderError::Unavailable("down".to_string()),
            }),
        );
        router.register("backup", Arc::new(AlwaysOk { name: "backup" }));

        let result = router.send(&dummy_request("primary/some-model")).await;
        assert_eq!(result.unwrap().content, "ok from backup");
    }

    #[tokio::test]
    async fn non_retryable_error_does_not_walk_fallback_models() {
        let mut router = Router::new(
            RoutingMode::Direct,
            vec!["backup/llama-3.1-70b".to_string()],
        );
        router.register(
            "primary",
            Arc::new(AlwaysFail {
                name: "primary",
                err: || ProviderError::Api {
                    status: 401,
                    message: "unauthorized".to_string(),
                },
            }),
        );
        router.register("backup", Arc::new(AlwaysOk { name: "backup" }));

        let result = router.send(&dummy_request("primary/some-model")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn all_models_exhausted_surfaces_last_error() {
        let mut router = Router::new(
            RoutingMode::Direct,
            vec!["backup/some-model".to_string()],
        );
        router.register(
            "primary",
            Arc::new(AlwaysFail {
                name: "primary",
                err: || ProviderError::Unavailable("down".to_string()),
            }),
        );
        router.register(
            "backup",
            Arc::new(AlwaysFail {
                name: "backup",
                err: || ProviderError::Unavailable("also down".to_string()),
            }),
        );

        let result = router.send(&dummy_request("primary/some-model")).await;
        assert!(result.is_err());
    }
}
