pub mod anthropic;
pub mod anthropic_stream;
pub mod health;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod router;
pub mod stream;
pub mod thinking;

pub use anthropic::AnthropicProvider;
pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use prompt::SystemPrompt;
pub use provider::{
    ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, TokenInfo, TokenType,
    ToolCall, ToolDefinition,
};
pub use registry::{lookup, KnownProvider, KNOWN_PROVIDERS};
pub use router::{Router, RoutingMode};
pub use stream::StreamEvent;
pub use thinking::ThinkingLevel;
