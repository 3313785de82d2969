pub mod llm;

pub use llm::{
    AnthropicProvider, DecisionService, Message, OpenAIProvider, ScriptedDecisionService,
};
