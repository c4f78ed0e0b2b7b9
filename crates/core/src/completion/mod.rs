//! Vision/text completion collaborator.

mod client;
mod parse;

pub use client::{
    AnthropicClient, CompletionClient, CompletionRequest, CompletionResponse, LlmError, LlmUsage,
};
pub use parse::parse_json_response;
