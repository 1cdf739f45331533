//! starchart-bedrock
//!
//! Report content generation: the `ContentGenerator` seam, the per-report-type
//! prompt table, Bedrock Converse invocation, and model output parsing.

pub mod client;
pub mod converse;
pub mod error;
pub mod generator;
pub mod parse;
pub mod prompts;
pub mod tokens;

pub use crate::converse::BedrockGenerator;
pub use crate::error::{BedrockError, GenerationError};
pub use crate::generator::{Attempt, ContentGenerator, GenerationOutput, GenerationRequest};
