use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::converse::ConverseError;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use tracing::info;
use uuid::Uuid;

use starchart_core::models::usage::{TokenCount, TokenUsage};

use crate::error::{BedrockError, GenerationError};
use crate::generator::{Attempt, BoxFuture, ContentGenerator, GenerationOutput, GenerationRequest};
use crate::parse::parse_report;
use crate::prompts;
use crate::tokens;

const MAX_OUTPUT_TOKENS: i32 = 8192;

/// Content generator backed by the Bedrock Converse API.
#[derive(Clone)]
pub struct BedrockGenerator {
    client: Client,
    model_id: String,
}

impl BedrockGenerator {
    pub fn new(client: Client, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn run(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let transaction_id = Uuid::new_v4();
        info!(
            transaction_id = %transaction_id,
            report_id = %request.report_id,
            report_type = %request.report_type,
            model = %self.model_id,
            regeneration = matches!(request.attempt, Attempt::Regeneration { .. }),
            "starting report generation"
        );

        let system_prompt = prompts::system_prompt(request.report_type);
        let user_message = prompts::user_message(request);

        let (response_text, usage) =
            invoke_converse(&self.client, &self.model_id, &system_prompt, &user_message).await?;

        let content = parse_report(&response_text, request.input.is_degraded())?;

        info!(
            transaction_id = %transaction_id,
            report_id = %request.report_id,
            sections = content.sections.len(),
            words = content.word_count(),
            input_tokens = usage.tokens.input,
            output_tokens = usage.tokens.output,
            cost_usd = usage.cost_usd,
            "report generation complete"
        );

        Ok(GenerationOutput {
            content,
            usage,
            model_id: self.model_id.clone(),
        })
    }
}

impl ContentGenerator for BedrockGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, GenerationError>> {
        Box::pin(self.run(request))
    }
}

fn classify(err: SdkError<ConverseError>) -> BedrockError {
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return BedrockError::ServiceUnavailable(DisplayErrorContext(&err).to_string());
    }
    let service = err.into_service_error();
    let detail = DisplayErrorContext(&service).to_string();
    if service.is_throttling_exception() {
        BedrockError::Throttled(detail)
    } else if service.is_service_unavailable_exception()
        || service.is_model_not_ready_exception()
        || service.is_internal_server_exception()
    {
        BedrockError::ServiceUnavailable(detail)
    } else {
        BedrockError::Invocation(detail)
    }
}

/// Core invocation using the Bedrock Converse API.
/// Returns the response text and token usage.
async fn invoke_converse(
    client: &Client,
    model_id: &str,
    system_prompt: &str,
    user_message: &str,
) -> Result<(String, TokenUsage), BedrockError> {
    let response = client
        .converse()
        .model_id(model_id)
        .system(SystemContentBlock::Text(system_prompt.to_string()))
        .inference_config(
            InferenceConfiguration::builder()
                .max_tokens(MAX_OUTPUT_TOKENS)
                .build(),
        )
        .messages(
            Message::builder()
                .role(ConversationRole::User)
                .content(ContentBlock::Text(user_message.to_string()))
                .build()
                .map_err(|e| BedrockError::Invocation(e.to_string()))?,
        )
        .send()
        .await
        .map_err(classify)?;

    let output_message = response
        .output()
        .and_then(|o| o.as_message().ok())
        .ok_or_else(|| BedrockError::ResponseParse("no message in response".to_string()))?;

    let response_text = output_message
        .content()
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text(text) = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("");

    let tokens = response
        .usage()
        .map(tokens::extract_token_usage)
        .unwrap_or(TokenCount::default());

    Ok((response_text, tokens::priced_usage(model_id, tokens)))
}
