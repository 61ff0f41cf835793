//! Azure OpenAI vision-capable chat completions client, the default
//! [`crate::generator::VisionClient`] implementation. Request/response
//! shape, bearer-style auth, and usage accounting are grounded on
//! `docling-llm-verify::models::openai`'s `OpenAIClient`; the difference is
//! Azure's deployment-scoped URL and `api-key` header instead of
//! `Authorization: Bearer`, and a plain-text response body instead of JSON.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelSettings;
use crate::error::Error;
use crate::generator::prompt::PromptBundle;
use crate::generator::{VisionClient, VisionResponse};

const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    completion_tokens: u32,
}

/// Credentials and execution settings for one Azure OpenAI deployment.
/// Read once at CLI startup via [`Self::from_env`]; the generator is handed
/// the resulting client behind `Arc<dyn VisionClient>` and never touches
/// the environment itself.
pub struct AzureOpenAiVisionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    model: ModelSettings,
}

impl AzureOpenAiVisionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        model: ModelSettings,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            model,
        }
    }

    /// Read `DOC2ALT_AZURE_OPENAI_ENDPOINT`, `DOC2ALT_AZURE_OPENAI_KEY`, and
    /// `DOC2ALT_AZURE_OPENAI_DEPLOYMENT` (required); `DOC2ALT_AZURE_OPENAI_
    /// API_VERSION` defaults to `2024-02-15-preview` when unset.
    pub fn from_env(model: ModelSettings) -> Result<Self, Error> {
        let endpoint = required_env("DOC2ALT_AZURE_OPENAI_ENDPOINT")?;
        let api_key = required_env("DOC2ALT_AZURE_OPENAI_KEY")?;
        let deployment = required_env("DOC2ALT_AZURE_OPENAI_DEPLOYMENT")?;
        let api_version = std::env::var("DOC2ALT_AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        Ok(Self::new(endpoint, api_key, deployment, api_version, model))
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Input(format!("missing required environment variable {name}")))
}

#[async_trait]
impl VisionClient for AzureOpenAiVisionClient {
    async fn describe(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &PromptBundle,
    ) -> Result<VisionResponse, Error> {
        let data_uri = format!("data:{mime_type};base64,{}", STANDARD.encode(image_bytes));

        let request = ChatRequest {
            messages: vec![
                Message { role: "system", content: MessageContent::Text(prompt.system.clone()) },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: prompt.user_text.clone() },
                        ContentPart::ImageUrl { image_url: ImageUrl { url: data_uri } },
                    ]),
                },
            ],
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        };

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Api {
                message: format!("request to Azure OpenAI failed: {e}"),
                status: None,
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                message: format!("Azure OpenAI returned {code}: {body}"),
                status: Some(code),
                retryable: matches!(code, 429 | 503 | 504),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| Error::Api {
            message: format!("failed to parse Azure OpenAI response: {e}"),
            status: None,
            retryable: false,
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let tokens_used = parsed.usage.map(|u| u.completion_tokens);

        Ok(VisionResponse { text, tokens_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_embeds_deployment_and_api_version() {
        let client = AzureOpenAiVisionClient::new(
            "https://example.openai.azure.com/",
            "key",
            "gpt4o-vision",
            "2024-02-15-preview",
            ModelSettings::default(),
        );
        assert_eq!(
            client.url(),
            "https://example.openai.azure.com/openai/deployments/gpt4o-vision/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn from_env_reports_missing_credentials_as_input_error() {
        std::env::remove_var("DOC2ALT_AZURE_OPENAI_ENDPOINT");
        std::env::remove_var("DOC2ALT_AZURE_OPENAI_KEY");
        std::env::remove_var("DOC2ALT_AZURE_OPENAI_DEPLOYMENT");
        let result = AzureOpenAiVisionClient::from_env(ModelSettings::default());
        assert!(matches!(result, Err(Error::Input(_))));
    }
}
