use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::CatalogStore;
use crate::chat::ChatMessage;
use crate::config::{Transport, TransportConfig};
use crate::error::RoutineError;
use crate::selection::SelectionSet;

pub const SYSTEM_PROMPT: &str = "You are a helpful skincare and haircare routine assistant. Produce a clear, step-by-step routine using the provided products and indicate when to use each product (AM/PM/Weekly) and any pairing notes. Keep it concise and actionable.";

const USER_PREAMBLE: &str = "Here are the selected products as JSON. Generate a simple routine that lists steps and where each product fits:";

/// The only product fields the model ever sees.
#[derive(Debug, Serialize)]
struct ProductForModel<'a> {
    name: &'a str,
    brand: &'a str,
    category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineRequest {
    pub messages: Vec<ChatMessage>,
    pub product_count: usize,
}

pub fn build_request(
    selection: &SelectionSet,
    catalog: &CatalogStore,
) -> Result<RoutineRequest, RoutineError> {
    if selection.is_empty() {
        return Err(RoutineError::EmptySelection);
    }

    let products: Vec<ProductForModel> = selection
        .resolve(catalog)
        .into_iter()
        .map(|p| ProductForModel {
            name: &p.name,
            brand: &p.brand,
            category: &p.category,
            description: p.description.as_deref(),
        })
        .collect();

    if products.is_empty() {
        return Err(RoutineError::EmptySelection);
    }

    let products_json = serde_json::to_string_pretty(&products)
        .map_err(|e| RoutineError::transport(e.to_string()))?;

    Ok(RoutineRequest {
        product_count: products.len(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("{USER_PREAMBLE}\n\n{products_json}")),
        ],
    })
}

/// A model response body tagged with the path it came back on.
#[derive(Debug, Clone)]
pub enum RawResponse {
    Proxy(Value),
    Direct(Value),
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strings as-is, anything structured as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Collapse either response shape into the text the transcript shows.
pub fn normalize(raw: RawResponse) -> Result<String, RoutineError> {
    match raw {
        RawResponse::Proxy(body) => {
            if let Some(reply) = non_empty_str(body.get("reply")) {
                return Ok(reply);
            }
            match body.get("error") {
                Some(err) if !err.is_null() => Err(RoutineError::Upstream {
                    prefix: "Worker",
                    status: None,
                    detail: stringify(err),
                    body: err.clone(),
                }),
                _ => Err(RoutineError::UnexpectedFormat("worker")),
            }
        }
        RawResponse::Direct(Value::Null) => Err(RoutineError::NoResponse),
        RawResponse::Direct(body) => {
            if let Some(content) = non_empty_str(body.pointer("/choices/0/message/content")) {
                return Ok(content);
            }
            match non_empty_str(body.pointer("/error/message")) {
                Some(message) => Err(RoutineError::Upstream {
                    prefix: "API",
                    status: None,
                    detail: message,
                    body: body.get("error").cloned().unwrap_or(Value::Null),
                }),
                None => Err(RoutineError::UnexpectedFormat("API")),
            }
        }
    }
}

/// What the transcript shows for a finished call, success or not.
pub fn display_text(result: Result<String, RoutineError>) -> String {
    match result {
        Ok(text) => text,
        Err(err) => err.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

/// Sends prompts over whichever transport was picked at startup.
pub struct RoutineClient {
    transport: Transport,
    model: String,
    max_tokens: u32,
    api_url: String,
    client: reqwest::Client,
}

impl RoutineClient {
    pub fn with_config(config: &TransportConfig) -> Self {
        RoutineClient {
            transport: config.select(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_url: config.api_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn send(&self, messages: &[ChatMessage]) -> Result<String, RoutineError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        info!(
            transport = self.transport.kind(),
            messages = messages.len(),
            "sending chat request"
        );

        let raw = match &self.transport {
            Transport::None => {
                warn!("no transport configured");
                return Err(RoutineError::MissingConfiguration);
            }
            Transport::Proxy(url) => {
                let response = self.client.post(url).json(&request).send().await?;
                RawResponse::Proxy(response.json().await?)
            }
            Transport::Direct(key) => {
                let response = self
                    .client
                    .post(&self.api_url)
                    .bearer_auth(key)
                    .json(&request)
                    .send()
                    .await?;
                RawResponse::Direct(response.json().await?)
            }
        };

        normalize(raw)
    }
}
