use crate::strategy::{classify_http, FetchStrategy};
use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchParams, RawContent, SourceLink, StructuredAnswer};
use gleaner_config::ChatApiConfig;
use gleaner_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Asks an OpenAI-compatible chat-completions endpoint for an answer.
///
/// The response is already structured, so extraction rules are skipped.
pub struct ChatApiFetcher {
    client: HttpClient,
    config: ChatApiConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
    #[serde(default)]
    related_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
}

impl ChatApiFetcher {
    pub fn new(config: ChatApiConfig) -> Result<Self, FetchError> {
        let client = HttpClient::new(&config.endpoint)
            .map_err(|e| FetchError::unknown("chat api", e.to_string()))?
            .with_timeout(Duration::from_millis(config.timeout_ms));
        Ok(Self { client, config })
    }
}

#[async_trait]
impl FetchStrategy for ChatApiFetcher {
    fn name(&self) -> &str {
        "chat_api"
    }

    async fn fetch(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<RawContent, FetchError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: target.as_str(),
        });
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let opts = RequestOpts {
            auth: Some(Auth::Bearer(&self.config.api_key)),
            user_agent: params.user_agent.as_deref(),
            ..Default::default()
        };

        let resp: ChatResponse = self
            .client
            .post_json_opts("chat/completions", &request, opts)
            .await
            .map_err(|e| match e {
                HttpError::Decode(..) => FetchError::unknown(target, e.to_string()),
                other => classify_http(target, &other),
            })?;

        let answer = into_answer(resp)
            .ok_or_else(|| FetchError::unknown(target, "response carried no choices"))?;
        tracing::debug!(
            target_id = %target,
            model = %self.config.model,
            sources = answer.sources.len(),
            "chat_api.answered"
        );
        Ok(RawContent::answer(target, self.name(), answer))
    }
}

fn into_answer(resp: ChatResponse) -> Option<StructuredAnswer> {
    let content = resp.choices.into_iter().next()?.message.content;
    let sources = if resp.search_results.is_empty() {
        resp.citations
            .into_iter()
            .map(|url| SourceLink::new(url.clone(), url))
            .collect()
    } else {
        resp.search_results
            .into_iter()
            .map(|r| {
                let text = r.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| r.url.clone());
                SourceLink::new(text, r.url)
            })
            .collect()
    };
    Some(StructuredAnswer {
        title: None,
        answer: content,
        sources,
        related: resp.related_questions,
    })
}
