use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const FREE_MODEL: &str = "meta-llama/llama-3.2-3b-instruct:free";
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const CACHE_TTL: Duration = Duration::from_secs(2 * 60);
/// Only this many leading characters of the input participate in the key.
const CACHE_KEY_CHARS: usize = 500;

const NOT_CONFIGURED: &str =
    "AI is not configured. Set OPENROUTER_API_KEY in the environment.";
const NO_RESPONSE: &str = "No response.";

/// One turn of a chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Text-advisory adapter over an opaque chat-completion service. Every
/// surface returns a displayable string: a missing credential, a
/// non-success HTTP status, or a transport failure all come back as text
/// for the caller to show verbatim, never as an error.
pub struct Advisor {
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Advisor {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::blocking::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var(API_KEY_ENV).ok())
    }

    /// Run a chat exchange. Single-turn calls are cached for a short TTL
    /// unless `skip_cache` is set; multi-turn conversations always go out.
    pub fn chat(&self, messages: &[ChatMessage], skip_cache: bool) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return NOT_CONFIGURED.to_string();
        };
        let cache_key = if !skip_cache && messages.len() == 1 {
            Some(cache_key("chat", &messages[0].content))
        } else {
            None
        };
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache_get(key) {
                debug!("advisory cache hit");
                return hit;
            }
        }
        match self.request(api_key, messages) {
            Ok(content) => {
                if let Some(key) = cache_key {
                    self.cache_put(key, content.clone());
                }
                content
            }
            Err(message) => {
                warn!("advisory request failed: {message}");
                message
            }
        }
    }

    fn request(&self, api_key: &str, messages: &[ChatMessage]) -> Result<String, String> {
        let response = self
            .client
            .post(OPENROUTER_URL)
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: FREE_MODEL,
                messages,
            })
            .send()
            .map_err(|e| format!("Error: request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(format!("Error: {status} {body}"));
        }

        let data: ChatResponse = response
            .json()
            .map_err(|e| format!("Error: invalid response: {e}"))?;
        Ok(data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NO_RESPONSE.to_string()))
    }

    fn cache_get(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().expect("advisory cache poisoned");
        let entry = cache.get(key)?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(entry.value.clone())
    }

    fn cache_put(&self, key: String, value: String) {
        self.cache.lock().expect("advisory cache poisoned").insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + CACHE_TTL,
            },
        );
    }

    // --- Task prompts ---

    pub fn resume_score_feedback(&self, resume_text: &str) -> String {
        self.chat(
            &[ChatMessage::user(format!(
                "You are a career coach. Briefly analyze this resume text and give a short score \
                 out of 100 and 3 bullet-point improvements. Keep response under 200 words.\n\n\
                 Resume:\n{}",
                clip(resume_text, 3000)
            ))],
            false,
        )
    }

    pub fn skill_gap_analysis(&self, skills: &[String], target_role: &str) -> String {
        self.chat(
            &[ChatMessage::user(format!(
                "You are a career advisor. Given skills: {} and target role: {}, list 3-5 skill \
                 gaps and one learning tip for each. Keep under 150 words.",
                skills.join(", "),
                target_role
            ))],
            false,
        )
    }

    pub fn job_description_suggestion(&self, title: &str, company: &str) -> String {
        self.chat(
            &[ChatMessage::user(format!(
                "Write a short job description (2-3 paragraphs) for: {title} at {company}. \
                 Include responsibilities and requirements. Keep under 250 words."
            ))],
            false,
        )
    }

    pub fn resume_summary(&self, resume_text: &str) -> String {
        self.chat(
            &[ChatMessage::user(format!(
                "Summarize this resume in 3-4 bullet points (experience, skills, strengths). \
                 Keep under 100 words.\n\n{}",
                clip(resume_text, 2500)
            ))],
            false,
        )
    }

    pub fn job_recommendations(&self, skills: &[String], preferences: &str) -> String {
        self.chat(
            &[ChatMessage::user(format!(
                "User skills: {}. Preferences: {}. Suggest 3 job titles or roles that match. \
                 One line each with a brief reason.",
                skills.join(", "),
                preferences
            ))],
            false,
        )
    }
}

fn cache_key(prefix: &str, input: &str) -> String {
    format!("{}:{}", prefix, clip(input, CACHE_KEY_CHARS))
}

/// Truncate to at most `max` characters without splitting a code point.
fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
