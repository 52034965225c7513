//! Moderation gate for outgoing text.
//!
//! The gate is a pure text → verdict function from the caller's point of
//! view. A classifier fault is reported as [`ModerationError`] so the send
//! path can refuse to write; it is never treated as "not harmful".

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::NO_VIOLATION;
use crate::error::ModerationError;

/// Result of moderating one piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_harmful: bool,
    pub reason: String,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            is_harmful: false,
            reason: NO_VIOLATION.to_string(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            is_harmful: true,
            reason: reason.into(),
        }
    }

    // Clean verdicts always carry the fixed reason, whatever the
    // classifier put there.
    fn normalized(self) -> Self {
        if self.is_harmful {
            self
        } else {
            Self::allow()
        }
    }
}

/// Text classifier consulted before a message is written.
///
/// Callers bound the input (non-empty, at most 1000 characters) before
/// invoking it.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<Verdict, ModerationError>;
}

/// One blocked phrase and the reason reported when it matches.
#[derive(Debug, Clone)]
pub struct Rule {
    phrase: String,
    reason: String,
}

impl Rule {
    pub fn new(phrase: &str, reason: &str) -> Self {
        Self {
            phrase: normalize(phrase),
            reason: reason.to_string(),
        }
    }
}

/// Local phrase-list classifier. Matches whole words, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordModerator {
    rules: Vec<Rule>,
}

impl KeywordModerator {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn check(&self, text: &str) -> Verdict {
        let haystack = format!(" {} ", normalize(text));
        for rule in &self.rules {
            if rule.phrase.is_empty() {
                continue;
            }
            if haystack.contains(&format!(" {} ", rule.phrase)) {
                debug!(reason = %rule.reason, "moderation rule matched");
                return Verdict::block(rule.reason.clone());
            }
        }
        Verdict::allow()
    }
}

impl Default for KeywordModerator {
    fn default() -> Self {
        Self::new(vec![
            Rule::new("subhuman", "Contains hate speech"),
            Rule::new("go back to your country", "Contains hate speech"),
            Rule::new("kill yourself", "Contains harassment or bullying"),
            Rule::new("nobody will ever love you", "Contains harassment or bullying"),
            Rule::new("i will kill you", "Contains threats or violence"),
            Rule::new("i will hurt you", "Contains threats or violence"),
            Rule::new("send nudes", "Contains sexually explicit content"),
            Rule::new("buy stolen cards", "Promotes illegal activities"),
        ])
    }
}

#[async_trait]
impl Moderator for KeywordModerator {
    async fn moderate(&self, text: &str) -> Result<Verdict, ModerationError> {
        Ok(self.check(text))
    }
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    text: &'a str,
}

/// Remote classifier reached over HTTP.
///
/// `POST {endpoint}` with `{"text": ...}`, answered by
/// `{"isHarmful": bool, "reason": string}`.
#[derive(Debug, Clone)]
pub struct HttpModerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ModerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModerationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Moderator for HttpModerator {
    async fn moderate(&self, text: &str) -> Result<Verdict, ModerationError> {
        let verdict: Verdict = self
            .client
            .post(&self.endpoint)
            .json(&ModerationRequest { text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(verdict.normalized())
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
