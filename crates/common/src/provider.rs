//! Closed set of language-model providers the router can dispatch to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini
    Google,
    /// Groq LPU inference
    Groq,
    /// SambaNova Cloud (Llama / DeepSeek families)
    SambaNova,
    /// OpenRouter aggregator
    OpenRouter,
}

impl Provider {
    /// Every provider, in declaration order
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::Groq,
        Provider::SambaNova,
        Provider::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Groq => "groq",
            Provider::SambaNova => "sambanova",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider '{}'", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "groq" => Ok(Provider::Groq),
            "sambanova" => Ok(Provider::SambaNova),
            "openrouter" => Ok(Provider::OpenRouter),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}
