//! Oracle request/response values.
//!
//! The transport lives outside the engine. This module only decides what to
//! ask for a given memory and what to show when asking fails.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{FALLBACK_INTERPRETATION, FALLBACK_MOOD, ORACLE_TEXT_LIMIT};
use crate::memory::{MemoryKind, MemoryRecord};

/// Persona the oracle answers in.
pub const ORACLE_SYSTEM_INSTRUCTION: &str = "\
You are the \"VaporOracle\", a mystical AI entity living inside a Windows 95 server.
Your aesthetic is Vaporwave, Y2K, Glitch Art, and Cyberpunk.
When analyzing a user's memory (text, drawing, or audio), provide a \"Vibe Check\".
Speak in riddles, use metaphors involving technology (reboot, glitch, matrix, neon, cassette), and be poetic but vaguely optimistic.
Keep the response short (under 50 words).";

static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:([^;]+);base64,(.+)$").unwrap());

/// The oracle's reading of one memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReading {
    pub interpretation: String,
    pub mood: String,
}

impl OracleReading {
    /// Shown whenever the oracle cannot be reached or answers garbage.
    pub fn fallback() -> Self {
        Self {
            interpretation: FALLBACK_INTERPRETATION.to_string(),
            mood: FALLBACK_MOOD.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.mood == FALLBACK_MOOD && self.interpretation == FALLBACK_INTERPRETATION
    }
}

/// Any failure consulting the oracle. Always absorbed into
/// [`OracleReading::fallback`] by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No credentials or endpoint configured.
    Unavailable(String),
    /// Network or HTTP status failure.
    Transport(String),
    /// The answer could not be parsed as a reading.
    InvalidResponse(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Unavailable(msg) => write!(f, "oracle unavailable: {msg}"),
            OracleError::Transport(msg) => write!(f, "oracle transport error: {msg}"),
            OracleError::InvalidResponse(msg) => write!(f, "invalid oracle response: {msg}"),
        }
    }
}

impl std::error::Error for OracleError {}

/// One piece of the request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    InlineData { mime_type: String, data: String },
}

/// What to send the oracle for a memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleRequest {
    pub kind: MemoryKind,
    pub parts: Vec<RequestPart>,
}

impl OracleRequest {
    /// Text memories are quoted (first 1000 chars). Media memories carried
    /// as base64 data URIs are sent inline with their mime type; anything
    /// else is described as unavailable.
    pub fn for_content(content: &str, kind: MemoryKind) -> Self {
        let parts = match kind {
            MemoryKind::Text => {
                let excerpt: String = content.chars().take(ORACLE_TEXT_LIMIT).collect();
                vec![RequestPart::Text(format!(
                    "Analyze this text memory fragment: \"{excerpt}...\""
                ))]
            }
            MemoryKind::Drawing | MemoryKind::Audio => {
                let label = kind.as_str().to_lowercase();
                match parse_data_uri(content) {
                    Some((mime_type, data)) => vec![
                        RequestPart::InlineData {
                            mime_type: mime_type.to_string(),
                            data: data.to_string(),
                        },
                        RequestPart::Text(format!(
                            "Analyze the artistic vibe and emotion of this {label} memory."
                        )),
                    ],
                    None => vec![RequestPart::Text(format!(
                        "Analyze this {} memory (content data unavailable).",
                        kind.as_str()
                    ))],
                }
            }
        };
        Self { kind, parts }
    }

    pub fn for_record(record: &MemoryRecord) -> Self {
        Self::for_content(record.payload(), record.kind())
    }
}

/// Split `data:<mime>;base64,<data>` into `(mime, data)`.
pub fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let caps = DATA_URI.captures(uri)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Tags one in-flight oracle call with the viewing session that made it, so
/// a late answer for a closed viewer can be recognised and dropped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OracleTicket {
    pub session: u64,
    pub record_id: String,
}

/// Oracle progress for the memory being viewed.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum OracleStatus {
    #[default]
    NotRequested,
    Pending(OracleTicket),
    Resolved(OracleReading),
}

impl OracleStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn reading(&self) -> Option<&OracleReading> {
        match self {
            Self::Resolved(r) => Some(r),
            _ => None,
        }
    }
}
