use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use uuid::Builder;

use crate::constants::PASTEL_PALETTE;

/// What a memory holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryKind {
    #[default]
    Text,
    Drawing,
    Audio,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Drawing => "DRAWING",
            Self::Audio => "AUDIO",
        }
    }

    /// Case-insensitive parse; `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "DRAWING" => Some(Self::Drawing),
            "AUDIO" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Outline a memory is displayed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Shape {
    #[default]
    Rect,
    Circle,
    Star,
    Heart,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rect => "RECT",
            Self::Circle => "CIRCLE",
            Self::Star => "STAR",
            Self::Heart => "HEART",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RECT" => Some(Self::Rect),
            "CIRCLE" => Some(Self::Circle),
            "STAR" => Some(Self::Star),
            "HEART" => Some(Self::Heart),
            _ => None,
        }
    }
}

/// One stored memory. Immutable once created; identity is `id`.
///
/// Serialized with the persisted field names
/// `{id, type, content, timestamp, shape, styleColor}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    id: String,
    #[serde(rename = "type")]
    kind: MemoryKind,
    #[serde(rename = "content")]
    payload: String,
    #[serde(rename = "timestamp")]
    created_at: u64,
    shape: Shape,
    #[serde(rename = "styleColor")]
    display_color: String,
}

impl MemoryRecord {
    /// Create a record with a fresh id and a random pastel color, both drawn
    /// from `rng` so seeded sources reproduce the same record.
    pub fn new<R: Rng + ?Sized>(
        kind: MemoryKind,
        payload: impl Into<String>,
        shape: Shape,
        created_at: u64,
        rng: &mut R,
    ) -> Self {
        let id = Builder::from_random_bytes(rng.random()).into_uuid().to_string();
        let display_color = PASTEL_PALETTE
            .choose(rng)
            .copied()
            .unwrap_or(PASTEL_PALETTE[0])
            .to_string();
        Self {
            id,
            kind,
            payload: payload.into(),
            created_at,
            shape,
            display_color,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Text for TEXT memories, a data URI or blob reference otherwise.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Creation time, Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn display_color(&self) -> &str {
        &self.display_color
    }

    /// Short single-line preview for listings.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .payload
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        if flat.chars().count() <= max_chars {
            flat
        } else {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{cut}…")
        }
    }
}
