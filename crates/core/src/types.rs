use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Persona ────────────────────────────────────────────────────

/// Persona selector: picks the reply voice, the affect disposition and the
/// fine-tuned adapter. The legacy single-letter codes are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    #[serde(alias = "A", alias = "a")]
    Warm,
    #[serde(alias = "B", alias = "b")]
    Frank,
    #[serde(alias = "O", alias = "o")]
    Bright,
    #[serde(alias = "AB", alias = "ab")]
    Calm,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Frank => "frank",
            Self::Bright => "bright",
            Self::Calm => "calm",
        }
    }

    /// Short voice description used in persona prompts.
    pub fn voice(&self) -> &'static str {
        match self {
            Self::Warm => "a warm, caring friend who notices how the user feels",
            Self::Frank => "an honest, straightforward friend who says what they think",
            Self::Bright => "a cheerful, upbeat friend who bounces back quickly",
            Self::Calm => "a calm, composed friend who stays steady",
        }
    }
}

// ── Affect ─────────────────────────────────────────────────────

/// Pleasure / arousal / dominance, each in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AffectVector {
    pub p: f32,
    pub a: f32,
    pub d: f32,
}

impl AffectVector {
    /// Build a vector, clamping every axis.
    pub fn new(p: f32, a: f32, d: f32) -> Self {
        Self { p, a, d }.clamped()
    }

    /// Clamp all dimensions to [-1.0, 1.0]. NaN becomes 0.0.
    pub fn clamped(self) -> Self {
        Self {
            p: crate::identity::affect::clamp(self.p),
            a: crate::identity::affect::clamp(self.a),
            d: crate::identity::affect::clamp(self.d),
        }
    }

    pub fn is_bounded(&self) -> bool {
        [self.p, self.a, self.d]
            .iter()
            .all(|v| (-1.0..=1.0).contains(v))
    }
}

// ── Conversation ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One utterance in the short-term buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

// ── Structured reply ───────────────────────────────────────────

/// Facial-expression tag attached to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Normal,
    Smile,
    Happy,
    Sad,
    Angry,
    Surprised,
    Thinking,
    Shy,
    Error,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Smile => "smile",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Thinking => "thinking",
            Self::Shy => "shy",
            Self::Error => "error",
        }
    }

    /// Map a free-form tag; unknown tags become `Normal`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "smile" => Self::Smile,
            "happy" | "joy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "surprised" | "surprise" => Self::Surprised,
            "thinking" => Self::Thinking,
            "shy" => Self::Shy,
            "error" => Self::Error,
            _ => Self::Normal,
        }
    }
}

/// Body-animation tag attached to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    WaveHand,
    Nod,
    TiltHead,
    Clap,
    Bow,
    Think,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WaveHand => "wave_hand",
            Self::Nod => "nod",
            Self::TiltHead => "tilt_head",
            Self::Clap => "clap",
            Self::Bow => "bow",
            Self::Think => "think",
        }
    }

    /// Map a free-form tag; unknown tags become `None`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "wave_hand" | "wave" => Self::WaveHand,
            "nod" => Self::Nod,
            "tilt_head" => Self::TiltHead,
            "clap" => Self::Clap,
            "bow" => Self::Bow,
            "think" => Self::Think,
            _ => Self::None,
        }
    }
}

/// The single reply produced per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredReply {
    pub text: String,
    pub emotion: Emotion,
    pub action: Action,
}

impl StructuredReply {
    /// In-persona apology used when reply generation fails outright.
    pub fn apology(persona: Persona) -> Self {
        let text = match persona {
            Persona::Warm => "Sorry, something went wrong while I was thinking of a reply. Could you say that again?",
            Persona::Frank => "Sorry, I lost my train of thought there. Say that one more time?",
            Persona::Bright => "Oops, my head went blank for a second! Could you tell me again?",
            Persona::Calm => "Sorry, I couldn't put my reply together. Would you repeat that for me?",
        };
        Self {
            text: text.into(),
            emotion: Emotion::Sad,
            action: Action::None,
        }
    }
}

// ── Session ────────────────────────────────────────────────────

/// Persisted session snapshot (one cache entry per user/session pair).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub affect: AffectVector,
}

/// Identifies one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Cache key for the session snapshot.
    pub fn cache_key(&self) -> String {
        format!("supporter:context:{}:{}", self.user_id, self.session_id)
    }
}

// ── Long-term memory ───────────────────────────────────────────

/// A promoted fact. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

// ── Turn boundary ──────────────────────────────────────────────

/// Caller-supplied input for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub persona: Option<Persona>,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

/// Diagnostic bundle returned alongside the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub persona: Persona,
    pub ai_pad: AffectVector,
    pub user_pad: AffectVector,
    pub intent: String,
    pub thought: String,
    pub search_results: Option<String>,
    pub summary: String,
    pub active_tools: Vec<String>,
    pub generation_attempts: u32,
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub reply: StructuredReply,
    pub metadata: TurnMetadata,
}
