//! Affect model: clamping, bounded per-turn drift, and qualitative mood bands.

use crate::types::{AffectVector, Persona};

/// Default maximum per-axis change of the agent's affect in one turn.
pub const DEFAULT_DRIFT_BOUND: f32 = 0.1;
/// Band edge below which an axis reads as "low".
const LOW_EDGE: f32 = -0.5;
/// Band edge above which an axis reads as "high".
const HIGH_EDGE: f32 = 0.5;

/// Clamp a value to [-1.0, 1.0]. NaN maps to 0.0.
pub fn clamp(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}

/// Clamp an untyped value coming from model output.
///
/// Numbers and numeric strings are clamped; anything else (missing, null,
/// prose, objects) maps to 0.0. Never fails.
pub fn clamp_value(value: Option<&serde_json::Value>) -> f32 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map(|v| clamp(v as f32)).unwrap_or(0.0)
}

/// Read a PAD triple out of a decoded model object.
/// Accepts short (`p`/`a`/`d`) or long (`pleasure`/`arousal`/`dominance`) keys.
pub fn vector_from_fields(fields: &serde_json::Map<String, serde_json::Value>) -> AffectVector {
    let pick = |short: &str, long: &str| clamp_value(fields.get(short).or_else(|| fields.get(long)));
    AffectVector {
        p: pick("p", "pleasure"),
        a: pick("a", "arousal"),
        d: pick("d", "dominance"),
    }
}

/// Per-axis movement limits, as multiples of the drift bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disposition {
    pub pleasure_up: f32,
    pub pleasure_down: f32,
    pub arousal: f32,
    pub dominance: f32,
}

impl Disposition {
    const NEUTRAL: Self = Self {
        pleasure_up: 1.0,
        pleasure_down: 1.0,
        arousal: 1.0,
        dominance: 1.0,
    };

    pub fn for_persona(persona: Persona) -> Self {
        match persona {
            // resilient: recovers pleasure twice as fast
            Persona::Bright => Self { pleasure_up: 2.0, ..Self::NEUTRAL },
            // steady: arousal moves at half speed
            Persona::Calm => Self { arousal: 0.5, ..Self::NEUTRAL },
            Persona::Warm | Persona::Frank => Self::NEUTRAL,
        }
    }
}

/// What the model proposed for the agent's next affect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AffectProposal {
    /// Absolute target state.
    Target(AffectVector),
    /// Relative change from the current state.
    Delta(AffectVector),
}

/// Move `current` toward the proposal, never more than the persona's
/// allowance per axis, and clamp the result.
pub fn update(
    current: AffectVector,
    proposal: AffectProposal,
    persona: Persona,
    bound: f32,
) -> AffectVector {
    let current = current.clamped();
    let target = match proposal {
        AffectProposal::Target(t) => t.clamped(),
        AffectProposal::Delta(d) => AffectVector {
            p: current.p + clamp(d.p),
            a: current.a + clamp(d.a),
            d: current.d + clamp(d.d),
        }
        .clamped(),
    };
    let bound = bound.abs();
    let disp = Disposition::for_persona(persona);

    AffectVector {
        p: step(current.p, target.p, bound * disp.pleasure_up, bound * disp.pleasure_down),
        a: step(current.a, target.a, bound * disp.arousal, bound * disp.arousal),
        d: step(current.d, target.d, bound * disp.dominance, bound * disp.dominance),
    }
}

/// Move one axis toward `target` by at most `max_up` / `max_down`.
fn step(current: f32, target: f32, max_up: f32, max_down: f32) -> f32 {
    let delta = (target - current).clamp(-max_down, max_up);
    clamp(current + delta)
}

/// Qualitative band of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    pub fn of(v: f32) -> Self {
        let v = clamp(v);
        if v < LOW_EDGE {
            Self::Low
        } else if v > HIGH_EDGE {
            Self::High
        } else {
            Self::Mid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

/// Human-readable mood line for prompt construction.
pub fn mood_descriptor(v: AffectVector) -> String {
    format!(
        "pleasure {}, arousal {}, dominance {}",
        Band::of(v.p).as_str(),
        Band::of(v.a).as_str(),
        Band::of(v.d).as_str()
    )
}
