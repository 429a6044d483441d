//! Phase identities for the translation refinement sequence.
//!
//! Phases are a closed, totally ordered set; the store key pairs a phase with
//! its target language so several languages can share one session.
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One step of the fixed six-step refinement sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analysis,
    LiteralTranslation,
    Clarity,
    Backtranslation,
    Review,
    FinalTranslation,
}

impl Phase {
    /// Execution order. Every phase reads only artifacts of phases before it.
    pub const ALL: [Phase; 6] = [
        Phase::Analysis,
        Phase::LiteralTranslation,
        Phase::Clarity,
        Phase::Backtranslation,
        Phase::Review,
        Phase::FinalTranslation,
    ];

    /// Return the stable string identifier used on the CLI and in JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analysis => "analysis",
            Phase::LiteralTranslation => "literal_translation",
            Phase::Clarity => "clarity",
            Phase::Backtranslation => "backtranslation",
            Phase::Review => "review",
            Phase::FinalTranslation => "final_translation",
        }
    }

    /// Tag delimiting this phase's primary artifact in the model response.
    pub fn tag(&self) -> &'static str {
        match self {
            Phase::Analysis => "analysis",
            Phase::LiteralTranslation => "literal_translation",
            Phase::Clarity => "clear_translation",
            Phase::Backtranslation => "backtranslation",
            Phase::Review => "review",
            Phase::FinalTranslation => "final_translation",
        }
    }

    /// Extra tags extracted alongside the primary artifact.
    pub fn secondary_tags(&self, is_song: bool) -> &'static [&'static str] {
        match self {
            Phase::Clarity if is_song => &[SYLLABIFICATION_TAG],
            _ => &[],
        }
    }

    /// Human-readable heading for display.
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Analysis => "Analysis",
            Phase::LiteralTranslation => "Literal Translation",
            Phase::Clarity => "Clarity",
            Phase::Backtranslation => "Backtranslation",
            Phase::Review => "Review",
            Phase::FinalTranslation => "Final Translation",
        }
    }

    /// 1-based position in the sequence.
    pub fn ordinal(&self) -> usize {
        Phase::ALL
            .iter()
            .position(|phase| phase == self)
            .map(|idx| idx + 1)
            .unwrap_or_default()
    }
}

/// Secondary tag carrying stressed/unstressed syllables in song mode.
pub const SYLLABIFICATION_TAG: &str = "syllabification";

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        let phase = match normalized.as_str() {
            "analysis" => Phase::Analysis,
            "literal_translation" | "literal" => Phase::LiteralTranslation,
            "clarity" | "clear_translation" | "clarified" => Phase::Clarity,
            "backtranslation" | "back" => Phase::Backtranslation,
            "review" => Phase::Review,
            "final_translation" | "final" => Phase::FinalTranslation,
            _ => {
                if let Ok(ordinal) = normalized.parse::<usize>() {
                    if let Some(phase) = ordinal.checked_sub(1).and_then(|i| Phase::ALL.get(i)) {
                        return Ok(*phase);
                    }
                }
                return Err(anyhow!(
                    "unknown phase {raw:?} (expected one of: {})",
                    Phase::ALL
                        .iter()
                        .map(Phase::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        };
        Ok(phase)
    }
}

/// Store key: a phase namespaced by target language.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhaseKey {
    pub phase: Phase,
    pub target_lang: String,
}

impl PhaseKey {
    pub fn new(phase: Phase, target_lang: &str) -> Self {
        Self {
            phase,
            target_lang: target_lang.to_string(),
        }
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.phase, self.target_lang)
    }
}
