//! Memoized six-phase translation pipeline.
//!
//! The store decides per phase whether to call the model; the executor threads
//! artifacts forward in fixed order and applies redo, edit and feedback-seed
//! actions.
mod executor;
mod state;

pub use executor::{
    seed_feedback, NullObserver, PipelineExecutor, PipelineObserver, RunOutcome, RunReport,
};
pub use state::{Computed, MemoStore, PipelineState};

use crate::phase::Phase;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Inputs fixed for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub source_lang: String,
    pub target_lang: String,
    pub is_song: bool,
    pub extra_context: String,
}

impl PipelineConfig {
    pub fn new(source_lang: &str, target_lang: &str, is_song: bool, extra_context: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            is_song,
            extra_context: extra_context.to_string(),
        }
    }

    /// Same framing, different target language.
    pub fn for_target(&self, target_lang: &str) -> Self {
        Self {
            target_lang: target_lang.to_string(),
            ..self.clone()
        }
    }
}

/// User actions applied during one run.
#[derive(Debug, Clone, Default)]
pub struct RunActions {
    /// Phases to recompute regardless of cache state.
    pub redo: BTreeSet<Phase>,
    /// Replacement results applied just before each phase's lookup.
    pub edits: BTreeMap<Phase, String>,
}

impl RunActions {
    pub fn is_empty(&self) -> bool {
        self.redo.is_empty() && self.edits.is_empty()
    }
}

/// How a phase's result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Cached,
    Computed,
}

/// Extracted phase output passed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub phase: Phase,
    pub text: String,
    pub source: ArtifactSource,
}
