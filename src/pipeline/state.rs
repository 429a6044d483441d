//! Session-scoped memoization store.
//!
//! An entry is recomputed exactly when it is absent, forced, or its recorded
//! prompt differs from the one just built. Prompts embed their upstream
//! artifacts verbatim, so the prompt text is the whole invalidation key and no
//! dependency graph is tracked.
//!
//! Overrides (manual edits and feedback seeds) replace `last_result` but keep
//! `last_prompt`, so an override survives reruns until upstream inputs change.
use crate::phase::PhaseKey;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Last prompt and last result recorded for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<K> {
    pub key: K,
    pub last_prompt: String,
    pub last_result: String,
    /// Secondary extracted sections (e.g. syllabification), cleared on override.
    pub extras: BTreeMap<String, String>,
}

/// Output of a successful computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Computed {
    pub result: String,
    pub extras: BTreeMap<String, String>,
}

impl Computed {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            extras: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Forced,
    PromptChanged,
}

/// Cache decision for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss(MissReason),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit)
    }
}

/// Keyed table of cache entries owned by exactly one session.
#[derive(Debug, Clone)]
pub struct MemoStore<K> {
    entries: BTreeMap<K, CacheEntry<K>>,
}

/// Store for the translation pipeline, keyed by phase and target language.
pub type PipelineState = MemoStore<PhaseKey>;

impl<K> Default for MemoStore<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + fmt::Display> MemoStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &K) -> Option<&CacheEntry<K>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether `key` needs recomputing for `prompt`.
    pub fn lookup(&self, key: &K, prompt: &str, force: bool) -> Lookup {
        match self.entries.get(key) {
            None => Lookup::Miss(MissReason::Absent),
            Some(_) if force => Lookup::Miss(MissReason::Forced),
            Some(entry) if entry.last_prompt != prompt => Lookup::Miss(MissReason::PromptChanged),
            Some(_) => Lookup::Hit,
        }
    }

    /// Return the entry for `key`, running `compute` only on a miss.
    ///
    /// A failed computation leaves any previous entry untouched.
    pub fn get_or_compute<F>(
        &mut self,
        key: &K,
        prompt: &str,
        force: bool,
        compute: F,
    ) -> Result<(&CacheEntry<K>, Lookup)>
    where
        F: FnOnce(&str) -> Result<Computed>,
    {
        let decision = self.lookup(key, prompt, force);
        match decision {
            Lookup::Hit => tracing::debug!(%key, "cache hit"),
            Lookup::Miss(reason) => {
                tracing::debug!(%key, ?reason, "cache miss");
                let computed = compute(prompt)?;
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        key: key.clone(),
                        last_prompt: prompt.to_string(),
                        last_result: computed.result,
                        extras: computed.extras,
                    },
                );
            }
        }
        match self.entries.get(key) {
            Some(entry) => Ok((entry, decision)),
            None => Err(anyhow!("no cache entry for {key} after lookup")),
        }
    }

    /// Replace the stored result for `key`, keeping its recorded prompt.
    pub fn override_result(&mut self, key: &K, result: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| anyhow!("nothing computed yet for {key}; run it before editing"))?;
        entry.last_result = result.into();
        entry.extras.clear();
        tracing::debug!(%key, "result overridden");
        Ok(())
    }

    /// Copy `from`'s result into `to` through the override path.
    ///
    /// `to` keeps its recorded prompt, so on the next run it is a cache hit
    /// returning the seeded text while everything reading it recomputes.
    pub fn reseed(&mut self, from: &K, to: &K) -> Result<()> {
        let seeded = self
            .entries
            .get(from)
            .map(|entry| entry.last_result.clone())
            .ok_or_else(|| anyhow!("cannot seed from {from}: nothing computed yet"))?;
        self.override_result(to, seeded)?;
        tracing::info!(%from, %to, "reseeded cache slot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use std::cell::Cell;

    fn key(phase: Phase) -> PhaseKey {
        PhaseKey::new(phase, "French")
    }

    fn counting<'a>(
        counter: &'a Cell<usize>,
        text: &str,
    ) -> impl FnOnce(&str) -> Result<Computed> + 'a {
        let text = text.to_string();
        move |_| {
            counter.set(counter.get() + 1);
            Ok(Computed::new(text))
        }
    }

    #[test]
    fn identical_prompt_is_a_hit_without_compute() {
        let mut store = PipelineState::new();
        let calls = Cell::new(0);
        let k = key(Phase::Analysis);

        let (entry, lookup) = store
            .get_or_compute(&k, "prompt", false, counting(&calls, "first"))
            .unwrap();
        assert_eq!(lookup, Lookup::Miss(MissReason::Absent));
        assert_eq!(entry.last_result, "first");

        let (entry, lookup) = store
            .get_or_compute(&k, "prompt", false, counting(&calls, "second"))
            .unwrap();
        assert!(lookup.is_hit());
        assert_eq!(entry.last_result, "first");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn changed_prompt_recomputes() {
        let mut store = PipelineState::new();
        let calls = Cell::new(0);
        let k = key(Phase::Review);
        store
            .get_or_compute(&k, "v1", false, counting(&calls, "a"))
            .unwrap();
        let (entry, lookup) = store
            .get_or_compute(&k, "v2", false, counting(&calls, "b"))
            .unwrap();
        assert_eq!(lookup, Lookup::Miss(MissReason::PromptChanged));
        assert_eq!(entry.last_prompt, "v2");
        assert_eq!(entry.last_result, "b");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn force_recomputes_identical_prompt() {
        let mut store = PipelineState::new();
        let calls = Cell::new(0);
        let k = key(Phase::Clarity);
        store
            .get_or_compute(&k, "same", false, counting(&calls, "a"))
            .unwrap();
        let (entry, lookup) = store
            .get_or_compute(&k, "same", true, counting(&calls, "b"))
            .unwrap();
        assert_eq!(lookup, Lookup::Miss(MissReason::Forced));
        assert_eq!(entry.last_result, "b");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn override_persists_for_same_prompt_only() {
        let mut store = PipelineState::new();
        let calls = Cell::new(0);
        let k = key(Phase::Review);
        store
            .get_or_compute(&k, "p", false, counting(&calls, "model"))
            .unwrap();
        store.override_result(&k, "human").unwrap();
        assert_eq!(store.entry(&k).unwrap().last_prompt, "p");

        let (entry, _) = store
            .get_or_compute(&k, "p", false, counting(&calls, "again"))
            .unwrap();
        assert_eq!(entry.last_result, "human");
        assert_eq!(calls.get(), 1);

        let (entry, _) = store
            .get_or_compute(&k, "p2", false, counting(&calls, "fresh"))
            .unwrap();
        assert_eq!(entry.last_result, "fresh");
    }

    #[test]
    fn override_clears_extras() {
        let mut store = PipelineState::new();
        let k = key(Phase::Clarity);
        store
            .get_or_compute(&k, "p", false, |_| {
                let mut computed = Computed::new("clear");
                computed
                    .extras
                    .insert("syllabification".to_string(), "CLEAR".to_string());
                Ok(computed)
            })
            .unwrap();
        assert_eq!(store.entry(&k).unwrap().extras.len(), 1);
        store.override_result(&k, "edited").unwrap();
        assert!(store.entry(&k).unwrap().extras.is_empty());
    }

    #[test]
    fn override_of_absent_entry_is_rejected() {
        let mut store = PipelineState::new();
        assert!(store.override_result(&key(Phase::Review), "x").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn failed_compute_leaves_previous_entry() {
        let mut store = PipelineState::new();
        let k = key(Phase::Backtranslation);
        store
            .get_or_compute(&k, "p1", false, |_| Ok(Computed::new("kept")))
            .unwrap();
        let err = store
            .get_or_compute(&k, "p2", false, |_| Err(anyhow!("rate limited")))
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        let entry = store.entry(&k).unwrap();
        assert_eq!(entry.last_prompt, "p1");
        assert_eq!(entry.last_result, "kept");
    }

    #[test]
    fn reseed_copies_result_and_keeps_target_prompt() {
        let mut store = PipelineState::new();
        let clarity = key(Phase::Clarity);
        let last = key(Phase::FinalTranslation);
        store
            .get_or_compute(&clarity, "clarity-prompt", false, |_| Ok(Computed::new("draft")))
            .unwrap();
        store
            .get_or_compute(&last, "final-prompt", false, |_| Ok(Computed::new("polished")))
            .unwrap();

        store.reseed(&last, &clarity).unwrap();
        let entry = store.entry(&clarity).unwrap();
        assert_eq!(entry.last_result, "polished");
        assert_eq!(entry.last_prompt, "clarity-prompt");
        assert!(store.lookup(&clarity, "clarity-prompt", false).is_hit());
    }

    #[test]
    fn reseed_requires_both_slots() {
        let mut store = PipelineState::new();
        let clarity = key(Phase::Clarity);
        let last = key(Phase::FinalTranslation);
        assert!(store.reseed(&last, &clarity).is_err());
        store
            .get_or_compute(&last, "f", false, |_| Ok(Computed::new("x")))
            .unwrap();
        assert!(store.reseed(&last, &clarity).is_err());
    }

    #[test]
    fn languages_do_not_share_entries() {
        let mut store = PipelineState::new();
        let french = PhaseKey::new(Phase::Analysis, "French");
        let spanish = PhaseKey::new(Phase::Analysis, "Spanish");
        store
            .get_or_compute(&french, "p", false, |_| Ok(Computed::new("fr")))
            .unwrap();
        assert_eq!(
            store.lookup(&spanish, "p", false),
            Lookup::Miss(MissReason::Absent)
        );
        assert_eq!(store.len(), 1);
    }
}
