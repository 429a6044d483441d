//! Deterministic invoker for unit tests.
use super::{Fragments, ModelInvoker, ModelRequest};
use crate::phase::Phase;
use anyhow::Result;
use std::cell::RefCell;

type Responder = Box<dyn Fn(&ModelRequest, usize) -> Result<String>>;

/// Records every request and answers through a responder closure.
///
/// Responses are streamed back in word-sized fragments.
pub struct ScriptedInvoker {
    responder: Responder,
    requests: RefCell<Vec<ModelRequest>>,
}

impl ScriptedInvoker {
    pub fn new(responder: impl Fn(&ModelRequest, usize) -> Result<String> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Answer each phase with `<tag>{phase} #{call}</tag>`, so any upstream
    /// recompute also changes downstream prompts.
    pub fn tagged() -> Self {
        Self::new(|request, call| {
            let phase = phase_for_prompt(&prompt_text(request)).unwrap_or(Phase::Analysis);
            Ok(format!(
                "Sure.\n<{tag}>{phase} #{call}</{tag}>\ntrailing notes",
                tag = phase.tag()
            ))
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.borrow().clone()
    }

    /// Phases invoked so far, in call order.
    pub fn phases(&self) -> Vec<Phase> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|request| phase_for_prompt(&prompt_text(request)))
            .collect()
    }
}

pub fn prompt_text(request: &ModelRequest) -> String {
    request
        .input
        .to_messages()
        .into_iter()
        .map(|m| m.content)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Identify a phase by its closing instruction.
pub fn phase_for_prompt(prompt: &str) -> Option<Phase> {
    let markers = [
        (Phase::FinalTranslation, "inside <final_translation> tags"),
        (Phase::Review, "Place your review inside <review> tags"),
        (Phase::Backtranslation, "inside <backtranslation> tags"),
        (Phase::Clarity, "inside <clear_translation>"),
        (Phase::LiteralTranslation, "inside <literal_translation> tags"),
        (Phase::Analysis, "inside <analysis> tags"),
    ];
    markers
        .iter()
        .find(|(_, marker)| prompt.contains(marker))
        .map(|(phase, _)| *phase)
}

impl ModelInvoker for ScriptedInvoker {
    fn invoke(&self, request: &ModelRequest) -> Result<Fragments<'_>> {
        let call = self.calls() + 1;
        self.requests.borrow_mut().push(request.clone());
        let text = (self.responder)(request, call)?;
        let fragments: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();
        Ok(Box::new(fragments.into_iter()))
    }
}
