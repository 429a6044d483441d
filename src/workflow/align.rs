//! `tflow align`: line-align existing translations with the original, then
//! backtranslate the aligned text in the same conversation.
use super::context::RunContext;
use crate::cli::AlignArgs;
use crate::lm::{
    collect_fragments, Message, ModelInput, ModelInvoker, ModelRequest, RequestOptions,
};
use crate::pipeline::{Computed, MemoStore};
use crate::prompts;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AlignStep {
    Align,
    Backtranslate,
}

impl fmt::Display for AlignStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlignStep::Align => "align",
            AlignStep::Backtranslate => "align_backtranslation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AlignReport {
    pub(crate) aligned: String,
    pub(crate) backtranslation: String,
    /// Model calls issued for this report.
    pub(crate) invocations: usize,
}

pub(crate) struct Aligner<'a> {
    invoker: &'a dyn ModelInvoker,
    options: RequestOptions,
}

impl<'a> Aligner<'a> {
    pub(crate) fn new(invoker: &'a dyn ModelInvoker, options: RequestOptions) -> Result<Self> {
        options.validate().context("validate request options")?;
        Ok(Self { invoker, options })
    }

    /// Run both steps; either one is reused when its rendered request is
    /// unchanged.
    pub(crate) fn run(
        &self,
        store: &mut MemoStore<AlignStep>,
        source_lang: &str,
        target_lang: &str,
        original: &str,
        translations: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<AlignReport> {
        if original.trim().is_empty() || translations.trim().is_empty() {
            return Err(anyhow!("alignment needs both original text and translations"));
        }
        let mut invocations = 0;

        let align = prompts::align(source_lang, original, translations);
        let input = ModelInput::Prompt(align.prompt.clone());
        let request = ModelRequest::new(input, self.options.clone().with_system(align.system))?;
        let (entry, lookup) = store.get_or_compute(
            &AlignStep::Align,
            &memo_key(&request),
            false,
            |_| self.complete(&request, &mut *on_fragment),
        )?;
        let aligned = entry.last_result.clone();
        if !lookup.is_hit() {
            invocations += 1;
        }

        let back = prompts::align_backtranslation(source_lang, target_lang, &aligned);
        let input = ModelInput::Messages(vec![
            Message::user(align.prompt),
            Message::assistant(aligned.as_str()),
            Message::user(back.prompt),
        ]);
        let request = ModelRequest::new(input, self.options.clone().with_system(back.system))?;
        let (entry, lookup) = store.get_or_compute(
            &AlignStep::Backtranslate,
            &memo_key(&request),
            false,
            |_| self.complete(&request, &mut *on_fragment),
        )?;
        let backtranslation = entry.last_result.clone();
        if !lookup.is_hit() {
            invocations += 1;
        }

        Ok(AlignReport {
            aligned,
            backtranslation,
            invocations,
        })
    }

    fn complete(
        &self,
        request: &ModelRequest,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<Computed> {
        let start = Instant::now();
        let fragments = self.invoker.invoke(request).context("invoke model for alignment")?;
        let raw = collect_fragments(fragments, on_fragment)?;
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = raw.len(),
            "alignment step computed"
        );
        Ok(Computed::new(raw.trim()))
    }
}

/// System text plus every turn, so a change to any of them invalidates.
fn memo_key(request: &ModelRequest) -> String {
    let mut key = request.options.system.clone().unwrap_or_default();
    for message in request.input.to_messages() {
        key.push_str("\n\n");
        key.push_str(message.role.as_str());
        key.push_str(": ");
        key.push_str(&message.content);
    }
    key
}

pub fn run_align(args: &AlignArgs) -> Result<()> {
    let original = fs::read_to_string(&args.original)
        .with_context(|| format!("read original {}", args.original.display()))?;
    let translations = fs::read_to_string(&args.translations)
        .with_context(|| format!("read translations {}", args.translations.display()))?;

    let context = RunContext::load(&args.provider)?;
    let aligner = Aligner::new(context.invoker(), context.config.request_options())?;
    let mut store = MemoStore::new();
    let stream = args.stream;
    let report = aligner.run(
        &mut store,
        &args.source_lang,
        &args.target_lang,
        &original,
        &translations,
        &mut |fragment: &str| {
            if stream {
                let mut stderr = io::stderr().lock();
                stderr.write_all(fragment.as_bytes()).ok();
                stderr.flush().ok();
            }
        },
    )?;
    tracing::info!(invocations = report.invocations, "align complete");

    println!("== Aligned ({}) ==", args.target_lang);
    println!("{}", report.aligned);
    println!();
    println!("== Backtranslation ({}) ==", args.source_lang);
    println!("{}", report.backtranslation);
    println!();
    println!("== Original ({}) ==", args.source_lang);
    println!("{}", original.trim_end());
    Ok(())
}
