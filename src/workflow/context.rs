use crate::cli::{PipelineArgs, ProviderArgs, SourceArgs};
use crate::config::{self, ConfigOverrides, ToolConfig, LM_COMMAND_ENV};
use crate::lm::{self, ModelInvoker};
use crate::pipeline::{PipelineConfig, PipelineExecutor};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Read;

/// Resolved tool config plus the invoker it selects.
pub(crate) struct RunContext {
    pub(crate) config: ToolConfig,
    invoker: Box<dyn ModelInvoker>,
}

impl RunContext {
    pub(crate) fn load(args: &ProviderArgs) -> Result<Self> {
        let overrides = ConfigOverrides {
            config_path: args.config.clone(),
            lm_command: args.lm.clone(),
            provider: args.provider,
            model: args.model.clone(),
        };
        let config = config::resolve_config(&overrides, std::env::var(LM_COMMAND_ENV).ok())?;
        let invoker = lm::build_invoker(&config).context("build model invoker")?;
        Ok(Self { config, invoker })
    }

    pub(crate) fn invoker(&self) -> &dyn ModelInvoker {
        self.invoker.as_ref()
    }

    pub(crate) fn executor(&self) -> Result<PipelineExecutor<'_>> {
        PipelineExecutor::new(self.invoker(), self.config.request_options())
    }
}

impl PipelineArgs {
    /// Target languages in flag order with duplicates dropped.
    pub(crate) fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for target in &self.target_lang {
            let target = target.trim();
            if !target.is_empty() && !targets.iter().any(|t| t == target) {
                targets.push(target.to_string());
            }
        }
        targets
    }

    /// Build the framing for `target_lang`, reading any extra-context file.
    pub(crate) fn pipeline_config(&self, target_lang: &str) -> Result<PipelineConfig> {
        let extra_context = match (&self.extra_context, &self.extra_context_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("read extra context {}", path.display()))?,
            (None, None) => String::new(),
        };
        if self.source_lang.trim().is_empty() {
            return Err(anyhow!("--source-lang must be non-empty"));
        }
        Ok(PipelineConfig::new(
            self.source_lang.trim(),
            target_lang,
            self.song,
            &extra_context,
        ))
    }
}

impl SourceArgs {
    /// Source from `--text`, `--source-file`, or `fallback` when neither is set.
    pub(crate) fn read(&self, fallback: Option<&mut dyn Read>) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        if let Some(path) = &self.source_file {
            return fs::read_to_string(path)
                .with_context(|| format!("read source text {}", path.display()));
        }
        let mut text = String::new();
        if let Some(reader) = fallback {
            reader
                .read_to_string(&mut text)
                .context("read source text from stdin")?;
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn pipeline_args() -> PipelineArgs {
        PipelineArgs {
            source_lang: "English".to_string(),
            target_lang: vec![
                "French".to_string(),
                " Spanish ".to_string(),
                "French".to_string(),
            ],
            song: true,
            extra_context: None,
            extra_context_file: None,
        }
    }

    #[test]
    fn targets_are_trimmed_and_deduplicated() {
        assert_eq!(pipeline_args().targets(), vec!["French", "Spanish"]);
    }

    #[test]
    fn extra_context_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Sung at weddings.").unwrap();
        let args = PipelineArgs {
            extra_context_file: Some(file.path().to_path_buf()),
            ..pipeline_args()
        };
        let config = args.pipeline_config("German").unwrap();
        assert_eq!(config.extra_context, "Sung at weddings.");
        assert_eq!(config.target_lang, "German");
        assert!(config.is_song);
    }

    #[test]
    fn source_prefers_flags_over_stdin() {
        let args = SourceArgs {
            text: Some("Amazing grace".to_string()),
            source_file: None,
        };
        let mut stdin = Cursor::new("ignored");
        assert_eq!(args.read(Some(&mut stdin)).unwrap(), "Amazing grace");

        let args = SourceArgs::default();
        let mut stdin = Cursor::new("from stdin");
        assert_eq!(args.read(Some(&mut stdin)).unwrap(), "from stdin");
        assert_eq!(args.read(None).unwrap(), "");
    }

    #[test]
    fn missing_source_file_is_an_error() {
        let args = SourceArgs {
            text: None,
            source_file: Some("/nonexistent/tflow-source.txt".into()),
        };
        let err = args.read(None).unwrap_err();
        assert!(format!("{err:#}").contains("read source text"));
    }
}
