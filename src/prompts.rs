//! Prompt assembly for each phase.
//!
//! Templates live in `prompts/` and are compiled in. Every prompt is a pure
//! function of the pipeline config and upstream artifacts, which is what lets
//! the prompt text double as the cache invalidation key.
use crate::pipeline::PipelineConfig;

const CONTEXT_TEXT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/context_text.md"));
const CONTEXT_SONG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/context_song.md"));
const EXTRA_CONTEXT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/extra_context.md"));
const ANALYSIS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/analysis.md"));
const LITERAL_TRANSLATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/literal_translation.md"
));
const CLARITY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/clarity.md"));
const BACKTRANSLATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/backtranslation.md"
));
const REVIEW: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/review.md"));
const FINAL_TRANSLATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/final_translation.md"
));
const ALIGN_SYSTEM: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/align_system.md"));
const ALIGN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/align.md"));
const ALIGN_BACKTRANSLATION_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/align_backtranslation_system.md"
));
const ALIGN_BACKTRANSLATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/align_backtranslation.md"
));

const STRESS_SAMPLE: &str = "Also, for each line in a representative sample of each section of the song (verse, chorus, bridge, etc.), show the stressed and unstressed syllables. For example, \"a-MA-zing GRACE, how SWEET the SOUND\"; \"He who is MIGHTy has DONE a great THING\".";
const HEADING_RULE: &str =
    "If a stanza has a heading (like Chorus 2 or Bridge), include it in the output *without translation*. ";
const SYLLABIFICATION_RULE: &str = "Then, inside <syllabification> </syllabification> tags, repeat the entire translation but writing STRESSED and unstressed syllables as was done in the analysis above.";

/// Prompt text plus optional system text for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub system: Option<String>,
}

impl BuiltPrompt {
    fn user(prompt: String) -> Self {
        Self {
            prompt,
            system: None,
        }
    }
}

/// Substitute `{name}` placeholders in a single left-to-right pass.
///
/// Inserted values are never rescanned, so user text containing braces is
/// copied through verbatim. Unknown placeholders are left as-is.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let resolved = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match resolved {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| format!("{}. {item}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared framing prefixed to every phase prompt.
pub fn context_preamble(config: &PipelineConfig) -> String {
    let template = if config.is_song {
        CONTEXT_SONG
    } else {
        CONTEXT_TEXT
    };
    let mut preamble = fill(
        template,
        &[
            ("source_lang", config.source_lang.as_str()),
            ("target_lang", config.target_lang.as_str()),
        ],
    );
    if !config.extra_context.trim().is_empty() {
        preamble.push_str(&fill(
            EXTRA_CONTEXT,
            &[("extra_context", config.extra_context.as_str())],
        ));
    }
    preamble
}

/// Per-run prompt builder; the context preamble is computed once.
pub struct PromptBuilder<'a> {
    config: &'a PipelineConfig,
    source_text: &'a str,
    context: String,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a PipelineConfig, source_text: &'a str) -> Self {
        Self {
            config,
            source_text,
            context: context_preamble(config),
        }
    }

    fn item_type(&self, song: &'static str, text: &'static str) -> &'static str {
        if self.config.is_song {
            song
        } else {
            text
        }
    }

    pub fn analysis(&self) -> BuiltPrompt {
        let cfg = self.config;
        let mut aspects = vec![
            format!(
                "Theological concepts and terminology, including any specific references to scripture or doctrine. For each concept or reference, describe it in {} and {}, including a complete quote in {} if applicable.",
                cfg.source_lang, cfg.target_lang, cfg.target_lang
            ),
            "Cultural references".to_string(),
            "Key metaphors and imagery".to_string(),
            "Potential translation challenges".to_string(),
        ];
        if cfg.is_song {
            aspects.push("Poetic devices (rhyme scheme, meter, alliteration)".to_string());
        }
        let aspects = numbered(&aspects);
        let stress_section = if cfg.is_song {
            format!("\n{STRESS_SAMPLE}\n")
        } else {
            String::new()
        };
        BuiltPrompt::user(fill(
            ANALYSIS,
            &[
                ("context", self.context.as_str()),
                ("source_text", self.source_text),
                ("aspects", aspects.as_str()),
                ("stress_section", stress_section.as_str()),
            ],
        ))
    }

    pub fn literal_translation(&self) -> BuiltPrompt {
        let heading_rule = if self.config.is_song { HEADING_RULE } else { "" };
        BuiltPrompt::user(fill(
            LITERAL_TRANSLATION,
            &[
                ("context", self.context.as_str()),
                ("item_type", self.item_type("lyrics", "text")),
                ("target_lang", self.config.target_lang.as_str()),
                ("source_text", self.source_text),
                ("heading_rule", heading_rule),
            ],
        ))
    }

    pub fn clarity(&self, analysis: &str, literal_translation: &str) -> BuiltPrompt {
        let syllabification_rule = if self.config.is_song {
            format!("\n{SYLLABIFICATION_RULE}\n")
        } else {
            String::new()
        };
        BuiltPrompt::user(fill(
            CLARITY,
            &[
                ("context", self.context.as_str()),
                (
                    "characteristics",
                    self.item_type("singable, poetic", "clear, simple"),
                ),
                ("target_lang", self.config.target_lang.as_str()),
                ("source_text", self.source_text),
                ("analysis", analysis),
                ("literal_translation", literal_translation),
                ("syllabification_rule", syllabification_rule.as_str()),
            ],
        ))
    }

    pub fn backtranslation(&self, clarified_translation: &str) -> BuiltPrompt {
        BuiltPrompt::user(fill(
            BACKTRANSLATION,
            &[
                ("context", self.context.as_str()),
                ("source_lang", self.config.source_lang.as_str()),
                ("clarified_translation", clarified_translation),
            ],
        ))
    }

    /// `syllabification` is only rendered in song mode.
    pub fn review(
        &self,
        clarified_translation: &str,
        backtranslation: &str,
        syllabification: Option<&str>,
    ) -> BuiltPrompt {
        let mut criteria = vec![
            "Accuracy of meaning".to_string(),
            "Preservation of theological concepts".to_string(),
            "Cultural appropriateness".to_string(),
            "Areas for potential improvement".to_string(),
        ];
        let mut syllabification_block = String::new();
        if self.config.is_song {
            criteria.push("How well it can be sung to the original tune".to_string());
            if let Some(syllabification) = syllabification {
                syllabification_block =
                    format!("\n<syllabification>\n{syllabification}\n</syllabification>\n");
            }
        }
        let criteria = numbered(&criteria);
        BuiltPrompt::user(fill(
            REVIEW,
            &[
                ("context", self.context.as_str()),
                ("criteria", criteria.as_str()),
                ("source_text", self.source_text),
                ("clarified_translation", clarified_translation),
                ("backtranslation", backtranslation),
                ("syllabification_block", syllabification_block.as_str()),
            ],
        ))
    }

    pub fn final_translation(
        &self,
        analysis: &str,
        clarified_translation: &str,
        review: &str,
    ) -> BuiltPrompt {
        BuiltPrompt::user(fill(
            FINAL_TRANSLATION,
            &[
                ("context", self.context.as_str()),
                ("item_type", self.item_type("song", "text")),
                ("target_lang", self.config.target_lang.as_str()),
                ("source_text", self.source_text),
                ("analysis", analysis),
                ("clarified_translation", clarified_translation),
                ("review", review),
            ],
        ))
    }
}

/// Align existing translations line by line with the original.
pub fn align(source_lang: &str, original: &str, translations: &str) -> BuiltPrompt {
    BuiltPrompt {
        prompt: fill(
            ALIGN,
            &[("original", original), ("translations", translations)],
        ),
        system: Some(fill(ALIGN_SYSTEM, &[("source_lang", source_lang)])),
    }
}

/// Follow-up turn asking for a literal backtranslation of the aligned text.
pub fn align_backtranslation(source_lang: &str, target_lang: &str, aligned: &str) -> BuiltPrompt {
    BuiltPrompt {
        prompt: fill(
            ALIGN_BACKTRANSLATION,
            &[("target_lang", target_lang), ("aligned", aligned)],
        ),
        system: Some(fill(
            ALIGN_BACKTRANSLATION_SYSTEM,
            &[("target_lang", target_lang), ("source_lang", source_lang)],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_config() -> PipelineConfig {
        PipelineConfig::new("English", "French", false, "")
    }

    fn song_config() -> PipelineConfig {
        PipelineConfig::new("English", "Spanish", true, "Sung at weddings")
    }

    fn all_prompts(builder: &PromptBuilder<'_>) -> Vec<BuiltPrompt> {
        vec![
            builder.analysis(),
            builder.literal_translation(),
            builder.clarity("A", "L"),
            builder.backtranslation("C"),
            builder.review("C", "B", Some("S")),
            builder.final_translation("A", "C", "R"),
        ]
    }

    #[test]
    fn fill_is_single_pass() {
        let out = fill(
            "{a} and {b} and {missing}",
            &[("a", "{b}"), ("b", "two")],
        );
        assert_eq!(out, "{b} and two and {missing}");
    }

    #[test]
    fn fill_leaves_unbalanced_braces() {
        assert_eq!(fill("open { only", &[("x", "y")]), "open { only");
    }

    #[test]
    fn every_prompt_starts_with_preamble() {
        let config = text_config();
        let builder = PromptBuilder::new(&config, "Amazing grace");
        let preamble = context_preamble(&config);
        for built in all_prompts(&builder) {
            assert!(built.prompt.starts_with(&preamble));
            assert!(built.system.is_none());
        }
        assert!(preamble.contains("a text from English to French"));
        assert!(!preamble.contains("<extra_context>"));
    }

    #[test]
    fn extra_context_is_delimited_verbatim() {
        let config = song_config();
        let preamble = context_preamble(&config);
        assert!(preamble.contains("worship song from English to Spanish"));
        assert!(preamble.contains("<extra_context>\nSung at weddings\n</extra_context>"));
    }

    #[test]
    fn blank_extra_context_is_omitted() {
        let config = PipelineConfig::new("English", "French", false, "  \n ");
        assert!(!context_preamble(&config).contains("extra_context"));
    }

    #[test]
    fn song_sections_only_in_song_mode() {
        let text = text_config();
        let song = song_config();
        let text_builder = PromptBuilder::new(&text, "Amazing grace");
        let song_builder = PromptBuilder::new(&song, "Amazing grace");

        assert!(!text_builder.analysis().prompt.contains("Poetic devices"));
        assert!(song_builder.analysis().prompt.contains("5. Poetic devices"));
        assert!(song_builder.analysis().prompt.contains("a-MA-zing GRACE"));

        assert!(!text_builder.clarity("A", "L").prompt.contains("<syllabification>"));
        assert!(song_builder.clarity("A", "L").prompt.contains("<syllabification>"));
        assert!(song_builder.clarity("A", "L").prompt.contains("singable, poetic Spanish"));
        assert!(text_builder.clarity("A", "L").prompt.contains("clear, simple French"));

        let song_review = song_builder.review("C", "B", Some("a-MOR")).prompt;
        assert!(song_review.contains("<syllabification>\na-MOR\n</syllabification>"));
        assert!(song_review.contains("5. How well it can be sung"));
        let text_review = text_builder.review("C", "B", Some("ignored")).prompt;
        assert!(!text_review.contains("ignored"));
    }

    #[test]
    fn upstream_artifacts_are_embedded_verbatim() {
        let config = text_config();
        let builder = PromptBuilder::new(&config, "Amazing grace");
        let clarity = builder.clarity("ANALYSIS-X", "LITERAL-Y").prompt;
        assert!(clarity.contains("<analysis>\nANALYSIS-X\n</analysis>"));
        assert!(clarity.contains("<literal_translation>\nLITERAL-Y\n</literal_translation>"));
        assert!(clarity.contains("<original>\nAmazing grace\n</original>"));

        let back = builder.backtranslation("CLEAR-Z").prompt;
        assert!(back.contains("<translation>\nCLEAR-Z\n</translation>"));
        assert!(back.contains("literally into English"));

        let final_prompt = builder.final_translation("A1", "C1", "R1").prompt;
        assert!(final_prompt.contains("<review>\nR1\n</review>"));
        assert!(final_prompt.contains("translation of the text into French"));
    }

    #[test]
    fn changing_an_upstream_artifact_changes_the_prompt() {
        let config = text_config();
        let builder = PromptBuilder::new(&config, "Amazing grace");
        assert_ne!(builder.clarity("A", "L"), builder.clarity("A2", "L"));
        assert_ne!(builder.backtranslation("C"), builder.backtranslation("C2"));
        assert_ne!(builder.review("C", "B", None), builder.review("C", "B2", None));
        assert_ne!(
            builder.final_translation("A", "C", "R"),
            builder.final_translation("A", "C", "R2")
        );
    }

    #[test]
    fn braces_in_source_text_are_not_substituted() {
        let config = text_config();
        let builder = PromptBuilder::new(&config, "literal {target_lang} braces");
        let prompt = builder.literal_translation().prompt;
        assert!(prompt.contains("<source_text>\nliteral {target_lang} braces\n</source_text>"));
    }

    #[test]
    fn prompts_name_their_output_tag() {
        let config = text_config();
        let builder = PromptBuilder::new(&config, "Amazing grace");
        let prompts = all_prompts(&builder);
        for (built, phase) in prompts.iter().zip(crate::phase::Phase::ALL) {
            assert!(
                built.prompt.contains(&format!("<{}>", phase.tag())),
                "{phase} prompt lacks its tag"
            );
        }
    }

    #[test]
    fn align_prompts_carry_system_text() {
        let aligned = align("English", "Amazing grace", "Grâce infinie");
        assert!(aligned.prompt.contains("Original text:\nAmazing grace"));
        assert!(aligned.prompt.contains("Grâce infinie"));
        let system = aligned.system.unwrap();
        assert!(system.contains("For each English line"));

        let back = align_backtranslation("English", "French", "Grâce infinie");
        assert!(back.prompt.contains("this French text:\n\nGrâce infinie"));
        let system = back.system.unwrap();
        assert!(system.contains("French text into English"));
        assert!(!system.contains('{'));
    }
}
