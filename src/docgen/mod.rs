//! Structured document generation with a bounded completeness repair loop.
//!
//! Generation is a fixed sequence of at most [`MAX_MODEL_CALLS`] model calls:
//!
//! ```text
//! pass 1 ──complete──▶ done
//!   │ incomplete
//!   ▼
//! targeted retry (full document, missing sections listed) ──complete──▶ done
//!   │ incomplete
//!   ▼
//! section-only retry (appended to the best draft) ──complete──▶ done
//!   │ incomplete
//!   ▼
//! Error::IncompleteGeneration { missing }
//! ```
//!
//! A draft with gaps never leaves this module as a success. Modification of
//! an existing document follows the same shape with a single retry.

pub mod template;
pub mod validate;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::llm::{ChatClient, CompletionRequest};
use crate::models::{DocumentDraft, UsageMetrics};
use crate::retry::{run_with_retry, RetryPolicy};

use template::DocumentTemplate;
use validate::{order_sections, output_budget, scan_sections, strip_section_tail, validate, Validation};

pub const MAX_MODEL_CALLS: u32 = 3;

/// Below this length ratio a modified document is treated as regenerated.
pub const MIN_LENGTH_RATIO: f64 = 0.6;

/// Sections a modification may remove before it counts as a regression.
pub const ALLOWED_SECTION_DROP: usize = 0;

const GENERATION_SYSTEM: &str = "You are a technical writer producing long, structured Markdown \
documentation for a software repository. Follow the section outline exactly, use the header \
format `## <n>. <title>`, and write every section in full.";

const MODIFY_SYSTEM: &str = "You edit existing Markdown documents. Apply only the requested \
change and return the complete document.";

const MODIFY_STRICT_SYSTEM: &str = "You edit existing Markdown documents. Copy every section the \
change does not touch verbatim, character for character. Keep all section headers and their \
numbering. Return the complete document, never a summary or an excerpt.";

/// A complete draft plus accumulated usage over every model call made.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub draft: DocumentDraft,
    pub usage: UsageMetrics,
    pub model_calls: u32,
}

pub struct DocumentGenerator {
    chat: Arc<dyn ChatClient>,
    config: GenerationConfig,
    retry: RetryPolicy,
}

/// Per-request call counter and usage accumulator.
struct Session<'a> {
    generator: &'a DocumentGenerator,
    usage: UsageMetrics,
    calls: u32,
}

impl<'a> Session<'a> {
    fn new(generator: &'a DocumentGenerator) -> Self {
        Self {
            generator,
            usage: UsageMetrics::default(),
            calls: 0,
        }
    }

    async fn call(&mut self, prompt: &str, system: &str, max_tokens: u32) -> Result<String> {
        self.calls += 1;
        let request = CompletionRequest::new(prompt)
            .with_system(system)
            .with_max_tokens(max_tokens);
        let chat = &self.generator.chat;
        let completion = run_with_retry(&self.generator.retry, "llm", || chat.complete(&request)).await?;

        self.usage.prompt_tokens += completion.usage.prompt_tokens;
        self.usage.completion_tokens += completion.usage.completion_tokens;
        self.usage.total_tokens += completion.usage.total_tokens;
        self.usage.model_id = completion.usage.model_id;
        Ok(completion.content)
    }

    /// One generation pass. A failed call is a failed pass (`None`), except
    /// a credential rejection, which no later pass can fix.
    async fn attempt(&mut self, prompt: &str, system: &str, max_tokens: u32, expected: u32) -> Result<Option<Validation>> {
        match self.call(prompt, system, max_tokens).await {
            Ok(content) => Ok(Some(validate(&content, expected))),
            Err(err @ Error::Unauthorized { .. }) => Err(err),
            Err(err) => {
                warn!(call = self.calls, error = %err, "generation pass failed");
                Ok(None)
            }
        }
    }

    fn finish(self, draft: DocumentDraft) -> GeneratedDocument {
        GeneratedDocument {
            draft,
            usage: self.usage,
            model_calls: self.calls,
        }
    }
}

impl DocumentGenerator {
    pub fn new(chat: Arc<dyn ChatClient>, config: GenerationConfig, retry: RetryPolicy) -> Self {
        Self { chat, config, retry }
    }

    /// Generate a complete document for `subject` from `grounding` facts.
    pub async fn generate(&self, template: &DocumentTemplate, subject: &str, grounding: &str) -> Result<GeneratedDocument> {
        let expected = template.section_count();
        let prompt = generation_prompt(template, subject, grounding);
        let budget = output_budget(prompt.chars().count(), &self.config);
        let mut session = Session::new(self);
        debug!(document = template.name, budget, "generating document");

        // Pass 1
        let first = session.attempt(&prompt, GENERATION_SYSTEM, budget, expected).await?;
        if let Some(v) = first.as_ref().filter(|v| v.is_acceptable()) {
            return Ok(session.finish(v.draft.clone()));
        }

        // A trivial first draft is discarded; the retry regenerates everything.
        let first = first.filter(|v| v.draft.content.trim().chars().count() >= self.config.min_draft_chars);
        let targets = first
            .as_ref()
            .map(Validation::repair_targets)
            .unwrap_or_else(|| template.all_numbers());
        info!(document = template.name, missing = ?targets, "first pass incomplete, retrying with missing sections");

        let retry_prompt = targeted_prompt(&prompt, template, &targets);
        let retried = session
            .attempt(&retry_prompt, &contiguity_system(expected), budget, expected)
            .await?;
        let current = prefer_coverage(first, retried);
        if let Some(v) = current.as_ref().filter(|v| v.is_acceptable()) {
            return Ok(session.finish(v.draft.clone()));
        }

        // Section-only retry, appended to the best draft so far.
        let targets = current
            .as_ref()
            .map(Validation::repair_targets)
            .unwrap_or_else(|| template.all_numbers());
        info!(document = template.name, missing = ?targets, "requesting missing sections only");

        let base = match &current {
            Some(v) => match v.truncated_section.filter(|_| v.truncated) {
                Some(section) => strip_section_tail(&v.draft.content, section),
                None => v.draft.content.clone(),
            },
            None => String::new(),
        };

        let section_prompt = section_only_prompt(template, subject, grounding, &targets);
        let extra = match session
            .call(&section_prompt, &contiguity_system(expected), budget)
            .await
        {
            Ok(extra) => extra,
            Err(err) if current.is_none() => return Err(err),
            Err(err) => {
                warn!(document = template.name, error = %err, "section-only retry failed");
                return Err(Error::IncompleteGeneration { missing: targets });
            }
        };

        let merged = order_sections(&format!("{}\n\n{}", base.trim_end(), extra.trim()), expected);
        let last = validate(&merged, expected);
        if last.is_acceptable() {
            info!(document = template.name, calls = session.calls, "document repaired");
            return Ok(session.finish(last.draft));
        }

        let missing = last.repair_targets();
        warn!(document = template.name, missing = ?missing, "document still incomplete after {} calls", MAX_MODEL_CALLS);
        Err(Error::IncompleteGeneration { missing })
    }

    /// Apply `instruction` to `original`, keeping untouched sections verbatim.
    pub async fn modify(&self, template: &DocumentTemplate, original: &str, instruction: &str) -> Result<GeneratedDocument> {
        let expected = template.section_count();
        let baseline = Baseline {
            chars: original.chars().count(),
            sections: scan_sections(original, expected).len(),
        };
        let prompt = modification_prompt(original, instruction);
        let budget = output_budget(prompt.chars().count(), &self.config);
        let mut session = Session::new(self);

        if let Some(v) = session.attempt(&prompt, MODIFY_SYSTEM, budget, expected).await? {
            if !baseline.regressed(&v) {
                return Ok(session.finish(v.draft));
            }
            warn!(
                document = template.name,
                sections = v.coverage(),
                original_sections = baseline.sections,
                "modified draft looks regenerated, retrying"
            );
        }

        let content = session.call(&prompt, MODIFY_STRICT_SYSTEM, budget).await?;
        let v = validate(&content, expected);
        if !v.is_acceptable() {
            let missing = v.repair_targets();
            warn!(document = template.name, missing = ?missing, "modified document still has gaps");
            return Err(Error::IncompleteGeneration { missing });
        }
        Ok(session.finish(v.draft))
    }
}

struct Baseline {
    chars: usize,
    sections: usize,
}

impl Baseline {
    fn regressed(&self, v: &Validation) -> bool {
        let ratio = v.draft.content.chars().count() as f64 / self.chars.max(1) as f64;
        ratio < MIN_LENGTH_RATIO || v.coverage() + ALLOWED_SECTION_DROP < self.sections || !v.is_acceptable()
    }
}

/// Pick the retry when it covers more sections, or as many without
/// opening a gap the first draft did not have. Ties otherwise keep the
/// first draft.
fn prefer_coverage(first: Option<Validation>, retried: Option<Validation>) -> Option<Validation> {
    match (first, retried) {
        (None, retried) => retried,
        (first, None) => first,
        (Some(first), Some(retried)) => {
            let keep_retry = retried.coverage() > first.coverage()
                || (retried.coverage() == first.coverage() && retried.no_new_gaps(&first));
            debug!(
                first = first.coverage(),
                retried = retried.coverage(),
                keep_retry,
                "comparing drafts"
            );
            Some(if keep_retry { retried } else { first })
        }
    }
}

fn contiguity_system(expected: u32) -> String {
    format!(
        "{} Do not skip sections. Section numbering must be contiguous from 1 to {}.",
        GENERATION_SYSTEM, expected
    )
}

fn generation_prompt(template: &DocumentTemplate, subject: &str, grounding: &str) -> String {
    format!(
        "Write the {} for \"{}\".\n\nUse exactly these {} sections, in order:\n{}\n\n\
Ground every statement in the repository facts below. Do not invent features.\n\n\
## Repository facts\n{}",
        template.title,
        subject,
        template.section_count(),
        template.outline(&template.all_numbers()),
        grounding
    )
}

fn targeted_prompt(prompt: &str, template: &DocumentTemplate, targets: &[u32]) -> String {
    format!(
        "{}\n\nA previous attempt was incomplete. These sections were missing or cut off:\n{}\n\n\
Write the complete document again with all {} sections, including the ones listed above.",
        prompt,
        template.outline(targets),
        template.section_count()
    )
}

fn section_only_prompt(template: &DocumentTemplate, subject: &str, grounding: &str, targets: &[u32]) -> String {
    format!(
        "Write ONLY the following sections of the {} for \"{}\". Use the exact headers shown \
and do not repeat any other section.\n\n{}\n\n## Repository facts\n{}",
        template.title,
        subject,
        template.outline(targets),
        grounding
    )
}

fn modification_prompt(original: &str, instruction: &str) -> String {
    format!(
        "Apply this change to the document below:\n{}\n\nReturn the complete updated document.\n\n\
<document>\n{}\n</document>",
        instruction, original
    )
}
