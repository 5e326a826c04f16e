//! Generation orchestrator: one grounded completion per query.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::llm::prompt::{sanitize_for_prompt, truncate_to_char_boundary};
use crate::llm::{Generator, Prompt};
use crate::models::{Answer, AssembledContext};

/// Returned whenever no evidence survived retrieval and assembly.
pub const REFUSAL: &str = "I couldn't find any founder records relevant to this question, \
     so I can't answer it from the available data.";

/// Longest bracketed span treated as a citation marker
const MAX_MARKER_LEN: usize = 128;

const MAX_QUESTION_LEN: usize = 2_000;

#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Answer `query_text` from `context` alone.
    ///
    /// An empty context short-circuits to [`REFUSAL`] without calling the
    /// generator. Citation markers naming records outside the context are
    /// removed from the returned text.
    pub async fn generate(
        &self,
        query_text: &str,
        context: &AssembledContext,
        system_instructions: &str,
    ) -> Result<Answer> {
        if context.is_empty() {
            tracing::debug!("No evidence in context; refusing without generation");
            return Ok(Answer {
                text: REFUSAL.to_string(),
                citations: Vec::new(),
                grounded: false,
            });
        }

        let prompt = build_prompt(query_text, context, system_instructions);

        let raw = match tokio::time::timeout(self.timeout, self.generator.complete(&prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(RagError::GenerationFailure(format!("{e:#}"))),
            Err(_) => {
                return Err(RagError::Timeout {
                    stage: "generation",
                    after: self.timeout,
                })
            }
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RagError::GenerationFailure(
                "model returned an empty completion".into(),
            ));
        }

        let allowed: HashSet<&str> = context
            .snippets
            .iter()
            .map(|s| s.record_id.as_str())
            .collect();
        let (text, citations) = validate_citations(raw, &allowed);

        Ok(Answer {
            text,
            citations,
            grounded: true,
        })
    }
}

/// Deterministic prompt: the system instructions, then numbered evidence
/// blocks tagged with their record id, then the question.
pub fn build_prompt(
    query_text: &str,
    context: &AssembledContext,
    system_instructions: &str,
) -> Prompt {
    let mut user = String::from("Founder records:\n\n");
    for (i, snippet) in context.snippets.iter().enumerate() {
        let _ = write!(user, "{}. [{}]\n{}\n\n", i + 1, snippet.record_id, snippet.text);
    }
    let question = sanitize_for_prompt(&truncate_to_char_boundary(query_text, MAX_QUESTION_LEN));
    let _ = write!(user, "---\nQuestion: {question}");

    Prompt {
        system: system_instructions.to_string(),
        user,
    }
}

/// Keep `[id]` markers whose ids are in `allowed`, strip the rest, and list
/// the kept ids in order of first appearance. A marker may hold several
/// comma-separated ids. Markdown links (`[text](url)`) are left alone.
/// Brackets naming only context ids are always markers; anything else must
/// look like one (no inner whitespace) before it is stripped.
fn validate_citations(text: &str, allowed: &HashSet<&str>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut citations: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let (before, from_open) = rest.split_at(open);
        out.push_str(before);

        let Some(close) = from_open.find(']') else {
            out.push_str(from_open);
            rest = "";
            break;
        };
        let inner = &from_open[1..close];
        let after = &from_open[close + 1..];

        let names_context = inner.split(',').all(|id| allowed.contains(id.trim()));
        if !(names_context || looks_like_marker(inner)) || after.starts_with('(') {
            out.push('[');
            rest = &from_open[1..];
            continue;
        }

        let mut kept: Vec<&str> = Vec::new();
        for id in inner.split(',').map(str::trim) {
            if allowed.contains(id) {
                kept.push(id);
                if !citations.iter().any(|c| c == id) {
                    citations.push(id.to_string());
                }
            } else {
                tracing::warn!("Stripping citation of unknown record '{id}'");
            }
        }

        if kept.is_empty() {
            if out.ends_with(' ') && (after.is_empty() || after.starts_with([' ', '.', ',', ';', ':'])) {
                out.pop();
            }
        } else {
            let _ = write!(out, "[{}]", kept.join(", "));
        }
        rest = after;
    }
    out.push_str(rest);

    (out, citations)
}

fn looks_like_marker(inner: &str) -> bool {
    !inner.trim().is_empty()
        && inner.len() <= MAX_MARKER_LEN
        && !inner.contains(['[', '\n'])
        && inner
            .split(',')
            .all(|part| !part.trim().is_empty() && !part.trim().contains(char::is_whitespace))
}
