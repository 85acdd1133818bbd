//! Complexity-based tier selection.
//!
//! A small, cheap model reads the prompt (plus a short window of recent
//! conversation) and declares the task either `fast` or `reasoning`. The
//! verdict maps onto the catalog's fallback and primary models. Any failure
//! in here becomes a [`RoutingError`] for the chain to absorb.

use serde::Deserialize;

use crate::config::{ModelCatalog, RouterTuning};
use crate::model::{ModelRequest, Part, SharedModelClient, Turn};

use super::context::RoutingContext;
use super::decision::{RouteSource, RoutingDecision, RoutingError};

const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You are a routing classifier for a coding agent. Read the conversation and \
the latest request, then decide which execution tier fits.

Choose \"fast\" for mechanical work: renames, small edits, running a known \
command, answering a direct factual question about code already in context.

Choose \"reasoning\" for anything requiring planning or judgment: multi-file \
changes, debugging from symptoms, architecture or API design, performance \
analysis, or ambiguous requests that need interpretation.

Respond with JSON only, no prose around it:
{\"reasoning\": \"<one short sentence>\", \"tier\": \"fast\" | \"reasoning\"}";

/// The JSON shape the classifier model must produce.
#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    #[serde(default)]
    reasoning: Option<String>,
    tier: TierChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TierChoice {
    Fast,
    Reasoning,
}

/// Strategy that asks a small model to pick the tier.
pub struct ClassifierStrategy {
    client: SharedModelClient,
    catalog: ModelCatalog,
    tuning: RouterTuning,
}

impl ClassifierStrategy {
    pub fn new(client: SharedModelClient, catalog: ModelCatalog, tuning: RouterTuning) -> Self {
        Self {
            client,
            catalog,
            tuning,
        }
    }

    pub(super) async fn decide(
        &self,
        context: &RoutingContext,
    ) -> Result<Option<RoutingDecision>, RoutingError> {
        if context.cancel.is_cancelled() {
            return Err(RoutingError::Cancelled);
        }

        // Long sessions have accumulated context a smaller model would
        // squander. Promote without spending a classification call.
        if context.history.len() >= self.tuning.long_history_threshold {
            return Ok(Some(
                RoutingDecision::new(&self.catalog.primary, RouteSource::Classifier)
                    .with_reasoning("long session, staying on the reasoning tier"),
            ));
        }

        let response = self.client.generate(self.build_request(context)).await?;
        let verdict = parse_verdict(&response.text())?;

        let model = match verdict.tier {
            TierChoice::Fast => &self.catalog.fallback,
            TierChoice::Reasoning => &self.catalog.primary,
        };
        let mut decision = RoutingDecision::new(model, RouteSource::Classifier);
        if let Some(reasoning) = verdict.reasoning {
            decision = decision.with_reasoning(reasoning);
        }
        Ok(Some(decision))
    }

    fn build_request(&self, context: &RoutingContext) -> ModelRequest {
        let mut history = recent_plain_turns(&context.history, self.tuning.classifier_history_turns);
        history.push(Turn::user(vec![Part::text(context.request_text.clone())]));

        ModelRequest::new(&self.catalog.classifier)
            .with_system_prompt(CLASSIFIER_SYSTEM_PROMPT)
            .with_history(history)
            .with_temperature(self.tuning.classifier_temperature)
            .with_max_output_tokens(self.tuning.classifier_max_output_tokens)
    }
}

/// The last `limit` turns that carry no tool traffic, oldest first. Tool
/// call/response pairs are noise to the classifier and can dwarf the text.
fn recent_plain_turns(history: &[Turn], limit: usize) -> Vec<Turn> {
    let mut window: Vec<Turn> = history
        .iter()
        .rev()
        .filter(|turn| !turn.has_tool_traffic())
        .take(limit)
        .cloned()
        .collect();
    window.reverse();
    window
}

fn parse_verdict(raw: &str) -> Result<ClassifierVerdict, RoutingError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|error| {
        RoutingError::MalformedDecision(format!("{error}; raw: {}", truncate(raw, 200)))
    })
}

/// Models wrap JSON in markdown fences often enough that we strip them
/// before parsing.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn truncate(raw: &str, limit: usize) -> &str {
    match raw.char_indices().nth(limit) {
        Some((index, _)) => &raw[..index],
        None => raw,
    }
}
