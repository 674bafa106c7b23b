//! AI consolidation of the grouped report: related PRs are merged into
//! single bullets and titles rewritten, under a JSON schema contract.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::tools::ToolExecutor;
use super::{Prompt, SummarizeError, Summarizer};
use crate::report::{ContentGroup, ContentItem, ContentSection};

const MAX_TITLE_CHARS: usize = 500;
const BAD_OUTPUT_PREFIX_CHARS: usize = 2000;

const CONSOLIDATE_PROMPT: &str = "\
You consolidate a developer's daily pull request report. The input is JSON: top-level \
keys are groups (Worked on, Reviewed, Waiting for Review), second-level keys are \
repositories, and each holds a list of PRs. Merge PRs that belong to the same piece of \
work into one item whose title describes the combined change, and rewrite terse titles \
so a reader outside the team understands them. Keep every PR number exactly once. Use \
the tools to read PR descriptions, diffs, or local history when a title alone is unclear.";

/// A consolidated bullet.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConsolidatedItem {
    pub title: String,
    pub numbers: Vec<u64>,
}

/// `group → repository → items`, the shape the model must answer with.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConsolidatedReport(pub BTreeMap<String, BTreeMap<String, Vec<ConsolidatedItem>>>);

/// Which call is being made. The corrective call carries what went wrong
/// with the first answer; there is no third call.
enum Attempt {
    First,
    Corrective { error: String, previous: String },
}

pub fn schema_text() -> Result<String, SummarizeError> {
    Ok(serde_json::to_string_pretty(&schemars::schema_for!(ConsolidatedReport))?)
}

/// Serialize grouped content as `group → section → [item]`, keeping the
/// grouping order.
pub fn content_payload(content: &[ContentGroup]) -> Result<Value, SummarizeError> {
    let mut groups = Map::new();
    for group in content {
        let mut sections = Map::new();
        for section in &group.sections {
            sections.insert(section.heading.clone(), serde_json::to_value(&section.items)?);
        }
        groups.insert(group.name.clone(), Value::Object(sections));
    }
    Ok(Value::Object(groups))
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and check one model answer.
pub fn parse_answer(raw: &str) -> Result<ConsolidatedReport, String> {
    let report: ConsolidatedReport =
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| e.to_string())?;
    for (group, sections) in &report.0 {
        for (section, items) in sections {
            if items.iter().any(|item| item.title.trim().is_empty()) {
                return Err(format!("empty title in {group} / {section}"));
            }
        }
    }
    Ok(report)
}

fn corrective_message(input: &str, error: &str, previous: &str, schema: &str) -> String {
    let prefix: String = previous.chars().take(BAD_OUTPUT_PREFIX_CHARS).collect();
    format!(
        "Your previous answer was rejected: {error}\n\n\
         Beginning of the rejected answer:\n{prefix}\n\n\
         Answer again with ONLY a JSON document matching this schema:\n{schema}\n\n\
         Report to consolidate:\n{input}"
    )
}

fn truncate_title(title: &str) -> String {
    title.trim().chars().take(MAX_TITLE_CHARS).collect()
}

fn into_section(heading: String, items: Vec<ConsolidatedItem>) -> Option<ContentSection> {
    if items.is_empty() {
        return None;
    }
    Some(ContentSection {
        heading,
        items: items
            .into_iter()
            .map(|item| ContentItem {
                title: truncate_title(&item.title),
                numbers: item.numbers,
                ..Default::default()
            })
            .collect(),
    })
}

/// Lay the answer out in the order of the input grouping. Groups and
/// sections the input did not have follow, sorted.
pub fn reorder(answer: ConsolidatedReport, input: &[ContentGroup]) -> Vec<ContentGroup> {
    let mut remaining = answer.0;
    let mut groups = Vec::new();

    let mut push = |name: String, mut sections: BTreeMap<String, Vec<ConsolidatedItem>>, order: &[String]| {
        let mut out: Vec<ContentSection> = order
            .iter()
            .filter_map(|heading| {
                let items = sections.remove(heading)?;
                into_section(heading.clone(), items)
            })
            .collect();
        out.extend(
            sections
                .into_iter()
                .filter_map(|(heading, items)| into_section(heading, items)),
        );
        if !out.is_empty() {
            groups.push(ContentGroup { name, sections: out });
        }
    };

    for group in input {
        if let Some(sections) = remaining.remove(&group.name) {
            let order: Vec<String> = group.sections.iter().map(|s| s.heading.clone()).collect();
            push(group.name.clone(), sections, &order);
        }
    }
    for (name, sections) in remaining {
        push(name, sections, &[]);
    }
    groups
}

/// Consolidate grouped content through the summarizer. A malformed answer
/// gets exactly one corrective retry; a second failure is returned.
#[instrument(skip_all, fields(groups = content.len()))]
pub async fn consolidate(
    summarizer: &dyn Summarizer,
    tools: &dyn ToolExecutor,
    content: &[ContentGroup],
    custom_prompt: Option<&str>,
) -> Result<Vec<ContentGroup>, SummarizeError> {
    if content.is_empty() {
        debug!("no content to consolidate");
        return Ok(Vec::new());
    }

    let schema = schema_text()?;
    let input = serde_json::to_string_pretty(&content_payload(content)?)?;
    let system = format!(
        "{}\n\nReturn ONLY a JSON document matching this schema, with no prose and no code fence:\n{}",
        custom_prompt.unwrap_or(CONSOLIDATE_PROMPT),
        schema
    );
    debug!(chars = input.len(), "consolidation input");

    let mut attempt = Attempt::First;
    loop {
        let user = match &attempt {
            Attempt::First => input.clone(),
            Attempt::Corrective { error, previous } => {
                corrective_message(&input, error, previous, &schema)
            }
        };
        let raw = summarizer
            .complete_with_tools(&Prompt::new(system.clone(), user), tools)
            .await?;

        match parse_answer(&raw) {
            Ok(answer) => {
                let groups = reorder(answer, content);
                debug!(groups = groups.len(), "consolidation output");
                return Ok(groups);
            }
            Err(error) => match attempt {
                Attempt::First => {
                    warn!(%error, "consolidation output rejected, retrying once");
                    attempt = Attempt::Corrective {
                        error,
                        previous: raw,
                    };
                }
                Attempt::Corrective { .. } => return Err(SummarizeError::InvalidOutput(error)),
            },
        }
    }
}
