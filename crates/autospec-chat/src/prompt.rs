//! Prompt templates with named slots.
//!
//! A template is plain text with `{name}` placeholders. Slots are checked
//! against the expected names when the template is built, so a template that
//! lacks `{context}` fails at startup instead of on the first question.

use std::collections::BTreeSet;

use autospec_core::error::{AutoSpecError, Result};

/// Instructions for answering a question from retrieved manual excerpts.
pub const ANSWER_TEMPLATE: &str = "\
You are an expert automobile technician and technical advisor.
Use the following pieces of retrieved context to answer the user's question in a detailed, comprehensive, and step-by-step format.

Instructions:
1. Answer only from the context below.
2. Provide technical specifications, torque values, fluid types and capacities exactly as found in the text.
3. If describing a procedure, use a numbered list for clarity.
4. Include warnings or notes if they are mentioned in the context.
5. If the answer is not in the context, say you don't know; do not make up information.
6. Structure the response with clear headings if multiple parts are discussed.

Context:
{context}

Question:
{question}

Detailed Technical Answer:";

/// Asks the model to turn a follow-up into a self-contained question.
pub const CONDENSE_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A parsed template whose slots match a fixed set of names.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    slots: BTreeSet<String>,
}

impl PromptTemplate {
    /// Parse `template` and check that its slots are exactly `slots`.
    ///
    /// Each expected slot must appear at least once and no other slot may
    /// appear. Braces that do not enclose an identifier are kept as text.
    pub fn new(template: &str, slots: &[&str]) -> Result<Self> {
        let segments = parse(template);
        let found: BTreeSet<String> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot(name) => Some(name.clone()),
                Segment::Text(_) => None,
            })
            .collect();
        let expected: BTreeSet<String> = slots.iter().map(|s| s.to_string()).collect();

        if let Some(missing) = expected.difference(&found).next() {
            return Err(AutoSpecError::Template(format!(
                "template is missing the {{{missing}}} slot"
            )));
        }
        if let Some(unknown) = found.difference(&expected).next() {
            return Err(AutoSpecError::Template(format!(
                "template uses unknown slot {{{unknown}}}"
            )));
        }

        Ok(Self {
            segments,
            slots: expected,
        })
    }

    /// The technician answer prompt with `context` and `question` slots.
    pub fn answer() -> Result<Self> {
        Self::new(ANSWER_TEMPLATE, &["context", "question"])
    }

    /// The follow-up rephrasing prompt with `chat_history` and `question` slots.
    pub fn condense() -> Result<Self> {
        Self::new(CONDENSE_TEMPLATE, &["chat_history", "question"])
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(String::as_str)
    }

    /// Fill every slot. Values are inserted verbatim and never re-scanned.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        for slot in &self.slots {
            if !values.iter().any(|(name, _)| *name == slot.as_str()) {
                return Err(AutoSpecError::Template(format!("no value for slot {{{slot}}}")));
            }
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(n, _)| *n == name.as_str())
                        .map(|(_, v)| *v)
                        .unwrap_or_default();
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_slot_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_slot_name(&after[..close]) => {
                text.push_str(&rest[..open]);
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Slot(after[..close].to_string()));
                rest = &after[close + 1..];
            }
            _ => {
                text.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}
