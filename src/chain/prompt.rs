//! Prompt template with `{context}` and `{question}` slots.

use crate::error::GatewayError;

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub const DEFAULT: &'static str =
        "Answer the question using the following information:\n\n{context}\n\nQuestion: {question}";

    /// Parse a template; both slots must be present.
    pub fn new(template: &str) -> Result<Self, GatewayError> {
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !template.contains(slot) {
                return Err(GatewayError::invalid(format!(
                    "Prompt template is missing the {slot} slot"
                )));
            }
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Fill both slots. Inserted text is never rescanned for slots.
    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .split(CONTEXT_SLOT)
            .map(|part| part.replace(QUESTION_SLOT, question))
            .collect::<Vec<_>>()
            .join(context)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: Self::DEFAULT.to_string(),
        }
    }
}
