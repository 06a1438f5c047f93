use crate::types::Document;

/// Restaurant-review answering template with `{reviews}` and `{question}` slots.
pub const REVIEW_PROMPT: &str = "You are an expert in answering questions about a pizza restaurant. \
if the question is not related to the reviews, politely inform the user that you can only answer \
questions related to the reviews. if there is not enough information in the reviews, say \"I don't know\". \
Here are some relevant reviews:\n{reviews}\n\nHere is the question to answer:.\n{question}";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(REVIEW_PROMPT)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Fill both slots. The question is substituted last so braces in
    /// review text are never re-expanded.
    pub fn render(&self, reviews: &str, question: &str) -> String {
        let (head, tail) = match self.template.split_once("{question}") {
            Some((head, tail)) => (head, Some(tail)),
            None => (self.template.as_str(), None),
        };
        let mut out = head.replace("{reviews}", reviews);
        if let Some(tail) = tail {
            out.push_str(question);
            out.push_str(&tail.replace("{reviews}", reviews));
        }
        out
    }
}

/// One `- {content} (Rating: {rating}, Date: {date})` line per review.
pub fn format_reviews(docs: &[Document]) -> String {
    docs.iter()
        .map(|d| {
            format!(
                "- {} (Rating: {}, Date: {})",
                d.content, d.metadata.rating_text, d.metadata.date
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
