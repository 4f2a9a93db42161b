//! Prompt assembly for grounded answers.

use crate::retrieval::RetrievedDocument;

/// Template sent to the generative model. `{context}` and `{question}` are
/// substituted once each; braces inside the substituted text are left alone.
pub const PROMPT_TEMPLATE: &str = "
Answer the question based only on the following context:

{context}

---

Answer the question based on the above context: {question}
";

/// Placed between retrieved passages so the model sees them as separate.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Join passage contents in rank order with [`CONTEXT_SEPARATOR`].
pub fn join_documents(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Fill [`PROMPT_TEMPLATE`] with a context block and the user's question.
pub fn assemble_prompt(context: &str, question: &str) -> String {
    render(PROMPT_TEMPLATE, &[("{context}", context), ("{question}", question)])
}

/// Single left-to-right pass over `template`, replacing each placeholder
/// where it occurs in the template itself.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(
        template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>(),
    );
    let mut rest = template;
    while !rest.is_empty() {
        let next = vars
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|pos| (pos, *key, *value)))
            .min_by_key(|(pos, _, _)| *pos);
        match next {
            Some((pos, key, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + key.len()..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}
