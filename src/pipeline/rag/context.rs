use std::collections::HashSet;

use super::types::RetrievedPassage;

pub const CONTEXT_HEADER: &str = "Here are the most relevant sections from the Godot documentation:\n\n";

/// Render retrieved passages as a numbered documentation block.
///
/// Passages with identical content are rendered once, at their first
/// position. Returns an empty string when there is nothing worth showing;
/// the header never appears without a body.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return String::new();
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let unique: Vec<&RetrievedPassage> = passages
        .iter()
        .filter(|p| seen.insert(p.content.as_str()))
        .collect();

    // Several passages collapsing to one is the degenerate retrieval case.
    if unique.len() == 1 && passages.len() > 1 {
        return String::new();
    }

    let mut out = String::from(CONTEXT_HEADER);
    for (i, passage) in unique.iter().enumerate() {
        out.push_str(&format!(
            "[Result {}] (Relevance: {:.2})\n{}\n\n",
            i + 1,
            passage.relevance,
            passage.content
        ));
    }
    out
}
