//! Prompt construction for the summarization delegate.

/// Builds the instruction sent to the LLM for one node's raw text.
///
/// The target language is caller-supplied, never auto-detected. The prompt
/// asks for a bounded-length condensation that keeps every detail already
/// present in prior summaries and adds no critique, interpretation, or
/// assumption of its own.
pub fn summary_prompt(language: &str, raw: &str, output_budget: usize) -> String {
    format!(
        "Summarize the following content in {language}. \
         Keep the summary under {output_budget} characters. \
         Preserve every fact and detail present in the content, including \
         details carried over from earlier summaries. \
         Do not critique, interpret, or assume anything beyond what is \
         written.\n\n{raw}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_language_and_budget() {
        let prompt = summary_prompt("German", "Ein langer Text", 256);
        assert!(prompt.contains("German"));
        assert!(prompt.contains("256"));
        assert!(prompt.ends_with("Ein langer Text"));
    }

    #[test]
    fn prompt_forbids_interpretation() {
        let prompt = summary_prompt("English", "body", 100);
        assert!(prompt.contains("Do not critique"));
    }
}
