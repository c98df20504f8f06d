//! System and user prompt construction.
//!
//! The system prompt is fixed apart from two inputs: the human-readable
//! language name and one of five documentation clauses.

use crate::error::{Error, Result};
use tracing::warn;

/// Highest supported documentation level.
pub const DOC_LEVEL_MAX: u8 = 4;

/// Documentation clauses ordered from level 0 (none) to level 4 (full).
const DOC_CLAUSES: [&str; 5] = [
    "No documentation at all. Write a comment only when it is essential to understand non-obvious logic.",
    "Very very minimal documentation (ideally one line or less per item). Clean and clear.",
    "Minimal documentation: a short doc comment on public items, nothing on private helpers.",
    "Moderate documentation: document public items and briefly explain important logic and invariants.",
    "Comprehensive documentation: document every public item thoroughly, including parameters, errors and usage examples.",
];

const SYSTEM_TEMPLATE: &str = "\
You are a highly intelligent code converter specialized in converting code to H1-quality {lang} code. H1-quality code adheres to the following guidelines:
0. No hallucinations: don't invent things that aren't there yet (for example, don't create a new class out of nowhere). If you can't convert this file, only write a single line \"Error: <short explanation>\". No code block, and DON'T write a placeholder.
1. Clear code.
2. No redundant or duplicate code.
3. Concise and relevant comments: include only useful, professional comments that describe the code flow or clarify important logic. Avoid trivial comments (e.g. \"// set a to 5\") and keep comments short.
4. Write comments only when you fully understand the code and its context. Do not add comments if you're unsure of their correctness or necessity.
5. Documentation: {docs}
6. No commented-out or unused code.
7. High-quality {lang} code with best practices.
8. Thoughtful and meaningful naming conventions.
9. No typos in the code or comments.
10. Smart conversion that improves code without introducing issues. For example, do not replace variables with functions or make unnecessary changes that alter the code's intent or efficiency.
11. Preserve high-quality code from the original and ensure no functionality is lost (for example, make sure you don't change constant values that make the code work).

Your task is to convert the code strictly according to these principles. The output should be code only. Note that the files given to you are just a part of a larger codebase.";

/// Returns the documentation clause for `level`.
///
/// # Errors
///
/// Returns [`Error::DocLevel`] if `level` is above [`DOC_LEVEL_MAX`].
pub fn doc_clause(level: u8) -> Result<&'static str> {
    DOC_CLAUSES
        .get(usize::from(level))
        .copied()
        .ok_or(Error::DocLevel { level })
}

/// Builds the system instruction for `language` at documentation `level`.
///
/// An out-of-range level is reported with a warning before the lookup fails,
/// so callers that skip validation still see why.
///
/// # Errors
///
/// Returns [`Error::DocLevel`] if `level` is above [`DOC_LEVEL_MAX`].
///
/// # Examples
///
/// ```
/// use h1_code::system_prompt;
///
/// let prompt = system_prompt("Python", 0).unwrap();
/// assert!(prompt.contains("H1-quality Python code"));
/// assert!(system_prompt("Python", 9).is_err());
/// ```
pub fn system_prompt(language: &str, level: u8) -> Result<String> {
    if level > DOC_LEVEL_MAX {
        warn!("Documentation level {level} is outside 0..={DOC_LEVEL_MAX}");
    }

    let docs = doc_clause(level)?;
    Ok(SYSTEM_TEMPLATE
        .replace("{lang}", language)
        .replace("{docs}", docs))
}

/// Builds the user turn: instruction, file label and the fenced source.
#[must_use]
pub fn user_message(filename: &str, tag: &str, source: &str) -> String {
    format!("rewrite this code in H1 quality:\nfilename:{filename}:```{tag}\n{source}\n```\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_level_includes_language_and_clause() {
        for level in 0..=DOC_LEVEL_MAX {
            let prompt = system_prompt("Kotlin", level).unwrap();
            assert!(prompt.contains("H1-quality Kotlin code"));
            assert!(prompt.contains("High-quality Kotlin code"));
            assert!(prompt.contains(DOC_CLAUSES[usize::from(level)]));
            assert!(!prompt.contains("{lang}"));
            assert!(!prompt.contains("{docs}"));
        }
    }

    #[test]
    fn test_levels_differ() {
        let none = system_prompt("Go", 0).unwrap();
        let full = system_prompt("Go", 4).unwrap();
        assert_ne!(none, full);
        assert!(full.contains("usage examples"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(
            system_prompt("Rust", 2).unwrap(),
            system_prompt("Rust", 2).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_level_fails() {
        let err = system_prompt("Rust", 5).unwrap_err();
        assert!(matches!(err, Error::DocLevel { level: 5 }));
    }

    #[test]
    fn test_prompt_demands_error_line() {
        let prompt = system_prompt("C", 1).unwrap();
        assert!(prompt.contains("\"Error: <short explanation>\""));
        assert!(prompt.contains("code only"));
    }

    #[test]
    fn test_user_message_layout() {
        let message = user_message("lib/main.dart", "dart", "void main() {}");
        assert_eq!(
            message,
            "rewrite this code in H1 quality:\nfilename:lib/main.dart:```dart\nvoid main() {}\n```\n"
        );
    }
}
