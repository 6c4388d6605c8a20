//! String cleanup helpers for LLM output and optional fields.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean and validate a string, returning `Option<String>`
///
/// Used for optional string fields: trims whitespace and filters empties.
#[inline]
pub fn clean_optional_string(s: Option<&String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// String cleanup extension trait
pub trait StringExt {
    /// Trim and return `None` for empty strings
    fn clean(&self) -> Option<String>;

    /// Trimmed copy
    fn trimmed(&self) -> String;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }

    #[inline]
    fn trimmed(&self) -> String {
        self.trim().to_string()
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }

    #[inline]
    fn trimmed(&self) -> String {
        self.as_str().trimmed()
    }
}

/// Strip ReAct scaffolding that leaked from the model into a tool argument.
///
/// Models occasionally append the next `Thought:` / `Action:` /
/// `Observation:` block to a tool input instead of stopping at the value.
/// Everything from the first scaffolding marker onwards is dropped.
pub fn strip_react_scaffolding(input: &str) -> String {
    static MARKER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:Thought|Action Input|Action|Observation|Final Answer):")
            .expect("static pattern")
    });

    match MARKER.find(input) {
        Some(m) => input[..m.start()].trim().to_string(),
        None => input.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_filters_empty() {
        assert_eq!("  x ".clean(), Some("x".to_string()));
        assert_eq!("   ".clean(), None);
        assert_eq!(clean_optional_string(Some(&" y ".to_string())), Some("y".to_string()));
        assert_eq!(clean_optional_string(Some(&"".to_string())), None);
    }

    #[test]
    fn strips_trailing_scaffolding() {
        let noisy =
            "status column holds S/F flags\nThought: next I should check orphans\nAction: execute_sql";
        assert_eq!(strip_react_scaffolding(noisy), "status column holds S/F flags");
    }

    #[test]
    fn keeps_clean_values_untouched() {
        assert_eq!(strip_react_scaffolding("plain note"), "plain note");
    }
}
