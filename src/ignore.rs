//! Built-in failure ignore list.
//!
//! Some value shapes are known to be unrepresentable and not worth warning
//! about on every run: raw byte buffers, and the throwaway source-location
//! value objects parsers attach to their output. Failures whose rendered head
//! matches one of these patterns are dropped silently at save time; anything
//! else still aborts the save.

use regex_lite::Regex;

/// Patterns matched against a failure record's rendered head.
pub fn builtin_ignore_patterns() -> Vec<Regex> {
    [
        // raw byte buffers
        r"^unknown-custom-class .*:Buffer$",
        // parser source-location value objects
        r"^unknown-custom-class .*:Position$",
        r"^unknown-custom-class .*:SourceLocation",
        r"^unknown-custom-class .*:WrappingSourceLocation$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("built-in ignore pattern"))
    .collect()
}
