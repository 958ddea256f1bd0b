//! Placeholder Templates
//!
//! Output templates name their instance with `{sample}`, `{group}` or
//! `{project}`. Expansion is plain substitution; a template that still
//! carries a placeholder after expansion is a definition error caught by
//! the validator.

use log::debug;

/// Checks if a string contains placeholder syntax.
pub fn has_placeholders(text: &str) -> bool {
    !extract_placeholder_names(text).is_empty()
}

/// Extracts placeholder names from a template, in order of appearance.
///
/// # Example
/// ```
/// use genoflow::workflow::pattern::extract_placeholder_names;
///
/// let names = extract_placeholder_names("{group}/{group}-contigs.db");
/// assert_eq!(names, vec!["group", "group"]);
/// ```
pub fn extract_placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_placeholder = false;
    let mut current_name = String::new();

    for ch in template.chars() {
        match ch {
            '{' => {
                in_placeholder = true;
                current_name.clear();
            }
            '}' => {
                if in_placeholder && !current_name.is_empty() {
                    names.push(current_name.clone());
                }
                current_name.clear();
                in_placeholder = false;
            }
            _ if in_placeholder => current_name.push(ch),
            _ => {}
        }
    }

    names
}

/// Substitutes one placeholder with a concrete value.
pub fn substitute(template: &str, name: &str, value: &str) -> String {
    template.replace(&format!("{{{}}}", name), value)
}

/// Substitutes every `(name, value)` binding.
///
/// # Example
/// ```
/// use genoflow::workflow::pattern::expand_template;
///
/// let path = expand_template("{group}/{group}-contigs.fa", &[("group", "G01")]);
/// assert_eq!(path, "G01/G01-contigs.fa");
/// ```
pub fn expand_template(template: &str, bindings: &[(&str, &str)]) -> String {
    let expanded = bindings
        .iter()
        .fold(template.to_string(), |acc, (name, value)| substitute(&acc, name, value));
    debug!("  {} -> {}", template, expanded);
    expanded
}
