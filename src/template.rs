//! Placeholder substitution for toolkit document templates.
//!
//! Templates contain `{{name}}` placeholders (surrounding whitespace
//! inside the braces is allowed).  Rendering is a single pass: values
//! are inserted verbatim and never scanned for further placeholders.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Output of [`render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendered {
    pub text: String,
    /// Placeholders with no value, in order of first appearance.  They
    /// are left untouched in `text`.
    pub missing: Vec<String>,
}

/// Substitutes every placeholder that has a value in `values`.
pub fn render(template: &str, values: &HashMap<String, String>) -> Rendered {
    let mut missing: Vec<String> = Vec::new();
    let text = PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                if !missing.iter().any(|m| m == &caps[1]) {
                    missing.push(caps[1].to_string());
                }
                caps[0].to_string()
            }
        })
        .into_owned();
    Rendered { text, missing }
}

/// Lists the distinct placeholder names of a template in order of
/// first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if !names.iter().any(|n| n == &caps[1]) {
            names.push(caps[1].to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = render(
            "Spett.le {{azienda}}, il dipendente {{ nome }} è inquadrato al livello {{livello}}.",
            &values(&[("azienda", "ACME S.r.l."), ("nome", "Mario Rossi"), ("livello", "4")]),
        );
        assert_eq!(
            out.text,
            "Spett.le ACME S.r.l., il dipendente Mario Rossi è inquadrato al livello 4."
        );
        assert!(out.missing.is_empty());
    }

    #[test]
    fn leaves_missing_placeholders_and_reports_them_once() {
        let out = render("{{a}} {{b}} {{a}} {{c}}", &values(&[("c", "3")]));
        assert_eq!(out.text, "{{a}} {{b}} {{a}} 3");
        assert_eq!(out.missing, ["a", "b"]);
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render("{{x}}", &values(&[("x", "{{y}}"), ("y", "no")]));
        assert_eq!(out.text, "{{y}}");
    }

    #[test]
    fn lists_distinct_placeholders_in_order() {
        assert_eq!(
            placeholders("{{ data }} {{firma}} {{data}} {single}"),
            ["data", "firma"]
        );
    }
}
