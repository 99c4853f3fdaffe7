//! Prompt construction for policy extraction and outcome simulation, and
//! resolution of the policy levers a simulation runs with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const EXTRACTION_SYSTEM: &str = "You are a senior public policy analyst. \
You read policy documents and extract their structure as strict JSON. \
Respond with a single JSON object and nothing else.";

pub const SIMULATION_SYSTEM: &str = "You are a policy outcome forecaster. \
Given a structured policy analysis and the values of its adjustable levers, \
you project plausible economic, social and environmental outcomes. \
Respond with a single JSON object and nothing else.";

const EXTRACTION_SCHEMA: &str = r#"{
  "title": string,
  "summary": string,
  "goals": [string],
  "levers": [
    { "name": string, "description": string, "unit": string,
      "min": number, "max": number, "default": number }
  ],
  "constraints": [string],
  "stakeholders": [string]
}"#;

const SIMULATION_SCHEMA: &str = r#"{
  "summary": string,
  "indicators": {
    "economic": [{ "name": string, "baseline": number, "projected": number, "unit": string }],
    "social": [{ "name": string, "baseline": number, "projected": number, "unit": string }],
    "environmental": [{ "name": string, "baseline": number, "projected": number, "unit": string }]
  },
  "sdgAlignment": [{ "goal": string, "score": number, "rationale": string }],
  "regionalImpacts": [{ "region": string, "impact": string, "severity": "low" | "medium" | "high" }],
  "risks": [string],
  "recommendations": [string]
}"#;

/// User prompt asking for the structure of `document`.
///
/// The document is cut at `max_chars` characters.
pub fn extraction_prompt(file_name: &str, document: &str, max_chars: usize) -> String {
    let (text, truncated) = truncate_chars(document, max_chars);
    let note = if truncated {
        "\n[document truncated]"
    } else {
        ""
    };
    format!(
        "Extract the policy structure from the document \"{file_name}\".\n\
         Identify numeric levers a decision maker could adjust, with realistic bounds.\n\n\
         Return JSON with this shape:\n{EXTRACTION_SCHEMA}\n\n\
         Document:\n\"\"\"\n{text}{note}\n\"\"\""
    )
}

/// User prompt asking for projected outcomes of `analysis` under `levers`.
pub fn simulation_prompt(
    scenario_name: &str,
    analysis: &Value,
    levers: &BTreeMap<String, f64>,
) -> String {
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    let levers_json = serde_json::to_string_pretty(levers).unwrap_or_default();
    format!(
        "Scenario: {scenario_name}\n\n\
         Policy analysis:\n{analysis_json}\n\n\
         Lever settings for this scenario:\n{levers_json}\n\n\
         Return JSON with this shape:\n{SIMULATION_SCHEMA}"
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// An adjustable numeric parameter extracted from a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lever {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub default: Option<f64>,
}

impl Lever {
    /// The extracted default, or the midpoint of the range.
    pub fn baseline(&self) -> f64 {
        self.default
            .unwrap_or((self.min + self.max) / 2.0)
            .clamp(self.min, self.max)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LeverError {
    #[error("invalid lever override '{0}': expected name=value")]
    InvalidOverride(String),
    #[error("unknown lever '{0}'")]
    UnknownLever(String),
}

/// Parse a `name=value` override.
pub fn parse_override(raw: &str) -> Result<(String, f64), LeverError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| LeverError::InvalidOverride(raw.to_string()))?;
    let name = name.trim();
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| LeverError::InvalidOverride(raw.to_string()))?;
    if name.is_empty() || !value.is_finite() {
        return Err(LeverError::InvalidOverride(raw.to_string()));
    }
    Ok((name.to_string(), value))
}

/// Levers listed in an analysis payload. Malformed entries and entries with
/// an inverted range are skipped.
pub fn levers_from_analysis(analysis: &Value) -> Vec<Lever> {
    analysis
        .get("levers")
        .and_then(|l| l.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Lever>(item.clone()).ok())
                .filter(|lever| lever.min <= lever.max)
                .collect()
        })
        .unwrap_or_default()
}

/// Effective lever values: each baseline, replaced by any override and
/// clamped into the lever's range.
pub fn resolve_levers(
    levers: &[Lever],
    overrides: &[(String, f64)],
) -> Result<BTreeMap<String, f64>, LeverError> {
    let mut values: BTreeMap<String, f64> = levers
        .iter()
        .map(|lever| (lever.name.clone(), lever.baseline()))
        .collect();

    for (name, value) in overrides {
        let lever = levers
            .iter()
            .find(|l| &l.name == name)
            .ok_or_else(|| LeverError::UnknownLever(name.clone()))?;
        values.insert(name.clone(), value.clamp(lever.min, lever.max));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis() -> Value {
        json!({
            "title": "Clean Air Act",
            "levers": [
                { "name": "carbon_tax", "unit": "EUR/t", "min": 0.0, "max": 200.0, "default": 50.0 },
                { "name": "subsidy", "min": 10.0, "max": 30.0 },
                { "name": "broken" },
                { "name": "inverted", "min": 5.0, "max": 1.0 }
            ]
        })
    }

    #[test]
    fn test_levers_skip_malformed() {
        let levers = levers_from_analysis(&analysis());
        let names: Vec<_> = levers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["carbon_tax", "subsidy"]);
    }

    #[test]
    fn test_defaults_and_midpoint() {
        let levers = levers_from_analysis(&analysis());
        let values = resolve_levers(&levers, &[]).unwrap();
        assert_eq!(values["carbon_tax"], 50.0);
        assert_eq!(values["subsidy"], 20.0);
    }

    #[test]
    fn test_overrides_are_clamped() {
        let levers = levers_from_analysis(&analysis());
        let values = resolve_levers(
            &levers,
            &[("carbon_tax".to_string(), 500.0), ("subsidy".to_string(), -3.0)],
        )
        .unwrap();
        assert_eq!(values["carbon_tax"], 200.0);
        assert_eq!(values["subsidy"], 10.0);
    }

    #[test]
    fn test_unknown_override_rejected() {
        let levers = levers_from_analysis(&analysis());
        let err = resolve_levers(&levers, &[("vat".to_string(), 1.0)]).unwrap_err();
        assert_eq!(err, LeverError::UnknownLever("vat".to_string()));
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("carbon_tax = 75.5").unwrap(),
            ("carbon_tax".to_string(), 75.5)
        );
        assert!(parse_override("carbon_tax").is_err());
        assert!(parse_override("=3").is_err());
        assert!(parse_override("x=abc").is_err());
    }

    #[test]
    fn test_extraction_prompt_truncates() {
        let prompt = extraction_prompt("a.txt", "abcdefghij", 4);
        assert!(prompt.contains("abcd\n[document truncated]"));
        assert!(!prompt.contains("abcde"));

        let full = extraction_prompt("a.txt", "short", 100);
        assert!(!full.contains("truncated"));
    }

    #[test]
    fn test_simulation_prompt_embeds_levers() {
        let mut levers = BTreeMap::new();
        levers.insert("carbon_tax".to_string(), 80.0);
        let prompt = simulation_prompt("High tax", &analysis(), &levers);
        assert!(prompt.contains("Scenario: High tax"));
        assert!(prompt.contains("\"carbon_tax\": 80.0"));
        assert!(prompt.contains("sdgAlignment"));
    }
}
