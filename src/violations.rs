//! Violations and their rendering.
//!
//! A [`Violation`] is a human-readable description of why an object matched
//! a policy, plus the structured field-to-values data it was rendered from.
//! Rendering is a collaborator behind the [`ViolationRenderer`] trait; the
//! engine guarantees it only invokes the renderer with a non-empty match
//! result, and treats a render that yields zero messages as an internal
//! error rather than "no violation".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::objects::ProcessEvent;
use crate::policy::LifecycleStage;
use crate::predicate::MatchResult;
use crate::registry::field_names;

/// A rendered policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub message: String,
    #[serde(default)]
    pub field_values: BTreeMap<String, Vec<String>>,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_values: BTreeMap::new(),
        }
    }

    fn with_field(mut self, field: &str, values: &[String]) -> Self {
        self.field_values.insert(field.to_string(), values.to_vec());
        self
    }
}

/// A runtime process violation, kept separate from alert violations so the
/// triggering executions stay attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessViolation {
    pub message: String,
    pub processes: Vec<ProcessEvent>,
}

impl ProcessViolation {
    /// Synthesize the runtime alert message from the triggering events.
    pub fn from_events(processes: Vec<ProcessEvent>) -> Self {
        let mut descriptions: Vec<String> = processes
            .iter()
            .map(|p| {
                if p.args.is_empty() {
                    format!("binary '{}'", p.name)
                } else {
                    format!("binary '{}' with arguments '{}'", p.name, p.args)
                }
            })
            .collect();
        descriptions.dedup();
        Self {
            message: format!("Detected execution of {}", descriptions.join(", ")),
            processes,
        }
    }
}

/// Everything a single evaluation produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Violations {
    pub alert_violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_violation: Option<ProcessViolation>,
}

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.alert_violations.is_empty() && self.process_violation.is_none()
    }
}

/// Renders a non-empty match result into violation messages.
///
/// Message templates are field-specific and owned by the renderer; the
/// engine only promises to call it with a non-empty result.
pub trait ViolationRenderer: Send + Sync {
    fn render(
        &self,
        stage: LifecycleStage,
        section_name: &str,
        result: &MatchResult,
    ) -> Vec<Violation>;
}

/// Built-in renderer with per-field message templates and a generic
/// fallback, so any non-empty result renders at least one message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

impl ViolationRenderer for DefaultRenderer {
    fn render(
        &self,
        _stage: LifecycleStage,
        _section_name: &str,
        result: &MatchResult,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (field, values) in &result.field_values {
            violations.extend(render_field(field, values));
        }
        violations
    }
}

fn render_field(field: &str, values: &[String]) -> Vec<Violation> {
    match field {
        field_names::PRIVILEGED => {
            let message = if values.iter().any(|v| v == "true") {
                "Privileged container found"
            } else {
                "Container is not running in privileged mode"
            };
            vec![Violation::new(message).with_field(field, values)]
        }
        field_names::READ_ONLY_ROOT_FS => {
            let message = if values.iter().any(|v| v == "false") {
                "Container is not running with a read-only root filesystem"
            } else {
                "Container uses a read-only root filesystem"
            };
            vec![Violation::new(message).with_field(field, values)]
        }
        field_names::CVE => values
            .iter()
            .map(|v| {
                Violation::new(format!("CVE {v} matched policy criteria"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        field_names::CVSS => values
            .iter()
            .map(|v| {
                Violation::new(format!("CVSS score {v} matched policy criteria"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        field_names::ADD_CAPABILITIES => values
            .iter()
            .map(|v| {
                Violation::new(format!("Container adds capability {v}"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        field_names::DROP_CAPABILITIES => values
            .iter()
            .map(|v| {
                Violation::new(format!("Container drops capability {v}"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        field_names::PORT => values
            .iter()
            .map(|v| {
                Violation::new(format!("Port {v} is exposed"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        field_names::IMAGE_COMPONENT => values
            .iter()
            .map(|v| {
                Violation::new(format!("Image contains component {v}"))
                    .with_field(field, std::slice::from_ref(v))
            })
            .collect(),
        _ => vec![
            Violation::new(format!("{} matched: {}", field, values.join(", ")))
                .with_field(field, values),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result_with(field: &str, values: &[&str]) -> MatchResult {
        let mut result = MatchResult::default();
        for v in values {
            result.add(field, *v);
        }
        result
    }

    fn render(result: &MatchResult) -> Vec<Violation> {
        DefaultRenderer.render(LifecycleStage::Deploy, "section 1", result)
    }

    #[test]
    fn test_privileged_message() {
        let violations = render(&result_with(field_names::PRIVILEGED, &["true"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "Privileged container found");
    }

    #[test]
    fn test_cve_renders_one_message_per_matched_value() {
        let violations = render(&result_with(field_names::CVE, &["CVE-2014-6271"]));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("CVE-2014-6271"));
        assert!(!violations[0].message.contains("CVE-2014-7169"));
    }

    #[test]
    fn test_generic_fallback_always_renders() {
        let violations = render(&result_with(field_names::VOLUME_SOURCE, &["/var/run"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "Volume Source matched: /var/run");
    }

    #[test]
    fn test_non_empty_result_never_renders_empty() {
        let mut result = MatchResult::default();
        result.add(field_names::IMAGE_TAG, "latest");
        result.add(field_names::PORT, "22");
        let violations = render(&result);
        assert!(violations.len() >= 2);
    }

    #[test]
    fn test_process_violation_message() {
        let v = ProcessViolation::from_events(vec![
            ProcessEvent::new("/bin/bash", "-i").with_uid("0"),
        ]);
        assert_eq!(
            v.message,
            "Detected execution of binary '/bin/bash' with arguments '-i'"
        );
        assert_eq!(v.processes.len(), 1);
    }

    #[test]
    fn test_violations_is_empty() {
        assert!(Violations::default().is_empty());
        let v = Violations {
            alert_violations: vec![Violation::new("x")],
            process_violation: None,
        };
        assert!(!v.is_empty());
    }
}
