//! The matcher: a policy compiled into an immutable, reusable evaluation
//! unit.
//!
//! Construction runs validate -> compile -> predicate building and fails
//! fast; a successfully built [`Matcher`] holds no per-call mutable state,
//! so concurrent evaluations need no locking. [`Matcher::match_one`] is
//! synchronous and performs no I/O; the searcher-backed batch operations
//! make exactly one call into the supplied [`Searcher`].
//!
//! Lifecycle-stage gating and multi-policy orchestration are the caller's
//! responsibility: a matcher evaluates exactly one policy.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::compile::compile_policy;
use crate::error::PolicyError;
use crate::objects::{Deployment, Image, ProcessEvent};
use crate::policy::{LifecycleStage, Policy};
use crate::predicate::{
    build_predicate, MatchResult, Predicate, DEPLOYMENT_FIELDS, IMAGE_FIELDS, PROCESS_FIELDS,
};
use crate::query::Query;
use crate::registry::FieldRegistry;
use crate::searcher::Searcher;
use crate::validate::validate;
use crate::violations::{DefaultRenderer, ProcessViolation, ViolationRenderer, Violations};

/// Evaluation-time failure.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A non-empty match result rendered zero violation messages. This is a
    /// missing-renderer defect, not a "no violation" outcome.
    #[error("matching policy {policy}: result matched but produced no violation messages")]
    NoViolationMessages { policy: String },

    #[error("matching policy {policy}: search returned a result with an empty id")]
    EmptyResultId { policy: String },

    /// Opaque pass-through of a searcher failure.
    #[error("search failed while matching policy {policy}")]
    Search {
        policy: String,
        #[source]
        source: anyhow::Error,
    },
}

struct CompiledSection {
    section_name: String,
    deployment: Predicate<Deployment>,
    image: Predicate<Image>,
    process: Predicate<ProcessEvent>,
}

/// An immutable, build-once/evaluate-many unit produced from one policy.
pub struct Matcher {
    policy_id: String,
    policy_name: String,
    stage: LifecycleStage,
    sections: Vec<CompiledSection>,
    policy_query: Query,
    renderer: Box<dyn ViolationRenderer>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("policy_id", &self.policy_id)
            .field("policy_name", &self.policy_name)
            .field("stage", &self.stage)
            .field("sections", &self.sections.len())
            .field("policy_query", &self.policy_query)
            .finish_non_exhaustive()
    }
}

impl Matcher {
    /// Build a matcher with the built-in violation renderer.
    pub fn build(policy: &Policy, registry: &FieldRegistry) -> Result<Self, PolicyError> {
        Self::build_with_renderer(policy, registry, Box::new(DefaultRenderer))
    }

    /// Build a matcher with a custom violation renderer.
    ///
    /// The policy must carry the current version marker; run a legacy policy
    /// through [`ensure_converted`](crate::convert::ensure_converted) first.
    pub fn build_with_renderer(
        policy: &Policy,
        registry: &FieldRegistry,
        renderer: Box<dyn ViolationRenderer>,
    ) -> Result<Self, PolicyError> {
        validate(policy)?;
        let section_queries = compile_policy(policy, registry)?;

        let mut sections = Vec::with_capacity(section_queries.len());
        for sq in &section_queries {
            // One predicate per object kind, in fixed order.
            sections.push(CompiledSection {
                section_name: sq.section_name.clone(),
                deployment: build_predicate(&sq.query, DEPLOYMENT_FIELDS)?,
                image: build_predicate(&sq.query, IMAGE_FIELDS)?,
                process: build_predicate(&sq.query, PROCESS_FIELDS)?,
            });
        }

        let policy_query =
            Query::disjunction(section_queries.into_iter().map(|sq| sq.query).collect());
        let stage = policy
            .lifecycle_stages
            .first()
            .copied()
            .unwrap_or(LifecycleStage::Deploy);

        debug!(
            policy = %policy.name,
            sections = sections.len(),
            "built policy matcher"
        );

        Ok(Self {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            stage,
            sections,
            policy_query,
            renderer,
        })
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// The compiled policy-level query (sections disjoined), as dispatched
    /// to a searcher.
    pub fn policy_query(&self) -> &Query {
        &self.policy_query
    }

    /// Evaluate one deployment/image-set/process-event combination.
    ///
    /// Per section: a supplied deployment must match or the section yields
    /// nothing; supplied images are OR'd in the given order and at least one
    /// must match; a supplied process event must match. Matching sections'
    /// results merge in stable order and render to violations. An empty
    /// outcome is `Ok` with empty [`Violations`], never an error.
    pub fn match_one(
        &self,
        deployment: Option<&Deployment>,
        images: &[Image],
        process: Option<&ProcessEvent>,
    ) -> Result<Violations, MatchError> {
        let mut violations = Violations::default();
        let mut any_matched = false;

        for section in &self.sections {
            let Some(result) = self.eval_section(section, deployment, images, process) else {
                continue;
            };
            // A section can match purely through always-true predicates
            // (e.g. image-only criteria with no image supplied); there is
            // nothing to report for it.
            if result.is_empty() {
                continue;
            }
            let rendered = self
                .renderer
                .render(self.stage, &section.section_name, &result);
            if rendered.is_empty() {
                return Err(MatchError::NoViolationMessages {
                    policy: self.policy_name.clone(),
                });
            }
            violations.alert_violations.extend(rendered);
            any_matched = true;
        }

        if any_matched {
            if let Some(process) = process {
                violations.process_violation =
                    Some(ProcessViolation::from_events(vec![process.clone()]));
            }
        }
        Ok(violations)
    }

    fn eval_section(
        &self,
        section: &CompiledSection,
        deployment: Option<&Deployment>,
        images: &[Image],
        process: Option<&ProcessEvent>,
    ) -> Option<MatchResult> {
        let mut results = Vec::new();

        if let Some(deployment) = deployment {
            // Deployment non-match short-circuits the whole section.
            results.push(section.deployment.eval(deployment)?);
        }

        if !images.is_empty() {
            let mut found = false;
            for image in images {
                if let Some(result) = section.image.eval(image) {
                    found = true;
                    results.push(result);
                }
            }
            if !found {
                return None;
            }
        }

        if let Some(process) = process {
            results.push(section.process.eval(process)?);
        }

        if results.is_empty() {
            return None;
        }
        Some(MatchResult::merge(results))
    }

    /// Match every object the searcher knows about.
    ///
    /// Zero results is a valid outcome and yields `None`, distinguishing
    /// "no matches" from a failed call.
    pub async fn match_all(
        &self,
        searcher: &dyn Searcher,
    ) -> Result<Option<HashMap<String, Violations>>, MatchError> {
        self.violations_map(searcher, self.policy_query.clone())
            .await
    }

    /// Match only the given object ids, by conjoining a doc-id filter.
    pub async fn match_many<S: AsRef<str>>(
        &self,
        searcher: &dyn Searcher,
        ids: &[S],
    ) -> Result<Option<HashMap<String, Violations>>, MatchError> {
        let query = Query::Conjunction(vec![
            Query::doc_ids(ids.iter().map(|id| id.as_ref())),
            self.policy_query.clone(),
        ]);
        self.violations_map(searcher, query).await
    }

    async fn violations_map(
        &self,
        searcher: &dyn Searcher,
        query: Query,
    ) -> Result<Option<HashMap<String, Violations>>, MatchError> {
        let results = searcher
            .search(&query)
            .await
            .map_err(|source| MatchError::Search {
                policy: self.policy_name.clone(),
                source,
            })?;

        if results.is_empty() {
            return Ok(None);
        }

        let mut map = HashMap::with_capacity(results.len());
        for result in results {
            if result.id.is_empty() {
                return Err(MatchError::EmptyResultId {
                    policy: self.policy_name.clone(),
                });
            }
            let match_result = MatchResult {
                field_values: result.field_matches,
            };
            let rendered = self.renderer.render(self.stage, "", &match_result);
            if rendered.is_empty() {
                // A result the query matched but nothing can describe is a
                // policy-authoring bug; abort the whole call.
                return Err(MatchError::NoViolationMessages {
                    policy: self.policy_name.clone(),
                });
            }
            map.insert(
                result.id,
                Violations {
                    alert_violations: rendered,
                    process_violation: None,
                },
            );
        }
        Ok(Some(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Container;
    use crate::policy::{BooleanOperator, PolicyGroup, PolicySection};
    use crate::registry::field_names;
    use pretty_assertions::assert_eq;

    fn build_matcher(policy: &Policy) -> Matcher {
        Matcher::build(policy, FieldRegistry::default_registry()).unwrap()
    }

    fn privileged_policy() -> Policy {
        Policy::new("Privileged Container")
            .with_lifecycle_stage(LifecycleStage::Deploy)
            .with_section(PolicySection::new(
                "section 1",
                vec![PolicyGroup::new(field_names::PRIVILEGED, ["true"])],
            ))
    }

    #[test]
    fn test_build_rejects_invalid_policy() {
        let mut policy = privileged_policy();
        policy.name = String::new();
        let err = Matcher::build(&policy, FieldRegistry::default_registry()).unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
    }

    #[test]
    fn test_deployment_short_circuit() {
        let policy = Policy::new("Privileged or CVE")
            .with_section(PolicySection::new(
                "section 1",
                vec![PolicyGroup::new(field_names::PRIVILEGED, ["true"])],
            ));
        let matcher = build_matcher(&policy);

        let unprivileged = Deployment::new("web").with_container(Container::new("app"));
        // The image would match an image-irrelevant section via always-true,
        // but the deployment gate fails first.
        let image = crate::objects::Image::new("docker.io", "library/nginx", "latest");
        let violations = matcher
            .match_one(Some(&unprivileged), &[image], None)
            .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_match_one_is_deterministic() {
        let matcher = build_matcher(&privileged_policy());
        let deployment =
            Deployment::new("web").with_container(Container::new("app").privileged(true));
        let first = matcher.match_one(Some(&deployment), &[], None).unwrap();
        let second = matcher.match_one(Some(&deployment), &[], None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.alert_violations.len(), 1);
        assert_eq!(first.alert_violations[0].message, "Privileged container found");
    }

    #[test]
    fn test_no_objects_supplied_is_empty() {
        let matcher = build_matcher(&privileged_policy());
        let violations = matcher.match_one(None, &[], None).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_sections_or_for_violations() {
        let policy = Policy::new("two sections")
            .with_section(PolicySection::new(
                "privileged",
                vec![PolicyGroup::new(field_names::PRIVILEGED, ["true"])],
            ))
            .with_section(PolicySection::new(
                "port",
                vec![PolicyGroup::new(field_names::PORT, ["22"])],
            ));
        let matcher = build_matcher(&policy);
        let deployment =
            Deployment::new("web").with_container(Container::new("app").privileged(true));
        // Only the privileged section matches.
        let violations = matcher.match_one(Some(&deployment), &[], None).unwrap();
        assert_eq!(violations.alert_violations.len(), 1);
    }

    #[test]
    fn test_policy_query_disjoins_sections() {
        let policy = Policy::new("two sections")
            .with_section(PolicySection::new(
                "a",
                vec![PolicyGroup::new(field_names::CVE, ["CVE-2019-0001"])],
            ))
            .with_section(PolicySection::new(
                "b",
                vec![PolicyGroup::new(field_names::PORT, ["22"])],
            ));
        let matcher = build_matcher(&policy);
        match matcher.policy_query() {
            Query::Disjunction(children) => assert_eq!(children.len(), 2),
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_cve_or_group_end_to_end() {
        let policy = Policy::new("Shellshock").with_section(PolicySection::new(
            "section 1",
            vec![PolicyGroup::new(
                field_names::CVE,
                ["CVE-2014-6271", "CVE-2014-7169"],
            )
            .with_operator(BooleanOperator::Or)],
        ));
        let matcher = build_matcher(&policy);

        let image = crate::objects::Image::new("docker.io", "library/nginx", "1.10")
            .with_component(
                crate::objects::Component::new("bash", "4.3")
                    .with_vuln(crate::objects::Vulnerability::new("CVE-2014-6271", 9.8)),
            );
        let violations = matcher.match_one(None, &[image], None).unwrap();
        assert_eq!(violations.alert_violations.len(), 1);
        assert!(violations.alert_violations[0]
            .message
            .contains("CVE-2014-6271"));
        assert!(!violations.alert_violations[0]
            .message
            .contains("CVE-2014-7169"));
    }

    #[test]
    fn test_process_violation_attached_on_match() {
        let policy = Policy::new("Bash executed")
            .with_lifecycle_stage(LifecycleStage::Runtime)
            .with_section(PolicySection::new(
                "section 1",
                vec![PolicyGroup::new(field_names::PROCESS_NAME, ["/bin/bash"])],
            ));
        let matcher = build_matcher(&policy);
        let event = ProcessEvent::new("/bin/bash", "-i");
        let violations = matcher.match_one(None, &[], Some(&event)).unwrap();
        assert!(!violations.is_empty());
        let pv = violations.process_violation.unwrap();
        assert_eq!(pv.processes.len(), 1);
        assert!(pv.message.contains("/bin/bash"));
    }
}
