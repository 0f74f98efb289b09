//! Deployment plan
//!
//! A plan is an ordered list of step descriptors. Deploy steps are named after
//! the artifact key they produce; call steps are tracked by name in the
//! ledger's `calls` set. A plan is validated in two phases: structure when it
//! is built ([`Plan::new`]) and dependencies against the ledger right before a
//! run ([`Plan::check_dependencies`]), both before any network call.

use chainstep_types::{ArtifactKey, LedgerDocument};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use crate::error::{DeploymentError, Result};

/// A single call or constructor argument
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgSource {
    /// Resolved from the ledger at execution time
    Artifact { artifact: ArtifactKey },
    /// Passed through unchanged
    Literal(Value),
}

impl ArgSource {
    pub fn artifact(&self) -> Option<ArtifactKey> {
        match self {
            ArgSource::Artifact { artifact } => Some(*artifact),
            ArgSource::Literal(_) => None,
        }
    }

    /// Resolve against the ledger; `step` names the requesting step in errors
    pub fn resolve(&self, step: &str, ledger: &LedgerDocument) -> Result<Value> {
        match self {
            ArgSource::Literal(value) => Ok(value.clone()),
            ArgSource::Artifact { artifact } => ledger
                .artifact(*artifact)
                .map(|reference| reference.to_json())
                .ok_or_else(|| DeploymentError::MissingDependency {
                    step: step.to_string(),
                    artifact: *artifact,
                }),
        }
    }
}

// A one-key `{ artifact = "..." }` table is always an artifact reference, so a
// misspelt key is an error instead of silently becoming a literal.
impl<'de> Deserialize<'de> for ArgSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Value::Object(map) = &value {
            if map.len() == 1 {
                if let Some(name) = map.get("artifact") {
                    let name = name
                        .as_str()
                        .ok_or_else(|| de::Error::custom("artifact reference must be a string"))?;
                    let artifact = ArtifactKey::from_str(name).map_err(de::Error::custom)?;
                    return Ok(ArgSource::Artifact { artifact });
                }
            }
        }
        Ok(ArgSource::Literal(value))
    }
}

pub(crate) fn resolve_all(step: &str, args: &[ArgSource], ledger: &LedgerDocument) -> Result<Vec<Value>> {
    args.iter().map(|arg| arg.resolve(step, ledger)).collect()
}

/// Read-only query run after a step confirms
///
/// With `expect` a mismatch is reported as a warning; without it the value is
/// only reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallCheck {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<ArgSource>,
}

impl CallCheck {
    pub fn expecting(method: impl Into<String>, expect: ArgSource) -> Self {
        Self {
            method: method.into(),
            expect: Some(expect),
        }
    }

    pub fn reporting(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            expect: None,
        }
    }
}

/// Resolve each check's expected value; `None` for report-only checks
pub(crate) fn resolve_expectations(
    step: &str,
    checks: &[CallCheck],
    ledger: &LedgerDocument,
) -> Result<Vec<Option<Value>>> {
    checks
        .iter()
        .map(|check| check.expect.as_ref().map(|e| e.resolve(step, ledger)).transpose())
        .collect()
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Deploy one contract; the step name is the single-valued artifact key
    Deploy {
        contract: String,
        #[serde(default)]
        args: Vec<ArgSource>,
        /// Read back from the new contract
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        checks: Vec<CallCheck>,
    },
    /// Deploy one contract per instance; the step name is a list artifact key
    DeployEach {
        contract: String,
        instances: Vec<Vec<ArgSource>>,
        /// Read back from every new instance
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        checks: Vec<CallCheck>,
    },
    /// Call a method on a ledgered contract
    Call {
        target: ArtifactKey,
        method: String,
        #[serde(default)]
        args: Vec<ArgSource>,
        #[serde(default)]
        check: Option<CallCheck>,
    },
}

/// Step as written in the plan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<ArtifactKey>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// How completion of a step shows up in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Artifact(ArtifactKey),
    Call(String),
}

/// A validated step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    descriptor: StepDescriptor,
    completion: Completion,
}

impl Step {
    fn new(descriptor: StepDescriptor) -> Result<Self> {
        let completion = match &descriptor.action {
            StepAction::Deploy { .. } | StepAction::DeployEach { .. } => {
                let key = ArtifactKey::from_str(&descriptor.name).map_err(|_| {
                    DeploymentError::Configuration(format!(
                        "deploy step {} is not named after a known artifact",
                        descriptor.name
                    ))
                })?;
                let wants_list = matches!(descriptor.action, StepAction::DeployEach { .. });
                if key.is_list() != wants_list {
                    return Err(DeploymentError::Configuration(format!(
                        "step {} must use kind {}",
                        descriptor.name,
                        if key.is_list() { "deploy_each" } else { "deploy" }
                    )));
                }
                if let StepAction::DeployEach { instances, .. } = &descriptor.action {
                    if instances.is_empty() {
                        return Err(DeploymentError::Configuration(format!(
                            "step {} declares no instances",
                            descriptor.name
                        )));
                    }
                }
                Completion::Artifact(key)
            }
            StepAction::Call { .. } => {
                if descriptor.name.trim().is_empty() {
                    return Err(DeploymentError::Configuration(
                        "call step with an empty name".to_string(),
                    ));
                }
                Completion::Call(descriptor.name.clone())
            }
        };
        Ok(Self {
            descriptor,
            completion,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn action(&self) -> &StepAction {
        &self.descriptor.action
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Artifact produced by the step, if it is a deploy step
    pub fn produces(&self) -> Option<ArtifactKey> {
        match self.completion {
            Completion::Artifact(key) => Some(key),
            Completion::Call(_) => None,
        }
    }

    /// Every artifact the step reads: declared dependencies plus everything
    /// its arguments, target and check refer to
    pub fn dependencies(&self) -> BTreeSet<ArtifactKey> {
        let mut deps: BTreeSet<ArtifactKey> = self.descriptor.depends_on.iter().copied().collect();
        let mut add_args = |args: &[ArgSource]| deps.extend(args.iter().filter_map(ArgSource::artifact));
        let checks = match &self.descriptor.action {
            StepAction::Deploy { args, checks, .. } => {
                add_args(args);
                checks.as_slice()
            }
            StepAction::DeployEach { instances, checks, .. } => {
                for args in instances {
                    add_args(args);
                }
                checks.as_slice()
            }
            StepAction::Call {
                target, args, check, ..
            } => {
                add_args(args);
                deps.insert(*target);
                check.as_slice()
            }
        };
        deps.extend(
            checks
                .iter()
                .filter_map(|c| c.expect.as_ref().and_then(ArgSource::artifact)),
        );
        deps
    }

    /// Whether the ledger already proves this step complete
    pub fn is_complete(&self, ledger: &LedgerDocument) -> bool {
        match (&self.completion, &self.descriptor.action) {
            (Completion::Artifact(key), StepAction::DeployEach { instances, .. }) => {
                ledger.list_len(*key) >= instances.len()
            }
            (Completion::Artifact(key), _) => ledger.contains(*key),
            (Completion::Call(name), _) => ledger.has_call(name),
        }
    }
}

/// Ordered, validated list of steps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Validate step structure: unique names, deploy steps named after
    /// artifacts of the right kind, no artifact produced twice
    pub fn new(descriptors: Vec<StepDescriptor>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut produced = HashSet::new();
        let mut steps = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !names.insert(descriptor.name.clone()) {
                return Err(DeploymentError::Configuration(format!(
                    "duplicate step name {}",
                    descriptor.name
                )));
            }
            let step = Step::new(descriptor)?;
            if let Some(key) = step.produces() {
                if !produced.insert(key) {
                    return Err(DeploymentError::Configuration(format!(
                        "artifact {} is produced by more than one step",
                        key
                    )));
                }
            }
            steps.push(step);
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every incomplete step's dependencies must be ledgered already or
    /// produced by an earlier step
    pub fn check_dependencies(&self, ledger: &LedgerDocument) -> Result<()> {
        let mut available: HashSet<ArtifactKey> = ArtifactKey::ALL
            .iter()
            .copied()
            .filter(|key| ledger.contains(*key))
            .collect();
        for step in &self.steps {
            if !step.is_complete(ledger) {
                if let Some(missing) = step
                    .dependencies()
                    .into_iter()
                    .find(|key| !available.contains(key))
                {
                    return Err(DeploymentError::MissingDependency {
                        step: step.name().to_string(),
                        artifact: missing,
                    });
                }
            }
            if let Some(key) = step.produces() {
                available.insert(key);
            }
        }
        Ok(())
    }

    /// Call steps that read `key`; replacing that artifact makes them stale
    pub fn calls_reading(&self, key: ArtifactKey) -> impl Iterator<Item = &Step> + '_ {
        self.steps
            .iter()
            .filter(move |s| matches!(s.completion(), Completion::Call(_)) && s.dependencies().contains(&key))
    }

    /// Steps not yet proven complete by the ledger
    pub fn pending<'a>(&'a self, ledger: &'a LedgerDocument) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps.iter().filter(move |s| !s.is_complete(ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstep_types::{Address, ArtifactRef};
    use serde_json::json;

    fn deploy(name: &str, args: Vec<ArgSource>) -> StepDescriptor {
        StepDescriptor {
            name: name.to_string(),
            depends_on: vec![],
            action: StepAction::Deploy {
                contract: "C".into(),
                args,
                checks: vec![],
            },
        }
    }

    fn artifact(key: ArtifactKey) -> ArgSource {
        ArgSource::Artifact { artifact: key }
    }

    #[test]
    fn test_descriptor_from_json() {
        let step: StepDescriptor = serde_json::from_value(json!({
            "name": "uri",
            "kind": "deploy",
            "contract": "EntitiesURI",
            "args": [{ "artifact": "master" }, "https://example.org/"],
        }))
        .unwrap();
        assert_eq!(
            step.action,
            StepAction::Deploy {
                contract: "EntitiesURI".into(),
                args: vec![
                    artifact(ArtifactKey::Master),
                    ArgSource::Literal(json!("https://example.org/")),
                ],
                checks: vec![],
            }
        );
    }

    #[test]
    fn test_misspelt_artifact_reference_is_rejected() {
        let result: std::result::Result<ArgSource, _> =
            serde_json::from_value(json!({ "artifact": "mastr" }));
        assert!(result.is_err());

        let literal: ArgSource = serde_json::from_value(json!({ "artifact": "master", "x": 1 })).unwrap();
        assert!(matches!(literal, ArgSource::Literal(_)));
    }

    #[test]
    fn test_plan_rejects_duplicate_names() {
        let err = Plan::new(vec![deploy("master", vec![]), deploy("master", vec![])]).unwrap_err();
        assert!(matches!(err, DeploymentError::Configuration(_)));
    }

    #[test]
    fn test_plan_rejects_unknown_and_wrong_kind() {
        assert!(Plan::new(vec![deploy("registry", vec![])]).is_err());
        assert!(Plan::new(vec![deploy("jurisdictions", vec![])]).is_err());

        let empty_each = StepDescriptor {
            name: "jurisdictions".into(),
            depends_on: vec![],
            action: StepAction::DeployEach {
                contract: "Jurisdiction".into(),
                instances: vec![],
                checks: vec![],
            },
        };
        assert!(Plan::new(vec![empty_each]).is_err());
    }

    #[test]
    fn test_dependencies_collects_all_references() {
        let step = Step::new(StepDescriptor {
            name: "set-uri".into(),
            depends_on: vec![ArtifactKey::Timestamp],
            action: StepAction::Call {
                target: ArtifactKey::Master,
                method: "changeURISources".into(),
                args: vec![artifact(ArtifactKey::Uri)],
                check: Some(CallCheck::expecting("entitiesURI", artifact(ArtifactKey::Uri))),
            },
        })
        .unwrap();
        let deps: Vec<_> = step.dependencies().into_iter().collect();
        assert_eq!(deps, vec![ArtifactKey::Master, ArtifactKey::Uri, ArtifactKey::Timestamp]);
    }

    #[test]
    fn test_deploy_checks_from_json() {
        let step: StepDescriptor = serde_json::from_value(json!({
            "name": "jurisdictions",
            "kind": "deploy_each",
            "contract": "Jurisdiction",
            "instances": [["DAO"], ["DELAWARE"]],
            "checks": [
                { "method": "getJurisdictionName" },
                { "method": "owner", "expect": { "artifact": "master" } },
            ],
        }))
        .unwrap();
        let step = Step::new(step).unwrap();
        match step.action() {
            StepAction::DeployEach { checks, .. } => {
                assert_eq!(checks[0], CallCheck::reporting("getJurisdictionName"));
                assert_eq!(checks[1], CallCheck::expecting("owner", artifact(ArtifactKey::Master)));
            }
            other => panic!("unexpected action: {other:?}"),
        }
        // an artifact in an expectation is a dependency of the step
        assert!(step.dependencies().contains(&ArtifactKey::Master));
    }

    #[test]
    fn test_calls_reading_artifact() {
        let call = |name: &str, target: ArtifactKey, args: Vec<ArgSource>| StepDescriptor {
            name: name.to_string(),
            depends_on: vec![],
            action: StepAction::Call {
                target,
                method: "m".into(),
                args,
                check: None,
            },
        };
        let plan = Plan::new(vec![
            deploy("master", vec![]),
            deploy("uri", vec![artifact(ArtifactKey::Master)]),
            call("set-uri", ArtifactKey::Master, vec![artifact(ArtifactKey::Uri)]),
            call("pause", ArtifactKey::Master, vec![]),
        ])
        .unwrap();

        let names: Vec<_> = plan.calls_reading(ArtifactKey::Uri).map(Step::name).collect();
        assert_eq!(names, vec!["set-uri"]);
        let names: Vec<_> = plan.calls_reading(ArtifactKey::Master).map(Step::name).collect();
        assert_eq!(names, vec!["set-uri", "pause"]);
    }

    #[test]
    fn test_forward_reference_is_missing_dependency() {
        let plan = Plan::new(vec![
            deploy("uri", vec![artifact(ArtifactKey::Master)]),
            deploy("master", vec![]),
        ])
        .unwrap();
        let err = plan.check_dependencies(&LedgerDocument::new()).unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::MissingDependency { ref step, artifact: ArtifactKey::Master } if step == "uri"
        ));
    }

    #[test]
    fn test_dependency_satisfied_by_ledger() {
        let plan = Plan::new(vec![deploy("uri", vec![artifact(ArtifactKey::Master)])]).unwrap();
        let mut ledger = LedgerDocument::new();
        ledger
            .record(ArtifactKey::Master, ArtifactRef::Single(Address::from_low_u64(1)))
            .unwrap();
        plan.check_dependencies(&ledger).unwrap();
    }

    #[test]
    fn test_completed_step_is_not_checked() {
        let plan = Plan::new(vec![deploy("uri", vec![artifact(ArtifactKey::Master)])]).unwrap();
        let mut ledger = LedgerDocument::new();
        ledger
            .record(ArtifactKey::Uri, ArtifactRef::Single(Address::from_low_u64(2)))
            .unwrap();
        plan.check_dependencies(&ledger).unwrap();
        assert_eq!(plan.pending(&ledger).count(), 0);
    }
}
