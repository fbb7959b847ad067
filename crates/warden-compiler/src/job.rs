//! Job and step model
//!
//! One [`Job`] is one node of the emitted execution graph: a unique name,
//! an explicit permission set, environment, ordered steps, declared
//! outputs, dependencies, and an optional rendered gate condition.

use serde_yaml::Value;
use std::collections::BTreeMap;
use warden_core::Permissions;

/// One step of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub name: Option<String>,
    pub id: Option<String>,
    pub condition: Option<String>,
    pub uses: Option<String>,
    pub run: Option<String>,
    pub with: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

impl Step {
    pub fn run(name: &str, script: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            run: Some(script.to_string()),
            ..Default::default()
        }
    }

    pub fn uses(name: &str, action: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            uses: Some(action.to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_input(mut self, key: &str, value: &str) -> Self {
        self.with.insert(key.to_string(), value.to_string());
        self
    }
}

/// One node of the execution graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub display_name: Option<String>,
    pub runs_on: String,
    /// Always rendered explicitly; an empty set emits `permissions: {}`.
    pub permissions: Permissions,
    pub timeout_minutes: Option<u64>,
    pub condition: Option<String>,
    pub needs: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub steps: Vec<Step>,
    /// Raw body of a user-declared custom job, emitted verbatim in place
    /// of the structured fields above (except name and needs).
    pub custom_body: Option<Value>,
}

impl Job {
    pub fn new(name: &str, runs_on: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: None,
            runs_on: runs_on.to_string(),
            permissions: Permissions::none(),
            timeout_minutes: None,
            condition: None,
            needs: Vec::new(),
            env: BTreeMap::new(),
            outputs: BTreeMap::new(),
            steps: Vec::new(),
            custom_body: None,
        }
    }

    /// A job defined by raw user configuration.
    pub fn custom(name: &str, body: Value) -> Self {
        let needs = match body.get("needs") {
            Some(Value::String(single)) => vec![single.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let mut job = Job::new(name, "");
        job.needs = needs;
        job.custom_body = Some(body);
        job
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_timeout(mut self, minutes: u64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_needs(mut self, needs: &[&str]) -> Self {
        self.needs = needs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_output(mut self, key: &str, value: &str) -> Self {
        self.outputs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let job = Job::new("agent", "ubuntu-latest")
            .with_needs(&["activation"])
            .with_condition("needs.activation.outputs.activated == 'true'")
            .with_env("WARDEN_ENGINE_ID", "claude")
            .with_step(Step::run("Run", "echo run"));
        assert_eq!(job.needs, vec!["activation"]);
        assert_eq!(job.steps.len(), 1);
        assert_eq!(job.env["WARDEN_ENGINE_ID"], "claude");
    }

    #[test]
    fn test_custom_job_extracts_needs() {
        let body: Value = serde_yaml::from_str("runs-on: ubuntu\nneeds: [agent]\n").unwrap();
        let job = Job::custom("deploy", body);
        assert_eq!(job.needs, vec!["agent"]);
        assert!(job.custom_body.is_some());
    }
}
