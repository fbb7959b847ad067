//! Job graph assembly
//!
//! A pure function from [`WorkflowSpec`] to [`JobGraph`]:
//! activation job → agent job → one job per enabled safe-output kind →
//! always-run conclusion job. Each safe-output job receives exactly the
//! minimal permission set its kind requires.

use crate::conditions::{build_activation_condition, ConditionNode};
use crate::error::Result;
use crate::graph::JobGraph;
use crate::job::{Job, Step};
use tracing::debug;
use warden_config::WorkflowSpec;
use warden_core::constants::{
    ACTIVATED_OUTPUT, ACTIVATION_JOB_NAME, AGENT_JOB_NAME, AGENT_OUTPUT, AGENT_OUTPUT_ARTIFACT,
    AGENT_OUTPUT_PATH, CONCLUSION_JOB_NAME,
};
use warden_core::env::{
    self, ALLOWED_DOMAINS_VAR, ENGINE_ID_VAR, ENGINE_MODEL_VAR, ENGINE_VERSION_VAR,
    NETWORK_DOMAINS_VAR, REQUIRED_ROLES_VAR, TARGET_REPO_SLUG_VAR,
};
use warden_core::{PermissionLevel, PermissionScope, Permissions, SafeOutputKind};

const CHECKOUT_ACTION: &str = "actions/checkout@v4";
const UPLOAD_ARTIFACT_ACTION: &str = "actions/upload-artifact@v4";
const DOWNLOAD_ARTIFACT_ACTION: &str = "actions/download-artifact@v4";

/// Assemble the full job graph for a spec. Pure: no I/O, no shared state.
pub fn assemble(spec: &WorkflowSpec) -> Result<JobGraph> {
    let mut graph = JobGraph::new();

    graph.add_job(build_activation_job(spec)?)?;
    graph.add_job(build_agent_job(spec))?;

    for (name, body) in &spec.custom_jobs {
        let mut job = Job::custom(name, body.clone());
        if job.needs.is_empty() {
            job.needs = vec![ACTIVATION_JOB_NAME.to_string()];
        }
        graph.add_job(job)?;
    }

    for kind in spec.safe_outputs.enabled_kinds() {
        graph.add_job(build_safe_output_job(spec, kind))?;
    }

    let conclusion = build_conclusion_job(spec, &graph);
    graph.add_job(conclusion)?;

    graph.validate()?;
    debug!(workflow = %spec.name, jobs = graph.len(), "job graph assembled");
    Ok(graph)
}

/// The preamble barrier: evaluates the combined gate condition, checks the
/// actor's permission level, and acquires the issue lock when configured.
fn build_activation_job(spec: &WorkflowSpec) -> Result<Job> {
    let condition = build_activation_condition(spec)?;

    let mut permissions =
        Permissions::from_grants(&[(PermissionScope::Contents, PermissionLevel::Read)]);
    if spec.lock_for_agent {
        permissions.grant(PermissionScope::Issues, PermissionLevel::Write);
    }

    let gate_step = if spec.triggers.has_actor_events() {
        Step::run(
            "Check actor permission",
            "permission=$(gh api \"repos/${GITHUB_REPOSITORY}/collaborators/${GITHUB_ACTOR}/permission\" --jq .permission)\n\
             case \",${WARDEN_REQUIRED_ROLES},\" in\n\
               *\",${permission},\"*) echo \"activated=true\" >> \"$GITHUB_OUTPUT\" ;;\n\
               *) echo \"activated=false\" >> \"$GITHUB_OUTPUT\" ;;\n\
             esac",
        )
        .with_id("gate")
        .with_env("GH_TOKEN", "${{ github.token }}")
        .with_env(REQUIRED_ROLES_VAR, &spec.roles.join(","))
    } else {
        Step::run(
            "Record activation",
            "echo \"activated=true\" >> \"$GITHUB_OUTPUT\"",
        )
        .with_id("gate")
    };

    let mut job = Job::new(ACTIVATION_JOB_NAME, &spec.runs_on)
        .with_permissions(permissions)
        .with_condition(&condition.render())
        .with_step(gate_step)
        .with_output(
            ACTIVATED_OUTPUT,
            &format!("${{{{ steps.gate.outputs.{ACTIVATED_OUTPUT} }}}}"),
        );

    if spec.lock_for_agent {
        let lock_condition = ConditionNode::event_in(&["issues", "issue_comment"]);
        job = job.with_step(
            Step::run("Lock conversation for agent", "gh issue lock \"$ISSUE_NUMBER\"")
                .with_id("lock")
                .with_condition(&lock_condition.render())
                .with_env("GH_TOKEN", "${{ github.token }}")
                .with_env("ISSUE_NUMBER", "${{ github.event.issue.number }}"),
        );
    }

    Ok(job)
}

/// The main execution job. Never holds write credentials: the agent
/// requests privileged actions only through the safe-output stream.
fn build_agent_job(spec: &WorkflowSpec) -> Job {
    let mut job = Job::new(AGENT_JOB_NAME, &spec.runs_on)
        .with_needs(&[ACTIVATION_JOB_NAME])
        .with_condition(&format!(
            "needs.{ACTIVATION_JOB_NAME}.outputs.{ACTIVATED_OUTPUT} == 'true'"
        ))
        .with_permissions(Permissions::from_grants(&[(
            PermissionScope::Contents,
            PermissionLevel::Read,
        )]))
        .with_timeout(spec.timeout_minutes)
        .with_env(ENGINE_ID_VAR, spec.engine.id.as_str())
        .with_env(
            NETWORK_DOMAINS_VAR,
            &spec.network.allowed_domains().join(","),
        );

    if let Some(version) = &spec.engine.version {
        job = job.with_env(ENGINE_VERSION_VAR, version);
    }
    if let Some(model) = &spec.engine.model {
        job = job.with_env(ENGINE_MODEL_VAR, model);
    }
    for (key, value) in &spec.env {
        job = job.with_env(key, value);
    }

    let prompt_script = format!(
        "mkdir -p /tmp/warden\ncat > /tmp/warden/prompt.md << 'WARDEN_PROMPT_EOF'\n{}\nWARDEN_PROMPT_EOF",
        spec.instructions.trim_end()
    );

    job.with_step(Step::uses("Checkout repository", CHECKOUT_ACTION))
        .with_step(Step::run("Write agent prompt", &prompt_script))
        .with_step(
            Step::run(
                "Run agent",
                &format!(
                    "warden-engine run --prompt /tmp/warden/prompt.md --output \"{AGENT_OUTPUT_PATH}\"\n\
                     echo \"output={AGENT_OUTPUT_PATH}\" >> \"$GITHUB_OUTPUT\""
                ),
            )
            .with_id("agent")
            .with_env(env::AGENT_OUTPUT_VAR, AGENT_OUTPUT_PATH),
        )
        .with_step(
            Step::uses("Upload agent output", UPLOAD_ARTIFACT_ACTION)
                .with_condition("always()")
                .with_input("name", AGENT_OUTPUT_ARTIFACT)
                .with_input("path", AGENT_OUTPUT_PATH)
                .with_input("if-no-files-found", "ignore"),
        )
        .with_output(
            AGENT_OUTPUT,
            &format!("${{{{ steps.agent.outputs.{AGENT_OUTPUT} }}}}"),
        )
}

/// One handler job per enabled kind, holding exactly that kind's minimal
/// permission set and the environment contract the runtime reads back.
fn build_safe_output_job(spec: &WorkflowSpec, kind: SafeOutputKind) -> Job {
    let mut job = Job::new(kind.job_name(), &spec.runs_on)
        .with_needs(&[AGENT_JOB_NAME])
        .with_condition(&format!(
            "needs.{AGENT_JOB_NAME}.outputs.{AGENT_OUTPUT} != ''"
        ))
        .with_permissions(kind.minimal_permissions())
        .with_env(env::AGENT_OUTPUT_VAR, AGENT_OUTPUT_PATH)
        .with_env(
            ALLOWED_DOMAINS_VAR,
            &spec.sanitizer_allowed_domains().join(","),
        );

    let target_repo = spec
        .safe_outputs
        .policy(kind)
        .and_then(|policy| policy.target_repo.clone())
        .or_else(|| spec.safe_outputs.target_repo.clone())
        .unwrap_or_default();
    job = job.with_env(TARGET_REPO_SLUG_VAR, &target_repo);

    for (name, value) in spec.safe_outputs.env_contract(kind) {
        job = job.with_env(&name, &value);
    }

    job.with_step(
        Step::uses("Download agent output", DOWNLOAD_ARTIFACT_ACTION)
            .with_input("name", AGENT_OUTPUT_ARTIFACT)
            .with_input("path", "/tmp/warden"),
    )
    .with_step(
        Step::run(
            &format!("Process {kind} outputs"),
            &format!("warden-outputs process --kind {kind}"),
        )
        .with_env("GH_TOKEN", "${{ github.token }}"),
    )
}

/// The always-run conclusion job: releases the activation lock and writes
/// the run summary regardless of upstream success or failure.
fn build_conclusion_job(spec: &WorkflowSpec, graph: &JobGraph) -> Job {
    let needs: Vec<&str> = graph.job_names();

    let mut permissions =
        Permissions::from_grants(&[(PermissionScope::Contents, PermissionLevel::Read)]);
    if spec.lock_for_agent {
        permissions = Permissions::from_grants(&[(PermissionScope::Issues, PermissionLevel::Write)]);
    }

    let mut job = Job::new(CONCLUSION_JOB_NAME, &spec.runs_on)
        .with_needs(&needs)
        .with_condition("always()")
        .with_permissions(permissions);

    if spec.lock_for_agent {
        let unlock_condition = ConditionNode::event_in(&["issues", "issue_comment"]);
        job = job.with_step(
            Step::run("Unlock conversation", "gh issue unlock \"$ISSUE_NUMBER\"")
                .with_condition(&unlock_condition.render())
                .with_env("GH_TOKEN", "${{ github.token }}")
                .with_env("ISSUE_NUMBER", "${{ github.event.issue.number }}"),
        );
    }

    job.with_step(Step::run(
        "Write run summary",
        &format!(
            "echo \"### {} run finished\" >> \"$GITHUB_STEP_SUMMARY\"\n\
             echo \"Agent output: ${{{{ needs.{AGENT_JOB_NAME}.outputs.{AGENT_OUTPUT} }}}}\" >> \"$GITHUB_STEP_SUMMARY\"",
            spec.name
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::{parse_document, MemoryImportResolver};

    fn spec(doc: &str) -> WorkflowSpec {
        parse_document("wf.md", doc, &MemoryImportResolver::new()).unwrap()
    }

    fn sample_spec() -> WorkflowSpec {
        spec(
            "---\nname: triage\non:\n  issues:\n    types: [opened]\nsafe-outputs:\n  create_issue:\n  add_comment:\n    max: 2\n---\nTriage incoming issues.\n",
        )
    }

    #[test]
    fn test_assemble_core_shape() {
        let graph = assemble(&sample_spec()).unwrap();
        assert!(graph.get(ACTIVATION_JOB_NAME).is_some());
        assert!(graph.get(AGENT_JOB_NAME).is_some());
        assert!(graph.get("create_issue").is_some());
        assert!(graph.get("add_comment").is_some());
        assert!(graph.get(CONCLUSION_JOB_NAME).is_some());
    }

    #[test]
    fn test_safe_output_jobs_depend_on_agent() {
        let graph = assemble(&sample_spec()).unwrap();
        assert!(graph.depends_transitively("create_issue", AGENT_JOB_NAME));
        assert!(graph.depends_transitively("add_comment", AGENT_JOB_NAME));
    }

    #[test]
    fn test_safe_output_permissions_are_minimal() {
        let graph = assemble(&sample_spec()).unwrap();
        let issue_job = graph.get("create_issue").unwrap();
        assert_eq!(
            issue_job.permissions,
            SafeOutputKind::CreateIssue.minimal_permissions()
        );
        assert_eq!(
            issue_job
                .permissions
                .level(PermissionScope::PullRequests),
            PermissionLevel::None
        );
    }

    #[test]
    fn test_agent_job_never_holds_write() {
        let graph = assemble(&sample_spec()).unwrap();
        let agent = graph.get(AGENT_JOB_NAME).unwrap();
        for (_, level) in agent.permissions.iter() {
            assert!(level <= PermissionLevel::Read);
        }
    }

    #[test]
    fn test_conclusion_always_runs_and_needs_everything() {
        let graph = assemble(&sample_spec()).unwrap();
        let conclusion = graph.get(CONCLUSION_JOB_NAME).unwrap();
        assert_eq!(conclusion.condition.as_deref(), Some("always()"));
        for name in graph.job_names() {
            if name != CONCLUSION_JOB_NAME {
                assert!(conclusion.needs.iter().any(|n| n == name));
            }
        }
    }

    #[test]
    fn test_lock_for_agent_adds_lock_and_unlock() {
        let spec = spec("---\non:\n  issues:\nlock-for-agent: true\nsafe-outputs:\n  add_comment:\n---\nBody.\n");
        let graph = assemble(&spec).unwrap();
        let activation = graph.get(ACTIVATION_JOB_NAME).unwrap();
        assert!(activation
            .steps
            .iter()
            .any(|s| s.id.as_deref() == Some("lock")));
        assert_eq!(
            activation.permissions.level(PermissionScope::Issues),
            PermissionLevel::Write
        );
        let conclusion = graph.get(CONCLUSION_JOB_NAME).unwrap();
        assert!(conclusion
            .steps
            .iter()
            .any(|s| s.run.as_deref().unwrap_or_default().contains("unlock")));
    }

    #[test]
    fn test_env_contract_present_on_safe_output_job() {
        let graph = assemble(&sample_spec()).unwrap();
        let job = graph.get("add_comment").unwrap();
        assert_eq!(
            job.env.get("WARDEN_ADD_COMMENT_MAX_COUNT").map(String::as_str),
            Some("2")
        );
        assert!(job.env.contains_key(ALLOWED_DOMAINS_VAR));
        assert!(job.env.contains_key(env::AGENT_OUTPUT_VAR));
    }

    #[test]
    fn test_custom_jobs_join_the_graph() {
        let spec = spec(
            "---\non:\n  workflow_dispatch:\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n---\nBody.\n",
        );
        let graph = assemble(&spec).unwrap();
        let deploy = graph.get("deploy").unwrap();
        assert_eq!(deploy.needs, vec![ACTIVATION_JOB_NAME]);
        assert!(graph.depends_transitively(CONCLUSION_JOB_NAME, "deploy"));
    }

    #[test]
    fn test_custom_job_with_dangling_needs_is_fatal() {
        let spec = spec(
            "---\non:\n  workflow_dispatch:\njobs:\n  deploy:\n    needs: [ghost]\n---\nBody.\n",
        );
        assert!(assemble(&spec).is_err());
    }
}
