//! YAML emission
//!
//! Renders an assembled [`JobGraph`] into the target platform's workflow
//! syntax. Rendering is by hand rather than through a map-backed YAML
//! library: key order is fixed by the code, list order by insertion, so an
//! identical graph always produces a byte-identical artifact.

use crate::graph::JobGraph;
use crate::job::{Job, Step};
use serde_yaml::Value;
use std::collections::BTreeMap;
use warden_config::WorkflowSpec;
use warden_core::constants::MAX_EXPRESSION_LINE_LENGTH;

const HEADER: &str = "# Generated by the Warden workflow compiler. Do not edit by hand.\n";

/// Render the complete workflow file.
pub fn emit(spec: &WorkflowSpec, graph: &JobGraph) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push_str(&format!("name: {}\n", scalar(&spec.name)));
    if let Some(description) = &spec.description {
        out.push_str(&format!("# {description}\n"));
    }
    out.push_str(&spec.triggers.render_yaml());

    // The workflow level grants nothing; every job re-declares its own set.
    out.push_str("permissions: {}\n");
    out.push_str("jobs:\n");
    for job in graph.jobs() {
        out.push_str(&render_job(job));
    }
    out
}

fn render_job(job: &Job) -> String {
    let mut out = String::new();
    out.push_str(&format!("  {}:\n", job.name));

    if let Some(display_name) = &job.display_name {
        out.push_str(&format!("    name: {}\n", scalar(display_name)));
    }

    match job.needs.len() {
        0 => {}
        1 => out.push_str(&format!("    needs: {}\n", job.needs[0])),
        _ => {
            out.push_str("    needs:\n");
            for dependency in &job.needs {
                out.push_str(&format!("      - {dependency}\n"));
            }
        }
    }

    if let Some(condition) = &job.condition {
        out.push_str(&render_condition(condition, 4));
    }

    if let Some(body) = &job.custom_body {
        out.push_str(&render_custom_body(body));
        return out;
    }

    out.push_str(&format!("    runs-on: {}\n", job.runs_on));
    out.push_str(&job.permissions.render_yaml(4));

    if let Some(timeout) = job.timeout_minutes {
        out.push_str(&format!("    timeout-minutes: {timeout}\n"));
    }

    render_map(&mut out, "env", &job.env, 4);
    render_map(&mut out, "outputs", &job.outputs, 4);

    if !job.steps.is_empty() {
        out.push_str("    steps:\n");
        for step in &job.steps {
            out.push_str(&render_step(step));
        }
    }
    out
}

fn render_step(step: &Step) -> String {
    let mut out = String::new();
    let mut first = true;
    let mut field = |text: String, out: &mut String| {
        if first {
            out.push_str(&format!("      - {text}"));
            first = false;
        } else {
            out.push_str(&format!("        {text}"));
        }
    };

    if let Some(name) = &step.name {
        field(format!("name: {}\n", scalar(name)), &mut out);
    }
    if let Some(id) = &step.id {
        field(format!("id: {id}\n"), &mut out);
    }
    if let Some(condition) = &step.condition {
        field(format!("if: {condition}\n"), &mut out);
    }
    if let Some(uses) = &step.uses {
        field(format!("uses: {uses}\n"), &mut out);
    }
    if !step.with.is_empty() {
        field("with:\n".to_string(), &mut out);
        for (key, value) in &step.with {
            out.push_str(&format!("          {key}: {}\n", scalar(value)));
        }
    }
    if !step.env.is_empty() {
        field("env:\n".to_string(), &mut out);
        for (key, value) in &step.env {
            out.push_str(&format!("          {key}: {}\n", scalar(value)));
        }
    }
    if let Some(run) = &step.run {
        field("run: |\n".to_string(), &mut out);
        for line in run.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("          {line}\n"));
            }
        }
    }
    out
}

/// Long expressions render in folded style, broken at boolean operators,
/// so emitted artifacts stay reviewable.
fn render_condition(condition: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    if condition.len() <= MAX_EXPRESSION_LINE_LENGTH && !condition.contains('\n') {
        return format!("{pad}if: {condition}\n");
    }
    let mut out = format!("{pad}if: >\n");
    for line in break_expression(condition) {
        out.push_str(&format!("{pad}  {line}\n"));
    }
    out
}

fn break_expression(expression: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = expression;
    loop {
        if rest.len() <= MAX_EXPRESSION_LINE_LENGTH {
            lines.push(rest.to_string());
            return lines;
        }
        // Break at the last boolean operator inside the budget.
        let window = &rest[..MAX_EXPRESSION_LINE_LENGTH];
        let cut = window.rfind(" && ").or_else(|| window.rfind(" || "));
        match cut {
            Some(pos) => {
                // Keep the operator at the end of the line.
                lines.push(rest[..pos + 3].trim_end().to_string());
                rest = rest[pos + 3..].trim_start();
            }
            None => {
                lines.push(rest.to_string());
                return lines;
            }
        }
    }
}

fn render_map(out: &mut String, key: &str, map: &BTreeMap<String, String>, indent: usize) {
    if map.is_empty() {
        return;
    }
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}{key}:\n"));
    for (name, value) in map {
        out.push_str(&format!("{pad}  {name}: {}\n", scalar(value)));
    }
}

/// Render a user-declared custom job body verbatim (minus `needs`, which
/// is already rendered from the graph edge). A body that does not declare
/// permissions gets the empty set: no job relies on ambient permissions.
fn render_custom_body(body: &Value) -> String {
    let mut trimmed = body.clone();
    let mut has_permissions = false;
    if let Value::Mapping(map) = &mut trimmed {
        map.remove(Value::from("needs"));
        has_permissions = map.contains_key(Value::from("permissions"));
    }
    let mut out = String::new();
    if !has_permissions {
        out.push_str("    permissions: {}\n");
    }
    let rendered = serde_yaml::to_string(&trimmed).unwrap_or_default();
    for line in rendered.lines() {
        if line == "---" || line.is_empty() {
            continue;
        }
        out.push_str(&format!("    {line}\n"));
    }
    out
}

/// Quote a scalar when plain YAML would reinterpret it.
fn scalar(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value.contains(": ")
        || value.ends_with(':')
        || value.contains('#')
        || value.contains('"')
        || value.starts_with(['\'', '&', '*', '!', '|', '>', '%', '@', '`', '-', '[', ']', '{', '}'])
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value.parse::<f64>().is_ok()
        || matches!(value, "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off");
    if needs_quoting {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use warden_config::{parse_document, MemoryImportResolver};

    fn spec(doc: &str) -> WorkflowSpec {
        parse_document("wf.md", doc, &MemoryImportResolver::new()).unwrap()
    }

    fn sample() -> (WorkflowSpec, JobGraph) {
        let spec = spec(
            "---\nname: triage\non:\n  issues:\n    types: [opened]\nsafe-outputs:\n  create_issue:\n---\nTriage issues.\n",
        );
        let graph = assemble(&spec).unwrap();
        (spec, graph)
    }

    #[test]
    fn test_emit_is_deterministic() {
        let (spec, graph) = sample();
        let first = emit(&spec, &graph);
        let second = emit(&spec, &graph);
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_job_declares_permissions() {
        let (spec, graph) = sample();
        let yaml = emit(&spec, &graph);
        let job_count = graph.len();
        let permission_blocks = yaml.matches("    permissions:").count();
        assert_eq!(job_count, permission_blocks);
    }

    #[test]
    fn test_workflow_level_permissions_are_empty() {
        let (spec, graph) = sample();
        let yaml = emit(&spec, &graph);
        assert!(yaml.contains("\npermissions: {}\n"));
    }

    #[test]
    fn test_env_contract_rendered_verbatim() {
        let (spec, graph) = sample();
        let yaml = emit(&spec, &graph);
        assert!(yaml.contains("WARDEN_CREATE_ISSUE_MAX_COUNT: "));
        assert!(yaml.contains("WARDEN_CREATE_ISSUE_STAGED: "));
    }

    #[test]
    fn test_long_condition_folds() {
        let long = (0..20)
            .map(|i| format!("github.event_name == 'event_{i}'"))
            .collect::<Vec<_>>()
            .join(" || ");
        let rendered = render_condition(&long, 4);
        assert!(rendered.starts_with("    if: >\n"));
        for line in rendered.lines().skip(1) {
            assert!(line.len() <= MAX_EXPRESSION_LINE_LENGTH + 10);
        }
    }

    #[test]
    fn test_scalar_quoting() {
        assert_eq!(scalar("plain"), "plain");
        assert_eq!(scalar("true"), "\"true\"");
        assert_eq!(scalar("3.14"), "\"3.14\"");
        assert_eq!(scalar(""), "\"\"");
        // Platform expressions do not start with a flow indicator and stay plain.
        assert_eq!(scalar("${{ github.token }}"), "${{ github.token }}");
        assert_eq!(scalar("a: b"), "\"a: b\"");
    }

    #[test]
    fn test_run_block_rendering() {
        let step = Step::run("Say", "echo one\necho two");
        let rendered = render_step(&step);
        assert!(rendered.contains("        run: |\n          echo one\n          echo two\n"));
    }
}
