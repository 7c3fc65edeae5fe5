/**
 * Template & Hand-off Assembler
 *
 * DESIGN DECISION: Template *selection and substitution logic* lives here; actual disk I/O for
 * template files is delegated through a `TemplateSource` trait the host implements
 * WHY: on-disk file I/O for templates and artifacts is an external collaborator, deliberately
 * out of scope of the core, mirroring how the model client itself stays external via the
 * `ModelSession` trait
 *
 * REASONING CHAIN:
 * 1. The assembler's job is pure: given a task, a stage, and raw template text, produce a
 *    substituted prompt string - it never needs to know whether the template came from a
 *    filesystem, a bundled resource, or a test fixture
 * 2. Hand-off tail parsing (handoff_parser.rs) is likewise pure text-in, struct-out
 *
 * PATTERN: prompt assembly grounded on context_loader/assembler.rs's section-by-section
 * `String` building; hand-off parsing grounded on session_handoff/loader.rs plus
 * verification/claim_parser.rs's regex-capture style
 */

mod handoff_parser;

pub use handoff_parser::{parse_tail, PartialHandoff};

use chrono::Utc;

use crate::error::Result;
use crate::model::group::{TaskGroup, WorkOrder};
use crate::model::handoff::Handoff;
use crate::model::stage::StageKind;
use crate::model::stage_output::StageOutput;
use crate::model::task::{Task, TaskId};

/// Host-provided access to template text. The assembler never touches the filesystem itself.
pub trait TemplateSource {
    /// Raw template text for a stage, looked up by `StageKind::template_filename()`.
    fn stage_template(&self, filename: &str) -> Result<String>;

    /// The hand-off-format appendix, concatenated unconditionally when present.
    fn handoff_appendix(&self) -> Option<String>;
}

/// One sibling task's summary for grouped-task prompts.
#[derive(Debug, Clone)]
pub struct SiblingSummary {
    pub id: TaskId,
    pub title: String,
    pub files_touched: Vec<String>,
}

const NA: &str = "N/A";

fn render_stage(task: &Task, stage: StageKind) -> String {
    task.stage_outputs.get(&stage).map(|o| o.render()).unwrap_or_else(|| NA.to_string())
}

fn render_code_review_field(task: &Task, comments: bool) -> String {
    match task.stage_outputs.get(&StageKind::CodeReview) {
        Some(StageOutput::CodeReview(o)) if comments => {
            if o.comments.is_empty() {
                NA.to_string()
            } else {
                o.comments.join("\n")
            }
        }
        Some(StageOutput::CodeReview(o)) => o.score.map(|s| s.to_string()).unwrap_or_else(|| NA.to_string()),
        _ => NA.to_string(),
    }
}

fn render_verify_field(task: &Task, test_results: bool) -> String {
    match task.stage_outputs.get(&StageKind::Verify) {
        Some(StageOutput::Verify(o)) if test_results => {
            if o.test_results.is_empty() {
                NA.to_string()
            } else {
                o.test_results.clone()
            }
        }
        Some(StageOutput::Verify(o)) => if o.passed { "passed".to_string() } else { "failed".to_string() },
        _ => NA.to_string(),
    }
}

fn render_handoff(h: &Handoff) -> String {
    format!(
        "Stage: {:?}\nAgent: {} ({})\nStatus: {:?}\n- **Summary**: {}\n- **Key Decisions**: {}\n\
- **Open Questions**: {}\n- **Files Modified**: {}\n- **Next Stage Needs**: {}\n- **Warnings**: {}",
        h.stage, h.agent_label, h.model_label, h.status, h.summary, h.key_decisions,
        h.open_questions, h.files_modified, h.next_stage_needs, h.warnings,
    )
}

fn render_previous_handoff(handoffs: &[Handoff]) -> String {
    handoffs.last().map(render_handoff).unwrap_or_else(|| NA.to_string())
}

fn render_handoff_chain(handoffs: &[Handoff]) -> String {
    if handoffs.is_empty() {
        return NA.to_string();
    }
    handoffs
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}", i + 1, render_handoff(h)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_work_order(order: &WorkOrder) -> String {
    let files = order
        .files
        .iter()
        .map(|f| format!("- {} ({}): {}", f.path, f.action, f.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Objective: {}\nFiles:\n{}\nPatterns: {}\nIntegration Points: {}\nConstraints: {}\nExpected Tests: {}",
        order.objective,
        if files.is_empty() { NA.to_string() } else { files },
        order.patterns.join(", "),
        order.integration_points.join(", "),
        order.constraints.join(", "),
        order.expected_tests.join(", "),
    )
}

fn render_siblings(siblings: &[SiblingSummary]) -> String {
    if siblings.is_empty() {
        return NA.to_string();
    }
    siblings
        .iter()
        .map(|s| format!("#{} {} - files: {}", s.id, s.title, s.files_touched.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn substitute(template: &str, tokens: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in tokens {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

/// Build the full prompt for `stage` of `task`, optionally with grouped-task placeholders
/// when `task` belongs to a group.
pub fn assemble_prompt(
    source: &dyn TemplateSource,
    task: &Task,
    stage: StageKind,
    group_context: Option<(&TaskGroup, Option<&WorkOrder>, &[SiblingSummary])>,
) -> Result<String> {
    let template = source.stage_template(stage.template_filename())?;

    let mut tokens: Vec<(&str, String)> = vec![
        ("task_title", task.title.clone()),
        ("task_description", task.description.clone()),
        ("tier", format!("{:?}", task.tier)),
        ("priority", task.priority.to_string()),
        ("timestamp", Utc::now().to_rfc3339()),
        ("brainstorm", render_stage(task, StageKind::Brainstorm)),
        ("design_review", render_stage(task, StageKind::DesignReview)),
        ("plan", render_stage(task, StageKind::Plan)),
        ("implementation_notes", render_stage(task, StageKind::Implement)),
        ("review_comments", render_code_review_field(task, true)),
        ("review_score", render_code_review_field(task, false)),
        ("test_results", render_verify_field(task, true)),
        ("verify_result", render_verify_field(task, false)),
        ("previous_handoff", render_previous_handoff(&task.handoffs)),
        ("handoff_chain", render_handoff_chain(&task.handoffs)),
    ];

    if let Some((group, work_order, siblings)) = group_context {
        tokens.push(("shared_context", group.shared_context.clone()));
        tokens.push((
            "work_order",
            work_order.map(render_work_order).unwrap_or_else(|| NA.to_string()),
        ));
        tokens.push(("siblings", render_siblings(siblings)));
    }

    let mut prompt = substitute(&template, &tokens);

    if let Some(appendix) = source.handoff_appendix() {
        prompt.push('\n');
        prompt.push_str(&appendix);
    }

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::group::WorkOrderFile;
    use crate::model::handoff::HandoffStatus;
    use crate::model::stage::Tier;
    use crate::model::stage_output::ImplementationOutput;

    struct FixedSource {
        template: String,
        appendix: Option<String>,
    }

    impl TemplateSource for FixedSource {
        fn stage_template(&self, _filename: &str) -> Result<String> {
            Ok(self.template.clone())
        }
        fn handoff_appendix(&self) -> Option<String> {
            self.appendix.clone()
        }
    }

    #[test]
    fn test_substitutes_basic_tokens_with_na_fallback() {
        let source = FixedSource {
            template: "Title: {{task_title}}\nPlan: {{plan}}".to_string(),
            appendix: None,
        };
        let task = Task::new(1, "Fix login", "desc", Tier::L1, 1);
        let prompt = assemble_prompt(&source, &task, StageKind::Plan, None).unwrap();
        assert!(prompt.contains("Title: Fix login"));
        assert!(prompt.contains("Plan: N/A"));
    }

    #[test]
    fn test_appendix_concatenated_unconditionally() {
        let source = FixedSource { template: "body".to_string(), appendix: Some("APPENDIX".to_string()) };
        let task = Task::new(1, "t", "d", Tier::L1, 1);
        let prompt = assemble_prompt(&source, &task, StageKind::Plan, None).unwrap();
        assert!(prompt.ends_with("APPENDIX"));
    }

    #[test]
    fn test_previous_handoff_renders_last_entry() {
        let source = FixedSource { template: "{{previous_handoff}}".to_string(), appendix: None };
        let mut task = Task::new(1, "t", "d", Tier::L2, 1);
        task.append_handoff(Handoff::synthesize(StageKind::Brainstorm, "a", "m", HandoffStatus::Completed, "ideas"));
        let prompt = assemble_prompt(&source, &task, StageKind::Plan, None).unwrap();
        assert!(prompt.contains("ideas"));
    }

    #[test]
    fn test_grouped_prompt_includes_work_order_and_siblings() {
        let source = FixedSource {
            template: "{{work_order}}\n{{siblings}}".to_string(),
            appendix: None,
        };
        let task = Task::new(1, "t", "d", Tier::L2, 1);
        let group = TaskGroup::new(10, "rollout");
        let order = WorkOrder {
            objective: "add auth".into(),
            files: vec![WorkOrderFile { path: "src/auth.rs".into(), action: "create".into(), description: "new module".into() }],
            patterns: vec![],
            integration_points: vec![],
            constraints: vec![],
            expected_tests: vec![],
        };
        let siblings = vec![SiblingSummary { id: 2, title: "sibling".into(), files_touched: vec!["src/b.rs".into()] }];

        let prompt = assemble_prompt(&source, &task, StageKind::Plan, Some((&group, Some(&order), &siblings))).unwrap();
        assert!(prompt.contains("add auth"));
        assert!(prompt.contains("sibling"));
    }

    #[test]
    fn test_implementation_notes_render_from_stage_output() {
        let source = FixedSource { template: "{{implementation_notes}}".to_string(), appendix: None };
        let mut task = Task::new(1, "t", "d", Tier::L1, 1);
        task.stage_outputs.insert(
            StageKind::Implement,
            StageOutput::Implementation(ImplementationOutput { notes: "wired up routes".into(), files_changed: vec![] }),
        );
        let prompt = assemble_prompt(&source, &task, StageKind::Implement, None).unwrap();
        assert!(prompt.contains("wired up routes"));
    }
}
