//! End-to-end agent runs over a scratch project with a scripted model.

use coder::core::context::ContextAccumulator;
use coder::core::state::RunOutcome;
use coder::io::context::preload_mentions;
use coder::io::prompt::PromptBuilder;
use coder::looping::run_agent;
use coder::test_support::{ScriptedCommandRunner, ScriptedModel, TestProject};
use coder::turn::{Check, TurnConfig, TurnDeps, TurnReport};

fn config(max_turns: u32) -> TurnConfig {
    TurnConfig {
        run_id: "run-e2e".to_string(),
        model: "scripted".to_string(),
        stream: true,
        max_turns,
        lint: None,
        compile: None,
    }
}

fn run(
    project: &TestProject,
    model: &ScriptedModel,
    commands: &ScriptedCommandRunner,
    cfg: &TurnConfig,
    task: &str,
) -> anyhow::Result<(coder::looping::AgentOutcome, Vec<TurnReport>)> {
    let prompts = PromptBuilder::default();
    let deps = TurnDeps {
        model,
        workspace: project.workspace(),
        commands,
        prompts: &prompts,
        transcript: None,
    };
    let mut reports = Vec::new();
    let outcome = run_agent(&deps, cfg, task, ContextAccumulator::new(), |r| {
        reports.push(r.clone())
    })?;
    Ok((outcome, reports))
}

#[test]
fn write_then_done_completes_in_one_turn() {
    let project = TestProject::new().expect("project");
    let model = ScriptedModel::new(["<write_file path=\"a.txt\">hello</write_file><done>ok</done>"]);
    let commands = ScriptedCommandRunner::new("");

    let (outcome, reports) =
        run(&project, &model, &commands, &config(5), "create a.txt").expect("run");

    assert_eq!(project.read("a.txt").expect("read"), "hello");
    assert_eq!(
        outcome.outcome,
        RunOutcome::Completed {
            message: "ok".to_string()
        }
    );
    assert_eq!(outcome.turns_executed, 1);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].effects.written, vec!["a.txt".to_string()]);
}

#[test]
fn content_with_markup_hazards_is_written_verbatim() {
    let project = TestProject::new().expect("project");
    let body = "\nif (a < b && c > d) { x = \"<tag>\"; }\n";
    let response = format!(
        "Sure!\n<write_file path=\"src/x.c\">{body}</write_file>\n<done>written</done>\nThanks."
    );
    let model = ScriptedModel::new([response]);
    let commands = ScriptedCommandRunner::new("");

    let (outcome, _) = run(&project, &model, &commands, &config(2), "t").expect("run");

    assert_eq!(project.read("src/x.c").expect("read"), body);
    assert!(matches!(outcome.outcome, RunOutcome::Completed { .. }));
}

#[test]
fn unmatched_edits_are_reported_and_fed_back() {
    let project = TestProject::new().expect("project");
    project.write("one.py", "a = 1\n").expect("write");
    project.write("two.py", "b = 2\n").expect("write");
    let model = ScriptedModel::new([
        "<edit_file path=\"one.py\"><old>zzz</old><new>y</new></edit_file>\
         <edit_file path=\"two.py\"><old>zzz</old><new>y</new></edit_file>",
        "<done/>",
    ]);
    let commands = ScriptedCommandRunner::new("");

    let (_, reports) = run(&project, &model, &commands, &config(3), "t").expect("run");

    let summary = &reports[0].summary;
    assert!(summary.contains("one.py"), "{summary}");
    assert!(summary.contains("two.py"), "{summary}");
    assert!(summary.contains("old text not found"), "{summary}");
    assert_eq!(reports[0].effects.failures.len(), 2);
    assert_eq!(project.read("one.py").expect("read"), "a = 1\n");

    let second = model.user_message(1).expect("second prompt");
    assert!(second.contains("<edit_failures>"));
    assert!(second.contains("<failure path=\"one.py\" reason=\"old text not found\" />"));
}

#[test]
fn edit_failures_are_cleared_on_the_next_turn() {
    let project = TestProject::new().expect("project");
    project.write("a.py", "x = 1\n").expect("write");
    let model = ScriptedModel::new([
        "<edit_file path=\"a.py\"><old>nope</old><new>y</new></edit_file>",
        "<edit_file path=\"a.py\"><old>x = 1</old><new>x = 2</new></edit_file>",
        "<done/>",
    ]);
    let commands = ScriptedCommandRunner::new("");

    let (outcome, reports) = run(&project, &model, &commands, &config(5), "t").expect("run");

    assert_eq!(reports[1].summary, "Edited: a.py");
    assert!(outcome.context.edit_failures().is_empty());
    let third = model.user_message(2).expect("third prompt");
    assert!(!third.contains("<edit_failures>"));
    assert_eq!(project.read("a.py").expect("read"), "x = 2\n");
}

#[test]
fn context_requests_are_answered_before_the_next_turn() {
    let project = TestProject::new().expect("project");
    project
        .write("src/app.py", "def main():\n    return 1\n")
        .expect("write");
    let model = ScriptedModel::new([
        "<need_context>\
           <read_file path=\"src/app.py\"/>\
           <grep pattern=\"def \\w+\" path=\"src\"/>\
           <list_dir path=\".\"/>\
         </need_context>",
        "<done>seen</done>",
    ]);
    let commands = ScriptedCommandRunner::new("");

    let (outcome, reports) = run(&project, &model, &commands, &config(3), "t").expect("run");

    assert_eq!(reports[0].summary, "No changes.");
    let second = model.user_message(1).expect("second prompt");
    assert!(second.contains("<file path=\"src/app.py\">"));
    assert!(second.contains("<match file=\"src/app.py\" line=\"1\">def main():</match>"));
    assert!(second.contains("<dir name=\"src\" />"));
    assert_eq!(outcome.context.files().len(), 1);
}

#[test]
fn checks_run_each_unfinished_turn_and_reach_the_prompt() {
    let project = TestProject::new().expect("project");
    let model = ScriptedModel::new([
        "<write_file path=\"m.py\">import os\n</write_file>",
        "<done/>",
    ]);
    let commands = ScriptedCommandRunner::new("m.py:1:8: F401 `os` imported but unused");
    let mut cfg = config(3);
    cfg.lint = Some(Check {
        command: "ruff check .".to_string(),
        cwd: ".".into(),
    });
    cfg.compile = Some(Check {
        command: "python -m py_compile m.py".to_string(),
        cwd: ".".into(),
    });

    let (_, reports) = run(&project, &model, &commands, &cfg, "t").expect("run");

    assert_eq!(commands.calls().len(), 2, "checks skipped on the done turn");
    assert!(
        reports[0]
            .summary
            .starts_with("Wrote: m.py Lint: m.py:1:8: F401"),
        "{}",
        reports[0].summary
    );
    assert!(reports[0].summary.contains("Compile: "));
    let second = model.user_message(1).expect("second prompt");
    assert!(second.contains("<lint_errors>"));
    assert!(second.contains("<compile_output>"));
}

#[test]
fn budget_exhaustion_is_reported() {
    let project = TestProject::new().expect("project");
    let model = ScriptedModel::new([
        "<write_file path=\"a.txt\">1</write_file>",
        "<write_file path=\"a.txt\">2</write_file>",
    ]);
    let commands = ScriptedCommandRunner::new("");

    let (outcome, reports) = run(&project, &model, &commands, &config(2), "t").expect("run");

    assert_eq!(outcome.outcome, RunOutcome::Exhausted { turns: 2 });
    assert_eq!(reports.len(), 2);
    assert_eq!(project.read("a.txt").expect("read"), "2");
}

#[test]
fn response_without_markup_aborts_the_run() {
    let project = TestProject::new().expect("project");
    let model = ScriptedModel::new(["I cannot help with that."]);
    let commands = ScriptedCommandRunner::new("");

    let err = run(&project, &model, &commands, &config(3), "t").expect_err("parse failure");
    assert!(format!("{err:#}").contains("no markup found"));
}

#[test]
fn model_errors_abort_the_run() {
    let project = TestProject::new().expect("project");
    let model = ScriptedModel::new(["<list_dir path=\".\"/>"]).then_fail("connection refused");
    let commands = ScriptedCommandRunner::new("");

    let err = run(&project, &model, &commands, &config(5), "t").expect_err("model failure");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("model call failed on turn 2"), "{rendered}");
    assert!(rendered.contains("connection refused"), "{rendered}");
}

#[test]
fn mentions_are_preloaded_into_the_first_prompt() {
    let project = TestProject::new().expect("project");
    project.write("notes/plan.md", "step one\n").expect("write");
    let model = ScriptedModel::new(["<done/>"]);
    let commands = ScriptedCommandRunner::new("");
    let prompts = PromptBuilder::default();
    let deps = TurnDeps {
        model: &model,
        workspace: project.workspace(),
        commands: &commands,
        prompts: &prompts,
        transcript: None,
    };

    let task = "follow @notes/plan.md";
    let mut ctx = ContextAccumulator::new();
    preload_mentions(task, project.root(), project.workspace(), &mut ctx);
    run_agent(&deps, &config(1), task, ctx, |_| {}).expect("run");

    let first = model.user_message(0).expect("first prompt");
    assert!(first.contains("<file path=\"notes/plan.md\">"));
    assert!(first.contains("step one"));
}
