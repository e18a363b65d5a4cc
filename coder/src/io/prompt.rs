//! Prompt assembly: system prompt, user message and the rendered context.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::context::ContextAccumulator;
use crate::core::types::ChatMessage;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

const MAX_RENDERED_MATCHES: usize = 50;
const MAX_RENDERED_ENTRIES: usize = 100;

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("user.md", USER_TEMPLATE)
            .expect("user template should be valid");
        Self { env }
    }

    fn render_user(&self, task: &str, previous: &str, context_xml: &str) -> Result<String> {
        let template = self.env.get_template("user.md")?;
        let rendered = template
            .render(context! {
                task => task.trim(),
                previous => (!previous.trim().is_empty()).then(|| previous.trim()),
                context => (!context_xml.trim().is_empty()).then_some(context_xml),
            })
            .context("render user prompt")?;
        Ok(rendered)
    }
}

/// Builds the two-message conversation sent on every turn.
pub struct PromptBuilder {
    engine: PromptEngine,
    system_prompt: String,
}

impl PromptBuilder {
    /// Use `system_override` as the system prompt when present, else the built-in one.
    pub fn new(system_override: Option<String>) -> Self {
        let system_prompt = system_override
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SYSTEM_TEMPLATE.to_string());
        Self {
            engine: PromptEngine::new(),
            system_prompt,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Render the user message for one turn.
    pub fn user_message(
        &self,
        task: &str,
        previous_summary: &str,
        ctx: &ContextAccumulator,
    ) -> Result<String> {
        self.engine
            .render_user(task, previous_summary, &render_context(ctx))
    }

    pub fn build_messages(
        &self,
        task: &str,
        previous_summary: &str,
        ctx: &ContextAccumulator,
    ) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.user_message(task, previous_summary, ctx)?),
        ])
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Render the accumulator as a `<context>` XML document.
///
/// File bodies, overviews and command output go into CDATA sections; an empty
/// accumulator renders as the empty string.
pub fn render_context(ctx: &ContextAccumulator) -> String {
    if ctx.is_empty() {
        return String::new();
    }
    let mut out = String::from("<context>\n");

    if !ctx.files().is_empty() {
        out.push_str("  <files>\n");
        for (path, content) in ctx.files() {
            let _ = writeln!(out, "    <file path=\"{}\">", escape_attr(path));
            let _ = writeln!(out, "      <content>{}</content>", cdata(content));
            out.push_str("    </file>\n");
        }
        out.push_str("  </files>\n");
    }

    if !ctx.api_overviews().is_empty() {
        out.push_str("  <api_overviews>\n");
        for (header, overview) in ctx.api_overviews() {
            let _ = writeln!(out, "    <api_overview header=\"{}\">", escape_attr(header));
            let _ = writeln!(out, "{}", cdata(overview));
            out.push_str("    </api_overview>\n");
        }
        out.push_str("  </api_overviews>\n");
    }

    for search in ctx.searches() {
        let _ = writeln!(
            out,
            "  <search pattern=\"{}\" path=\"{}\">",
            escape_attr(&search.pattern),
            escape_attr(&search.path)
        );
        for m in search.matches.iter().take(MAX_RENDERED_MATCHES) {
            let _ = writeln!(
                out,
                "    <match file=\"{}\" line=\"{}\">{}</match>",
                escape_attr(&m.file),
                m.line,
                escape_attr(&m.text)
            );
        }
        if search.matches.len() > MAX_RENDERED_MATCHES {
            let _ = writeln!(
                out,
                "    <!-- {} more matches -->",
                search.matches.len() - MAX_RENDERED_MATCHES
            );
        }
        out.push_str("  </search>\n");
    }

    for listing in ctx.dirs() {
        let _ = writeln!(out, "  <list_dir path=\"{}\">", escape_attr(&listing.path));
        for entry in listing.entries.iter().take(MAX_RENDERED_ENTRIES) {
            let tag = if entry.is_dir { "dir" } else { "file" };
            let _ = writeln!(out, "    <{tag} name=\"{}\" />", escape_attr(&entry.name));
        }
        if listing.entries.len() > MAX_RENDERED_ENTRIES {
            let _ = writeln!(
                out,
                "    <!-- {} more -->",
                listing.entries.len() - MAX_RENDERED_ENTRIES
            );
        }
        out.push_str("  </list_dir>\n");
    }

    if !ctx.lint_output().is_empty() {
        let _ = writeln!(out, "  <lint_errors>\n{}\n  </lint_errors>", cdata(ctx.lint_output()));
    }
    if !ctx.compile_output().is_empty() {
        let _ = writeln!(
            out,
            "  <compile_output>\n{}\n  </compile_output>",
            cdata(ctx.compile_output())
        );
    }

    if !ctx.edit_failures().is_empty() {
        out.push_str("  <edit_failures>\n");
        for failure in ctx.edit_failures() {
            let _ = writeln!(
                out,
                "    <failure path=\"{}\" reason=\"{}\" />",
                escape_attr(&failure.path),
                escape_attr(&failure.reason)
            );
        }
        out.push_str("  </edit_failures>\n");
    }

    out.push_str("</context>");
    out
}

/// Wrap `text` in a CDATA section, splitting any embedded terminator.
fn cdata(text: &str) -> String {
    format!("<![CDATA[\n{}\n]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn escape_attr(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
