//! Resilient parser for model responses.
//!
//! Content-bearing blocks (`write_file`, `edit_file`) are lifted out with a
//! tolerant regex scan because their bodies are source code and routinely hold
//! unescaped `<`, `>` and `&`. Only after those blocks are replaced with inert
//! placeholders is the remaining control vocabulary (`need_context`, `done`)
//! parsed as strict XML.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{ContextRequest, ControlParse, EditFile, ParsedOutput, WriteFile};

const WRITE_PLACEHOLDER: &str = "<_w/>";
const EDIT_PLACEHOLDER: &str = "<_e/>";
const SYNTHETIC_ROOT: &str = "response";

/// Both block kinds in a single alternation so matches never overlap and
/// come back in document order. Attribute runs may not end in `/`, so a
/// self-closing tag never opens a block.
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<write_file\b((?:[^>/]|/[^>])*)>(.*?)</write_file\s*>|<edit_file\b((?:[^>/]|/[^>])*)>\s*<old>(.*?)</old>\s*<new>(.*?)</new>\s*</edit_file\s*>",
    )
    .expect("block regex should be valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex should be valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no markup found in model response")]
    MissingMarkup,
}

/// Parse one model response into structured actions.
///
/// Fails only when the response has no markup span at all. A malformed control
/// section is reported through [`ParsedOutput::control`] while write/edit blocks
/// are still returned.
pub fn parse(raw: &str) -> Result<ParsedOutput, ParseError> {
    let span = markup_span(raw).ok_or(ParseError::MissingMarkup)?;

    let mut out = ParsedOutput::default();
    let sanitized = extract_content_blocks(span, &mut out);

    match parse_control(&sanitized, &mut out) {
        Ok(()) => out.control = ControlParse::Parsed,
        Err(err) => {
            warn!(err = %err, "control markup not well-formed, ignoring need_context/done");
            out.control = ControlParse::Malformed {
                reason: err.to_string(),
            };
        }
    }

    debug!(
        writes = out.write_files.len(),
        edits = out.edit_files.len(),
        requests = out.context_requests.len(),
        done = out.done,
        "parsed model response"
    );
    Ok(out)
}

/// Substring from the first `<` to the last `>` of the trimmed input.
pub fn markup_span(raw: &str) -> Option<&str> {
    let text = raw.trim();
    let start = text.find('<')?;
    let end = text.rfind('>')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Collect write/edit blocks into `out` and return the span with each block
/// swapped for a placeholder element.
fn extract_content_blocks(span: &str, out: &mut ParsedOutput) -> String {
    let mut sanitized = String::with_capacity(span.len());
    let mut last = 0;

    for caps in BLOCK_RE.captures_iter(span) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        sanitized.push_str(&span[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            sanitized.push_str(WRITE_PLACEHOLDER);
            if let Some(write) = write_from_captures(&caps) {
                out.write_files.push(write);
            }
        } else {
            sanitized.push_str(EDIT_PLACEHOLDER);
            if let Some(edit) = edit_from_captures(&caps) {
                out.edit_files.push(edit);
            }
        }
    }
    sanitized.push_str(&span[last..]);
    sanitized
}

fn write_from_captures(caps: &Captures<'_>) -> Option<WriteFile> {
    let attrs = parse_attributes(caps.get(1)?.as_str());
    let path = non_blank(attr(&attrs, "path"))?;
    Some(WriteFile {
        path,
        content: caps.get(2).map_or("", |m| m.as_str()).to_string(),
    })
}

fn edit_from_captures(caps: &Captures<'_>) -> Option<EditFile> {
    let attrs = parse_attributes(caps.get(3)?.as_str());
    let path = non_blank(attr(&attrs, "path"))?;
    let replace_all = attr(&attrs, "replace_all")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
    Some(EditFile {
        path,
        old: caps.get(4).map_or("", |m| m.as_str()).to_string(),
        new: caps.get(5).map_or("", |m| m.as_str()).to_string(),
        replace_all,
    })
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((name, value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_control(sanitized: &str, out: &mut ParsedOutput) -> Result<(), roxmltree::Error> {
    let wrapped = format!("<{SYNTHETIC_ROOT}>{sanitized}</{SYNTHETIC_ROOT}>");
    let doc = roxmltree::Document::parse(&wrapped)?;

    for node in doc.root_element().descendants().filter(|n| n.is_element()) {
        let tag = node.tag_name().name();
        if tag.eq_ignore_ascii_case("need_context") {
            for child in node.children().filter(|n| n.is_element()) {
                if let Some(request) = context_request(child) {
                    out.context_requests.push(request);
                }
            }
        } else if tag.eq_ignore_ascii_case("done") && !out.done {
            out.done = true;
            out.done_message = node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect::<String>()
                .trim()
                .to_string();
        }
    }
    Ok(())
}

fn context_request(node: roxmltree::Node<'_, '_>) -> Option<ContextRequest> {
    let tag = node.tag_name().name().to_ascii_lowercase();
    let get = |name: &str| {
        node.attributes()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .map(|a| a.value().trim().to_string())
    };

    match tag.as_str() {
        "read_file" => Some(ContextRequest::ReadFile {
            path: get("path").unwrap_or_default(),
        }),
        "grep" => Some(ContextRequest::Grep {
            pattern: get("pattern").unwrap_or_default(),
            path: get("path").unwrap_or_else(|| ".".to_string()),
        }),
        "list_dir" => Some(ContextRequest::ListDir {
            path: get("path").unwrap_or_else(|| ".".to_string()),
        }),
        "api_overview" => get("header")
            .filter(|header| !header.is_empty())
            .map(|header| ContextRequest::ApiOverview { header }),
        other => {
            debug!(tag = other, "ignoring unknown need_context child");
            None
        }
    }
}
