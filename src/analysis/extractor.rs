use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::{CodeBlock, Comment, Issue};

const FENCE: &str = "```";

static ERROR_LINE: OnceLock<Regex> = OnceLock::new();

fn error_line_pattern() -> &'static Regex {
    ERROR_LINE.get_or_init(|| {
        Regex::new(r"(?i)(error(:|\[)|exception|panicked at|traceback|\bfatal:)")
            .expect("error line pattern is valid")
    })
}

/// Collect fenced code blocks. An unterminated fence yields nothing.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match open.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix(FENCE) {
                    let language = info.trim().trim_start_matches('`').to_string();
                    open = Some((language, Vec::new()));
                }
            }
            Some((language, lines)) => {
                if trimmed.trim_end() == FENCE {
                    blocks.push(CodeBlock {
                        language,
                        code: lines.join("\n").trim().to_string(),
                    });
                } else {
                    let mut lines = lines;
                    lines.push(line);
                    open = Some((language, lines));
                }
            }
        }
    }

    blocks
}

/// Lines that read like error reports, deduplicated in order of appearance.
pub fn extract_error_messages(text: &str) -> Vec<String> {
    let pattern = error_line_pattern();
    let mut seen = HashSet::new();

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(FENCE))
        .filter(|line| pattern.is_match(line))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn annotate_issue(issue: &mut Issue) {
    issue.code_blocks = extract_code_blocks(&issue.body);
    issue.error_messages = extract_error_messages(&issue.body);
}

pub fn annotate_comment(comment: &mut Comment) {
    comment.code_blocks = extract_code_blocks(&comment.body);
    comment.error_messages = extract_error_messages(&comment.body);
}
