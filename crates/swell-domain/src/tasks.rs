//! Task model and task-list ingestion.
//!
//! The task list is a Markdown checklist shared with external workers. Each
//! task line looks like:
//!
//! ```text
//! - [ ] SW-001: implement the parser in `src/parse.rs`
//!   - **Constitution**: NO_HARDCODED_SECRETS, MAX_FUNCTION_LINES
//!   - depends on SW-000
//! ```
//!
//! Ingestion turns the file into [`Task`] values plus a [`ParseReport`] of
//! non-fatal warnings. Tasks have no long-term identity beyond the source
//! file: the ingestor runs on every orchestration call, and the external
//! worker communicates completion by toggling the checkbox, which the
//! checkpoint gate re-reads.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{DomainError, DomainResult};

/// Role assigned to tasks that do not name one.
pub const DEFAULT_ROLE: &str = "Developer";

static TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[( |x|X)\]\s+([A-Za-z][A-Za-z0-9_]*-\d+|T\d+)\s*:\s*(.+?)\s*$").unwrap()
});

static LIST_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\S").unwrap());

static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{2,}[-*]\s+(.+?)\s*$").unwrap());

static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());

static DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:after|depends\s+on)\s+([A-Za-z][A-Za-z0-9_]*-\d+|T\d+)").unwrap()
});

static RULES_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*Constitution\*\*:\s*(.*)$").unwrap());

static ROLE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*Role\*\*:\s*(.+?)\s*$").unwrap());

// Fallback for tasks that never backtick their paths. Ambiguous matches do
// not override backticked ones.
static UNQUOTED_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]*[A-Za-z0-9_-]+\.(?:py|rs|js|ts|tsx|go|java|c|h|cpp|rb|sh|sql|md|toml|yaml|yml|json|txt|html|css)\b")
        .unwrap()
});

/// A unit of work parsed from the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Stable short id (`<PREFIX>-<NNN>` or `T###`).
    pub id: String,
    /// Free-text description from the task line.
    pub description: String,
    /// Assigned-role hint.
    pub role: String,
    /// Checkbox state.
    pub complete: bool,
    /// File paths the task will write, ordered for display, unique,
    /// normalized (no leading `./`).
    pub files: Vec<String>,
    /// Explicit predecessor task ids.
    pub predecessors: Vec<String>,
    /// Rule tags naming rules in the rule document.
    pub rule_tags: Vec<String>,
    /// 0-based line index of the task line.
    pub line_index: usize,
}

/// A non-fatal warning emitted while parsing the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Human-readable message.
    pub message: String,
    /// Optional 0-based line index.
    pub line: Option<usize>,
    /// Optional task id the warning refers to.
    pub task_id: Option<String>,
}

/// Counts and warnings from one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Total tasks parsed.
    pub total: usize,
    /// Tasks with the checkbox ticked.
    pub complete: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<ParseWarning>,
}

/// Output of parsing the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    /// Tasks in source order.
    pub tasks: Vec<Task>,
    /// Counts and warnings.
    pub report: ParseReport,
}

impl TaskList {
    /// Ids of tasks whose checkbox is ticked.
    pub fn completed_ids(&self) -> BTreeSet<String> {
        self.tasks
            .iter()
            .filter(|t| t.complete)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Look up a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

struct PendingTask {
    task: Task,
    body: Vec<String>,
    saw_backtick_path: bool,
}

/// Parse the task list into [`Task`] values plus a report.
///
/// Fails with [`DomainError::InvalidTaskListFormat`] when the file contains
/// list-like lines but none shaped like a task, which usually means the
/// wrong bullet or checkbox style.
pub fn parse_task_list(contents: &str) -> DomainResult<TaskList> {
    let mut tasks: Vec<Task> = Vec::new();
    let mut warnings: Vec<ParseWarning> = Vec::new();
    let mut seen_ids: BTreeSet<String> = BTreeSet::new();
    let mut list_like_lines = 0usize;

    let mut current: Option<PendingTask> = None;

    for (line_idx, line) in contents.lines().enumerate() {
        if LIST_LIKE_RE.is_match(line) {
            list_like_lines += 1;
        }

        if let Some(cap) = TASK_RE.captures(line) {
            flush(&mut current, &mut tasks, &mut warnings);
            let marker = &cap[1];
            let id = cap[2].to_string();
            let description = cap[3].to_string();
            if seen_ids.contains(&id) {
                warnings.push(ParseWarning {
                    message: format!("duplicate task id '{id}'; second occurrence ignored"),
                    line: Some(line_idx),
                    task_id: Some(id),
                });
                continue;
            }
            seen_ids.insert(id.clone());
            current = Some(PendingTask {
                task: Task {
                    id,
                    description: description.clone(),
                    role: DEFAULT_ROLE.to_string(),
                    complete: marker.eq_ignore_ascii_case("x"),
                    files: Vec::new(),
                    predecessors: Vec::new(),
                    rule_tags: Vec::new(),
                    line_index: line_idx,
                },
                body: vec![description],
                saw_backtick_path: false,
            });
            continue;
        }

        // A top-level task-shaped line that failed the regex is worth
        // telling the author about; it also ends any open continuation
        // block. Indented `- [` bullets stay eligible as continuations.
        if line.starts_with("- [") {
            flush(&mut current, &mut tasks, &mut warnings);
            warnings.push(ParseWarning {
                message: format!("malformed task line: {}", line.trim()),
                line: Some(line_idx),
                task_id: None,
            });
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut current, &mut tasks, &mut warnings);
            continue;
        }

        if let Some(cap) = CONTINUATION_RE.captures(line)
            && let Some(pending) = current.as_mut()
        {
            let body = cap[1].to_string();
            if let Some(rules) = RULES_LINE_RE.captures(&body) {
                for tag in rules[1].split(',') {
                    let tag = tag.trim();
                    if !tag.is_empty() {
                        pending.task.rule_tags.push(tag.to_string());
                    }
                }
            } else if let Some(role) = ROLE_LINE_RE.captures(&body) {
                pending.task.role = role[1].to_string();
            } else {
                pending.body.push(body);
            }
            continue;
        }

        // Any other non-blank line ends any open continuation block.
        flush(&mut current, &mut tasks, &mut warnings);
    }
    flush(&mut current, &mut tasks, &mut warnings);

    if tasks.is_empty() && list_like_lines > 0 {
        return Err(DomainError::InvalidTaskListFormat {
            hint: format!(
                "{list_like_lines} bulleted line(s) found, none matching `- [ ] <ID>: <description>`"
            ),
        });
    }

    // Predecessors referencing unknown ids are kept as-is; the planner
    // treats them as missing and fails. Flag them here so the author sees
    // the problem next to the parse report.
    for task in &tasks {
        for pred in &task.predecessors {
            if !seen_ids.contains(pred) {
                warnings.push(ParseWarning {
                    message: format!(
                        "task '{}' references unknown predecessor '{pred}'",
                        task.id
                    ),
                    line: Some(task.line_index),
                    task_id: Some(task.id.clone()),
                });
            }
        }
    }

    let complete = tasks.iter().filter(|t| t.complete).count();
    let report = ParseReport {
        total: tasks.len(),
        complete,
        warnings,
    };
    Ok(TaskList { tasks, report })
}

fn flush(
    current: &mut Option<PendingTask>,
    tasks: &mut Vec<Task>,
    warnings: &mut Vec<ParseWarning>,
) {
    let Some(mut pending) = current.take() else {
        return;
    };
    let text = pending.body.join("\n");

    for cap in BACKTICK_RE.captures_iter(&text) {
        let token = cap[1].trim();
        if looks_like_path(token) {
            pending.saw_backtick_path = true;
            push_file(&mut pending.task.files, token);
        }
    }
    // Backtick paths are authoritative; the unquoted scan only runs when a
    // task never backticked anything path-shaped.
    if !pending.saw_backtick_path {
        let mut scanned_any = false;
        for m in UNQUOTED_PATH_RE.find_iter(&text) {
            scanned_any = true;
            push_file(&mut pending.task.files, m.as_str());
        }
        if scanned_any {
            warnings.push(ParseWarning {
                message: format!(
                    "task '{}' has no backticked paths; using best-effort scan",
                    pending.task.id
                ),
                line: Some(pending.task.line_index),
                task_id: Some(pending.task.id.clone()),
            });
        }
    }

    for cap in DEP_RE.captures_iter(&text) {
        let pred = cap[1].to_string();
        if pred != pending.task.id && !pending.task.predecessors.contains(&pred) {
            pending.task.predecessors.push(pred);
        }
    }

    tasks.push(pending.task);
}

fn push_file(files: &mut Vec<String>, raw: &str) {
    let normalized = normalize_path(raw);
    if normalized.is_empty() {
        return;
    }
    if !files.contains(&normalized) {
        files.push(normalized);
    }
}

/// Strip a leading `./` and trailing separators from a captured path token.
pub fn normalize_path(raw: &str) -> String {
    let mut path = raw.trim();
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped;
    }
    path.trim_end_matches('/').to_string()
}

fn looks_like_path(token: &str) -> bool {
    if token.contains(char::is_whitespace) {
        return false;
    }
    if token.contains('/') {
        return true;
    }
    match token.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => matches!(
            ext,
            "py" | "rs"
                | "js"
                | "ts"
                | "tsx"
                | "go"
                | "java"
                | "c"
                | "h"
                | "cpp"
                | "rb"
                | "sh"
                | "sql"
                | "md"
                | "toml"
                | "yaml"
                | "yml"
                | "json"
                | "txt"
                | "html"
                | "css"
        ),
        _ => false,
    }
}

/// Toggle the checkbox of `task_id` in `contents` to `complete`.
///
/// Returns the updated document, or `None` when no line for `task_id`
/// exists. Only the single task line changes; the rest of the file is
/// preserved byte-for-byte.
pub fn set_task_complete(contents: &str, task_id: &str, complete: bool) -> Option<String> {
    let mut out: Vec<String> = Vec::new();
    let mut found = false;
    for line in contents.lines() {
        if !found
            && let Some(cap) = TASK_RE.captures(line)
            && &cap[2] == task_id
        {
            let marker = if complete { "x" } else { " " };
            let rest = line.splitn(2, ']').nth(1).unwrap_or_default();
            out.push(format!("- [{marker}]{rest}"));
            found = true;
            continue;
        }
        out.push(line.to_string());
    }
    if !found {
        return None;
    }
    let mut joined = out.join("\n");
    if contents.ends_with('\n') {
        joined.push('\n');
    }
    Some(joined)
}
