//! Rule validation at checkpoint boundaries.
//!
//! The engine loads the rule document, resolves a task's rule tags against
//! the known rule ids, and evaluates files with the closed set of validator
//! kinds from `swell-domain`. Every validator is deterministic and pure
//! with respect to file contents, which is what makes the content-hash
//! cache sound: validating an unchanged file twice short-circuits and
//! returns the same violations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use swell_domain::rules::{
    DEFAULT_MAX_FUNCTION_LINES, Rule, RuleDocument, RuleSeverity, StructuralCheck, ValidatorSpec,
};

use crate::errors::{CoreError, CoreResult};

/// Bytes inspected by the binary-file heuristic.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

static BARE_EXCEPT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^\s*except\s*:", r"catch\s*\(\s*\.\.\.\s*\)"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static FN_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(pub\s+fn\s+\w+|def\s+[a-zA-Z]\w*)").unwrap());

static FN_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub\s+)?(?:async\s+)?fn\s+\w+|^\s*def\s+\w+").unwrap()
});

/// One finding from a validation call. Created per call, reported to the
/// user, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rule that fired.
    pub rule_id: String,
    /// File the finding is in (as passed to the engine).
    pub file: String,
    /// Optional 1-based line number.
    pub line: Option<u32>,
    /// Human-readable message.
    pub message: String,
    /// Severity; only `error` blocks a checkpoint.
    pub severity: RuleSeverity,
}

impl Violation {
    /// True when this violation blocks a checkpoint.
    pub fn blocking(&self) -> bool {
        self.severity == RuleSeverity::Error
    }
}

/// Outcome of resolving a task's rule tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRules {
    /// Tags that name known, executable rules.
    pub known: Vec<String>,
    /// Tags with no matching rule in the document; skipped with a warning.
    pub unknown: Vec<String>,
    /// Tags naming rules that carry no validator; skipped with a warning.
    pub unenforceable: Vec<String>,
}

/// The rule engine: parsed document plus the validation cache.
pub struct RuleEngine {
    document: RuleDocument,
    // file path -> (content hash, rule id -> violations)
    cache: BTreeMap<String, (String, BTreeMap<String, Vec<Violation>>)>,
}

impl RuleEngine {
    /// Build an engine from rule-document contents.
    pub fn from_contents(contents: &str) -> Self {
        Self {
            document: RuleDocument::parse(contents),
            cache: BTreeMap::new(),
        }
    }

    /// Load the rule document at `path`.
    ///
    /// Returns `Ok(None)` when the file is absent; the caller decides
    /// whether absence is fatal (`enforcement_required`).
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = swell_common::io::read_to_string(path)
            .map_err(|source| CoreError::io(format!("reading {}", path.display()), source))?;
        Ok(Some(Self::from_contents(&contents)))
    }

    /// The parsed document.
    pub fn document(&self) -> &RuleDocument {
        &self.document
    }

    /// Resolve rule tags to known rule ids; unknown and unenforceable tags
    /// are reported, not errors.
    pub fn resolve_tags(&self, tags: &[String]) -> ResolvedRules {
        let mut resolved = ResolvedRules::default();
        for tag in tags {
            match self.document.rule(tag) {
                Some(rule) if rule.validator.is_some() => {
                    if !resolved.known.contains(tag) {
                        resolved.known.push(tag.clone());
                    }
                }
                Some(_) => resolved.unenforceable.push(tag.clone()),
                None => resolved.unknown.push(tag.clone()),
            }
        }
        resolved
    }

    /// Validate `files` (relative to `root`) against the named rules.
    ///
    /// Files that are absent or binary are skipped. When `rule_ids` is
    /// empty the default-validator pass runs instead and every finding is
    /// demoted to warning severity.
    pub fn validate(
        &mut self,
        root: &Path,
        files: &[String],
        rule_ids: &[String],
    ) -> CoreResult<Vec<Violation>> {
        if rule_ids.is_empty() {
            return self.default_pass(root, files);
        }

        let rules: Vec<Rule> = rule_ids
            .iter()
            .filter_map(|id| self.document.rule(id).cloned())
            .filter(|r| r.validator.is_some())
            .collect();

        let mut violations = Vec::new();
        for file in files {
            let Some(contents) = read_text_file(root, file)? else {
                continue;
            };
            let hash = content_hash(&contents);
            for rule in &rules {
                if let Some(cached) = self.cached(file, &hash, &rule.id) {
                    violations.extend(cached);
                    continue;
                }
                let found = run_rule(rule, file, &contents);
                self.store(file, &hash, &rule.id, found.clone());
                violations.extend(found);
            }
        }
        Ok(violations)
    }

    /// The default pass for untagged tasks: secret heuristics, bare
    /// exception swallowing, overly long functions, with all findings demoted
    /// to warnings regardless of their usual severity.
    fn default_pass(&mut self, root: &Path, files: &[String]) -> CoreResult<Vec<Violation>> {
        let defaults = default_rules();
        let mut violations = Vec::new();
        for file in files {
            let Some(contents) = read_text_file(root, file)? else {
                continue;
            };
            for rule in &defaults {
                for mut v in run_rule(rule, file, &contents) {
                    v.severity = RuleSeverity::Warning;
                    violations.push(v);
                }
            }
        }
        Ok(violations)
    }

    fn cached(&self, file: &str, hash: &str, rule_id: &str) -> Option<Vec<Violation>> {
        let (stored_hash, by_rule) = self.cache.get(file)?;
        if stored_hash != hash {
            return None;
        }
        by_rule.get(rule_id).cloned()
    }

    fn store(&mut self, file: &str, hash: &str, rule_id: &str, violations: Vec<Violation>) {
        let entry = self.cache.entry(file.to_string()).or_insert_with(|| {
            (hash.to_string(), BTreeMap::new())
        });
        if entry.0 != hash {
            // Content moved on; drop stale per-rule results.
            entry.0 = hash.to_string();
            entry.1.clear();
        }
        entry.1.insert(rule_id.to_string(), violations);
    }
}

fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "NO_HARDCODED_SECRETS".to_string(),
            severity: RuleSeverity::Error,
            description: "No credentials in source".to_string(),
            validator: Some(ValidatorSpec::PatternForbidden {
                pattern: r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][^"']{4,}["']"#
                    .to_string(),
            }),
            auto_id: false,
        },
        Rule {
            id: "NO_BARE_EXCEPT".to_string(),
            severity: RuleSeverity::Error,
            description: "No blanket exception handling".to_string(),
            validator: Some(ValidatorSpec::Structural {
                check: StructuralCheck::BareExcept,
            }),
            auto_id: false,
        },
        Rule {
            id: "MAX_FUNCTION_LINES".to_string(),
            severity: RuleSeverity::Error,
            description: "Functions stay short".to_string(),
            validator: Some(ValidatorSpec::Size {
                max_lines: DEFAULT_MAX_FUNCTION_LINES,
            }),
            auto_id: false,
        },
    ]
}

/// Read a file for validation; `None` when it is absent, unreadable as
/// UTF-8, or binary by the magic-byte heuristic.
fn read_text_file(root: &Path, file: &str) -> CoreResult<Option<String>> {
    let path = root.join(file);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)
        .map_err(|source| CoreError::io(format!("reading {}", path.display()), source))?;
    if bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0) {
        tracing::debug!(file, "skipping binary file");
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

fn content_hash(contents: &str) -> String {
    let digest = Sha256::digest(contents.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn run_rule(rule: &Rule, file: &str, contents: &str) -> Vec<Violation> {
    let Some(validator) = &rule.validator else {
        return Vec::new();
    };
    match validator {
        ValidatorSpec::PatternForbidden { pattern } => {
            forbidden_pattern(rule, file, contents, pattern)
        }
        ValidatorSpec::PatternRequired { pattern } => {
            required_pattern(rule, file, contents, pattern)
        }
        ValidatorSpec::Structural { check } => structural(rule, file, contents, *check),
        ValidatorSpec::Size { max_lines } => function_size(rule, file, contents, *max_lines),
    }
}

fn forbidden_pattern(rule: &Rule, file: &str, contents: &str, pattern: &str) -> Vec<Violation> {
    let Ok(re) = Regex::new(pattern) else {
        return vec![Violation {
            rule_id: rule.id.clone(),
            file: file.to_string(),
            line: None,
            message: format!("rule pattern failed to compile: {pattern}"),
            severity: RuleSeverity::Warning,
        }];
    };
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(idx, _)| Violation {
            rule_id: rule.id.clone(),
            file: file.to_string(),
            line: Some(idx as u32 + 1),
            message: format!("forbidden pattern matched: {}", rule.description),
            severity: rule.severity,
        })
        .collect()
}

fn required_pattern(rule: &Rule, file: &str, contents: &str, pattern: &str) -> Vec<Violation> {
    let Ok(re) = Regex::new(pattern) else {
        return vec![Violation {
            rule_id: rule.id.clone(),
            file: file.to_string(),
            line: None,
            message: format!("rule pattern failed to compile: {pattern}"),
            severity: RuleSeverity::Warning,
        }];
    };
    if re.is_match(contents) {
        return Vec::new();
    }
    vec![Violation {
        rule_id: rule.id.clone(),
        file: file.to_string(),
        line: None,
        message: format!("required pattern never matched: {}", rule.description),
        severity: rule.severity,
    }]
}

fn structural(
    rule: &Rule,
    file: &str,
    contents: &str,
    check: StructuralCheck,
) -> Vec<Violation> {
    match check {
        StructuralCheck::BareExcept => bare_except(rule, file, contents),
        StructuralCheck::PublicFnDocs => public_fn_docs(rule, file, contents),
    }
}

fn bare_except(rule: &Rule, file: &str, contents: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    for re in BARE_EXCEPT_RES.iter() {
        for (idx, line) in contents.lines().enumerate() {
            if re.is_match(line) {
                violations.push(Violation {
                    rule_id: rule.id.clone(),
                    file: file.to_string(),
                    line: Some(idx as u32 + 1),
                    message: "bare exception handler swallows everything".to_string(),
                    severity: rule.severity,
                });
            }
        }
    }
    violations.sort_by_key(|v| v.line);
    violations
}

fn public_fn_docs(rule: &Rule, file: &str, contents: &str) -> Vec<Violation> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut violations = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !FN_HEADER_RE.is_match(line) {
            continue;
        }
        // Python private helpers are exempt.
        if line.trim_start().starts_with("def _") {
            continue;
        }
        let documented = if line.trim_start().starts_with("def ") {
            lines
                .get(idx + 1)
                .map(|next| next.trim_start().starts_with("\"\"\"") || next.trim_start().starts_with("'''"))
                .unwrap_or(false)
        } else {
            previous_code_line(&lines, idx)
                .map(|prev| prev.starts_with("///") || prev.starts_with("#["))
                .unwrap_or(false)
        };
        if !documented {
            violations.push(Violation {
                rule_id: rule.id.clone(),
                file: file.to_string(),
                line: Some(idx as u32 + 1),
                message: "public function has no doc comment".to_string(),
                severity: rule.severity,
            });
        }
    }
    violations
}

fn previous_code_line<'a>(lines: &'a [&'a str], idx: usize) -> Option<&'a str> {
    lines[..idx]
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
}

/// Lines-per-function check. Function starts are detected per the file's
/// idiom (`fn` with a brace body, `def` with an indented body) and bodies
/// are measured by brace depth or indentation.
fn function_size(rule: &Rule, file: &str, contents: &str, max_lines: u32) -> Vec<Violation> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut violations = Vec::new();

    let mut idx = 0usize;
    while idx < lines.len() {
        if !FN_START_RE.is_match(lines[idx]) {
            idx += 1;
            continue;
        }
        let body_len = if lines[idx].trim_start().starts_with("def ") {
            python_body_len(&lines, idx)
        } else {
            brace_body_len(&lines, idx)
        };
        if body_len > max_lines as usize {
            violations.push(Violation {
                rule_id: rule.id.clone(),
                file: file.to_string(),
                line: Some(idx as u32 + 1),
                message: format!("function body is {body_len} lines (limit {max_lines})"),
                severity: rule.severity,
            });
        }
        idx += body_len.max(1);
    }
    violations
}

fn python_body_len(lines: &[&str], start: usize) -> usize {
    let base_indent = indent_of(lines[start]);
    let mut len = 0;
    for line in &lines[start + 1..] {
        if line.trim().is_empty() {
            len += 1;
            continue;
        }
        if indent_of(line) <= base_indent {
            break;
        }
        len += 1;
    }
    len
}

fn brace_body_len(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return offset + 1;
        }
    }
    lines.len() - start
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "\
## Code Quality

- MAX_FUNCTION_LINES: Functions stay short (max-lines: 5)
- PUBLIC_FN_DOCS: Public functions carry docs (structural: public-fn-docs)
- STYLE_NOTE: Prefer composition (severity: warning) (forbidden: `inherit_all`)

## Security

- NO_HARDCODED_SECRETS: No credentials in source.
- NO_BARE_EXCEPT: No blanket exception handling.
";

    fn engine() -> RuleEngine {
        RuleEngine::from_contents(RULES)
    }

    fn write(root: &Path, name: &str, contents: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn resolve_splits_known_unknown_and_unenforceable() {
        let engine = engine();
        let resolved = engine.resolve_tags(&[
            "NO_HARDCODED_SECRETS".to_string(),
            "MADE_UP_RULE".to_string(),
        ]);
        assert_eq!(resolved.known, vec!["NO_HARDCODED_SECRETS"]);
        assert_eq!(resolved.unknown, vec!["MADE_UP_RULE"]);
    }

    #[test]
    fn forbidden_pattern_reports_file_and_line() {
        let td = tempfile::tempdir().unwrap();
        write(
            td.path(),
            "src/config.py",
            "host = 'db'\napi_key = \"sk-super-secret\"\n",
        );
        let mut engine = engine();
        let violations = engine
            .validate(
                td.path(),
                &["src/config.py".to_string()],
                &["NO_HARDCODED_SECRETS".to_string()],
            )
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, Some(2));
        assert!(violations[0].blocking());
    }

    #[test]
    fn bare_except_is_flagged() {
        let td = tempfile::tempdir().unwrap();
        write(td.path(), "job.py", "try:\n    go()\nexcept:\n    pass\n");
        let mut engine = engine();
        let violations = engine
            .validate(
                td.path(),
                &["job.py".to_string()],
                &["NO_BARE_EXCEPT".to_string()],
            )
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, Some(3));
    }

    #[test]
    fn long_function_trips_size_rule() {
        let td = tempfile::tempdir().unwrap();
        let body: String = (0..10).map(|i| format!("    step_{i}()\n")).collect();
        write(td.path(), "long.py", &format!("def work():\n{body}"));
        let mut engine = engine();
        let violations = engine
            .validate(
                td.path(),
                &["long.py".to_string()],
                &["MAX_FUNCTION_LINES".to_string()],
            )
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("limit 5"));
    }

    #[test]
    fn undocumented_public_fn_is_flagged_documented_passes() {
        let td = tempfile::tempdir().unwrap();
        write(
            td.path(),
            "lib.rs",
            "/// Documented.\npub fn fine() {}\n\npub fn naked() {}\n",
        );
        let mut engine = engine();
        let violations = engine
            .validate(
                td.path(),
                &["lib.rs".to_string()],
                &["PUBLIC_FN_DOCS".to_string()],
            )
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, Some(4));
    }

    #[test]
    fn warning_severity_rules_do_not_block() {
        let td = tempfile::tempdir().unwrap();
        write(td.path(), "a.py", "inherit_all = True\n");
        let mut engine = engine();
        let violations = engine
            .validate(td.path(), &["a.py".to_string()], &["STYLE_NOTE".to_string()])
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert!(!violations[0].blocking());
    }

    #[test]
    fn default_pass_demotes_everything_to_warning() {
        let td = tempfile::tempdir().unwrap();
        write(td.path(), "a.py", "password = \"hunter22\"\nexcept:\n");
        let mut engine = engine();
        let violations = engine.validate(td.path(), &["a.py".to_string()], &[]).unwrap();
        assert!(violations.len() >= 2);
        assert!(violations.iter().all(|v| !v.blocking()));
    }

    #[test]
    fn binary_and_missing_files_are_skipped() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
        let mut engine = engine();
        let violations = engine
            .validate(
                td.path(),
                &["blob.bin".to_string(), "ghost.py".to_string()],
                &["NO_HARDCODED_SECRETS".to_string()],
            )
            .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn cache_short_circuits_and_agrees_with_fresh_run() {
        let td = tempfile::tempdir().unwrap();
        write(td.path(), "a.py", "token = \"abcdefgh\"\n");
        let mut engine = engine();
        let files = vec!["a.py".to_string()];
        let rules = vec!["NO_HARDCODED_SECRETS".to_string()];
        let first = engine.validate(td.path(), &files, &rules).unwrap();
        let second = engine.validate(td.path(), &files, &rules).unwrap();
        assert_eq!(first, second);

        // Changed content invalidates the cached result.
        write(td.path(), "a.py", "token = load()\n");
        let third = engine.validate(td.path(), &files, &rules).unwrap();
        assert!(third.is_empty());
    }
}
