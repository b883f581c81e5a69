//! Rule-document model, parser, and quality scoring.
//!
//! The rule document ("constitution") is sectioned Markdown: `## Heading`
//! blocks holding prose and `-` bulleted rules. A bullet of the form
//! `- RULE_ID: sentence` declares an identified rule; a plain bullet is a
//! prose rule that gets a stable auto-id derived from its text and
//! participates only in quality scoring.
//!
//! Identified rules resolve to exactly one validator kind, either from an
//! inline directive in the rule text or from the built-in table for
//! well-known ids:
//!
//! ```text
//! - NO_HARDCODED_SECRETS: No credentials in source.
//! - MAX_FUNCTION_LINES: Keep functions short (max-lines: 40)
//! - NO_TODO_MARKERS: Ship clean (forbidden: `TODO|FIXME`) (severity: warning)
//! - HAS_LICENSE_HEADER: Every file starts with the header (required: `^// SPDX`)
//! - PUBLIC_FN_DOCS: Public functions carry docs (structural: public-fn-docs)
//! ```

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+?)\s*$").unwrap());

static RULE_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s+(.+?)\s*$").unwrap());

static IDENTIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9_]{2,}):\s*(.+)$").unwrap());

static FORBIDDEN_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(forbidden:\s*`([^`]+)`\)").unwrap());

static REQUIRED_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(required:\s*`([^`]+)`\)").unwrap());

static MAX_LINES_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(max-lines:\s*(\d+)\)").unwrap());

static STRUCTURAL_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(structural:\s*([a-z-]+)\)").unwrap());

static SEVERITY_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(severity:\s*(error|warning)\)").unwrap());

/// Sections a complete rule document is expected to carry; used only by
/// quality scoring, never by validation.
pub const EXPECTED_SECTIONS: &[&str] = &["Code Quality", "Security", "Testing"];

/// Default lines-per-function ceiling for the size validator.
pub const DEFAULT_MAX_FUNCTION_LINES: u32 = 50;

/// Violation severity. Only `Error` blocks a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSeverity {
    /// Blocks checkpoints.
    Error,
    /// Reported for context, never blocking.
    Warning,
}

impl RuleSeverity {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleSeverity::Error => "error",
            RuleSeverity::Warning => "warning",
        }
    }
}

/// The small closed set of token-stream checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralCheck {
    /// Every public function is preceded by a doc comment.
    PublicFnDocs,
    /// No blanket exception swallowing (`except:`, `catch (...)`,
    /// `.unwrap()` in the file's idiom).
    BareExcept,
}

impl StructuralCheck {
    /// Parse a directive label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "public-fn-docs" => Some(StructuralCheck::PublicFnDocs),
            "no-bare-except" => Some(StructuralCheck::BareExcept),
            _ => None,
        }
    }
}

/// The validator a rule declares. Each executable rule has exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorSpec {
    /// The regex must not match anywhere in the file.
    PatternForbidden {
        /// Pattern source text.
        pattern: String,
    },
    /// The regex must match at least once in the file.
    PatternRequired {
        /// Pattern source text.
        pattern: String,
    },
    /// A pluggable token-stream check.
    Structural {
        /// Which check to run.
        check: StructuralCheck,
    },
    /// Lines-per-function ceiling.
    Size {
        /// Maximum permitted lines per function body.
        max_lines: u32,
    },
}

/// One rule loaded from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Uppercase snake-case identifier (auto-derived for prose rules).
    pub id: String,
    /// Violation severity.
    pub severity: RuleSeverity,
    /// Human description (directives stripped).
    pub description: String,
    /// Declared validator; `None` for prose rules, which only feed quality
    /// scoring.
    pub validator: Option<ValidatorSpec>,
    /// True when the id was derived from the rule text.
    pub auto_id: bool,
}

/// A `## Heading` block and its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSection {
    /// Heading text.
    pub title: String,
    /// Rules in source order. A section with zero rules is not an error.
    pub rules: Vec<Rule>,
}

/// The parsed rule document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDocument {
    /// Sections in source order.
    pub sections: Vec<RuleSection>,
}

/// Quality assessment of the rule document itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    /// 0–100 score.
    pub score: u8,
    /// Surfaced, non-blocking recommendations.
    pub recommendations: Vec<String>,
}

impl RuleDocument {
    /// Parse the rule document. Parsing never fails: unrecognized content
    /// is prose, and a document with no sections is simply empty.
    pub fn parse(contents: &str) -> Self {
        let mut sections: Vec<RuleSection> = Vec::new();
        let mut current: Option<RuleSection> = None;

        for line in contents.lines() {
            if let Some(cap) = SECTION_RE.captures(line) {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(RuleSection {
                    title: cap[1].to_string(),
                    rules: Vec::new(),
                });
                continue;
            }
            let Some(section) = current.as_mut() else {
                continue;
            };
            let Some(cap) = RULE_BULLET_RE.captures(line) else {
                continue;
            };
            section.rules.push(parse_rule(&cap[1]));
        }
        if let Some(section) = current.take() {
            sections.push(section);
        }

        RuleDocument { sections }
    }

    /// Iterate every rule across all sections.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.sections.iter().flat_map(|s| s.rules.iter())
    }

    /// Look up a rule by id.
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules().find(|r| r.id == id)
    }

    /// Ids of all identified (non-auto) rules.
    pub fn known_ids(&self) -> Vec<&str> {
        self.rules()
            .filter(|r| !r.auto_id)
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Score the rule document for completeness and actionability.
    pub fn quality(&self) -> QualityReport {
        let mut recommendations = Vec::new();

        let present = EXPECTED_SECTIONS
            .iter()
            .filter(|expected| {
                self.sections
                    .iter()
                    .any(|s| s.title.eq_ignore_ascii_case(expected))
            })
            .count();
        for expected in EXPECTED_SECTIONS {
            if !self
                .sections
                .iter()
                .any(|s| s.title.eq_ignore_ascii_case(expected))
            {
                recommendations.push(format!("Add a `## {expected}` section."));
            }
        }
        let section_score = if EXPECTED_SECTIONS.is_empty() {
            40.0
        } else {
            40.0 * present as f64 / EXPECTED_SECTIONS.len() as f64
        };

        let dense = self.sections.iter().filter(|s| s.rules.len() >= 2).count();
        for section in &self.sections {
            if section.rules.is_empty() {
                recommendations.push(format!(
                    "Section '{}' has no rules; add bullets or remove it.",
                    section.title
                ));
            }
        }
        let density_score = if self.sections.is_empty() {
            0.0
        } else {
            30.0 * dense as f64 / self.sections.len() as f64
        };

        let total_rules = self.rules().count();
        let actionable = self.rules().filter(|r| r.validator.is_some()).count();
        if total_rules > 0 && actionable * 2 < total_rules {
            recommendations.push(
                "Most rules are prose-only; give them ids and validator directives so they can be enforced."
                    .to_string(),
            );
        }
        let actionability_score = if total_rules == 0 {
            0.0
        } else {
            30.0 * actionable as f64 / total_rules as f64
        };

        let score = (section_score + density_score + actionability_score).round() as u8;
        QualityReport {
            score: score.min(100),
            recommendations,
        }
    }
}

fn parse_rule(text: &str) -> Rule {
    if let Some(cap) = IDENTIFIED_RE.captures(text) {
        let id = cap[1].to_string();
        let body = cap[2].to_string();
        let severity = severity_directive(&body).unwrap_or(RuleSeverity::Error);
        let validator = directive_validator(&body).or_else(|| builtin_validator(&id));
        Rule {
            id,
            severity,
            description: strip_directives(&body),
            validator,
            auto_id: false,
        }
    } else {
        Rule {
            id: auto_id(text),
            severity: RuleSeverity::Warning,
            description: text.to_string(),
            validator: None,
            auto_id: true,
        }
    }
}

fn severity_directive(text: &str) -> Option<RuleSeverity> {
    let cap = SEVERITY_DIRECTIVE_RE.captures(text)?;
    match &cap[1] {
        "warning" => Some(RuleSeverity::Warning),
        _ => Some(RuleSeverity::Error),
    }
}

fn directive_validator(text: &str) -> Option<ValidatorSpec> {
    if let Some(cap) = FORBIDDEN_DIRECTIVE_RE.captures(text) {
        return Some(ValidatorSpec::PatternForbidden {
            pattern: cap[1].to_string(),
        });
    }
    if let Some(cap) = REQUIRED_DIRECTIVE_RE.captures(text) {
        return Some(ValidatorSpec::PatternRequired {
            pattern: cap[1].to_string(),
        });
    }
    if let Some(cap) = MAX_LINES_DIRECTIVE_RE.captures(text) {
        let max_lines = cap[1].parse().unwrap_or(DEFAULT_MAX_FUNCTION_LINES);
        return Some(ValidatorSpec::Size { max_lines });
    }
    if let Some(cap) = STRUCTURAL_DIRECTIVE_RE.captures(text) {
        let check = StructuralCheck::from_label(&cap[1])?;
        return Some(ValidatorSpec::Structural { check });
    }
    None
}

/// Validators for well-known rule ids that need no inline directive.
fn builtin_validator(id: &str) -> Option<ValidatorSpec> {
    match id {
        "NO_HARDCODED_SECRETS" => Some(ValidatorSpec::PatternForbidden {
            pattern: r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][^"']{4,}["']"#
                .to_string(),
        }),
        "NO_BARE_EXCEPT" => Some(ValidatorSpec::Structural {
            check: StructuralCheck::BareExcept,
        }),
        "MAX_FUNCTION_LINES" => Some(ValidatorSpec::Size {
            max_lines: DEFAULT_MAX_FUNCTION_LINES,
        }),
        "PUBLIC_FN_DOCS" => Some(ValidatorSpec::Structural {
            check: StructuralCheck::PublicFnDocs,
        }),
        _ => None,
    }
}

fn strip_directives(text: &str) -> String {
    let mut out = text.to_string();
    for re in [
        &*FORBIDDEN_DIRECTIVE_RE,
        &*REQUIRED_DIRECTIVE_RE,
        &*MAX_LINES_DIRECTIVE_RE,
        &*STRUCTURAL_DIRECTIVE_RE,
        &*SEVERITY_DIRECTIVE_RE,
    ] {
        out = re.replace_all(&out, "").to_string();
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable auto-id for a prose rule: `RULE_` plus the first eight hex digits
/// of the SHA-256 of its normalized text.
fn auto_id(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.to_lowercase().as_bytes());
    let hex: String = digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("RULE_{}", hex.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# Constitution

## Code Quality
Keep it small.

- MAX_FUNCTION_LINES: Functions stay short (max-lines: 40)
- PUBLIC_FN_DOCS: Public functions carry docs (structural: public-fn-docs)
- Prefer clarity over cleverness

## Security

- NO_HARDCODED_SECRETS: No credentials in source.
- NO_TODO_MARKERS: Ship clean (forbidden: `TODO|FIXME`) (severity: warning)

## Testing

- HAS_SMOKE_TEST: Every module has a smoke test (required: `#\\[test\\]`)
- NO_BARE_EXCEPT: No blanket exception handling.
";

    #[test]
    fn parses_sections_and_rules() {
        let doc = RuleDocument::parse(DOC);
        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[0].title, "Code Quality");
        assert_eq!(doc.sections[0].rules.len(), 3);
        assert_eq!(doc.rules().count(), 7);
    }

    #[test]
    fn directive_validators_are_extracted() {
        let doc = RuleDocument::parse(DOC);
        let rule = doc.rule("MAX_FUNCTION_LINES").unwrap();
        assert_eq!(
            rule.validator,
            Some(ValidatorSpec::Size { max_lines: 40 })
        );
        assert_eq!(rule.description, "Functions stay short");

        let todo = doc.rule("NO_TODO_MARKERS").unwrap();
        assert_eq!(todo.severity, RuleSeverity::Warning);
        assert_eq!(
            todo.validator,
            Some(ValidatorSpec::PatternForbidden {
                pattern: "TODO|FIXME".to_string()
            })
        );

        let smoke = doc.rule("HAS_SMOKE_TEST").unwrap();
        assert!(matches!(
            smoke.validator,
            Some(ValidatorSpec::PatternRequired { .. })
        ));
    }

    #[test]
    fn builtin_validators_back_known_ids() {
        let doc = RuleDocument::parse(DOC);
        let secrets = doc.rule("NO_HARDCODED_SECRETS").unwrap();
        assert!(matches!(
            secrets.validator,
            Some(ValidatorSpec::PatternForbidden { .. })
        ));
        assert_eq!(secrets.severity, RuleSeverity::Error);

        let except = doc.rule("NO_BARE_EXCEPT").unwrap();
        assert_eq!(
            except.validator,
            Some(ValidatorSpec::Structural {
                check: StructuralCheck::BareExcept
            })
        );
    }

    #[test]
    fn prose_rules_get_stable_auto_ids() {
        let doc = RuleDocument::parse(DOC);
        let prose: Vec<&Rule> = doc.rules().filter(|r| r.auto_id).collect();
        assert_eq!(prose.len(), 1);
        assert!(prose[0].id.starts_with("RULE_"));
        assert_eq!(prose[0].severity, RuleSeverity::Warning);
        assert!(prose[0].validator.is_none());

        let again = RuleDocument::parse(DOC);
        let prose_again: Vec<&Rule> = again.rules().filter(|r| r.auto_id).collect();
        assert_eq!(prose[0].id, prose_again[0].id);
    }

    #[test]
    fn empty_sections_are_not_an_error() {
        let doc = RuleDocument::parse("## Style\n\nJust prose here.\n");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].rules.is_empty());
    }

    #[test]
    fn quality_rewards_complete_documents() {
        let full = RuleDocument::parse(DOC).quality();
        assert!(full.score >= 80, "score was {}", full.score);

        let sparse = RuleDocument::parse("## Misc\n\n- do good work\n").quality();
        assert!(sparse.score < 50, "score was {}", sparse.score);
        assert!(
            sparse
                .recommendations
                .iter()
                .any(|r| r.contains("Security"))
        );
    }

    #[test]
    fn empty_document_scores_zero_sections() {
        let report = RuleDocument::parse("no headings at all\n").quality();
        assert!(report.score <= 40);
        assert_eq!(RuleDocument::parse("").sections.len(), 0);
    }
}
