//! `swell constitution …`

use swell_domain::rules::RuleDocument;

use crate::cli_error::{CliError, CliResult};
use crate::runtime::Runtime;

pub(crate) fn validate(rt: &Runtime, threshold: u8, json: bool) -> CliResult<()> {
    let doc = load_document(rt)?;
    let report = doc.quality();
    let rules = doc.rules().count();
    let enforceable = doc.rules().filter(|r| r.validator.is_some()).count();

    if json {
        let payload = serde_json::json!({
            "score": report.score,
            "threshold": threshold,
            "sections": doc.sections.len(),
            "rules": rules,
            "enforceable_rules": enforceable,
            "recommendations": report.recommendations,
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
    } else {
        println!("Quality score: {}/100 (threshold {threshold})", report.score);
        println!(
            "{} section(s), {} rule(s), {} enforceable",
            doc.sections.len(),
            rules,
            enforceable
        );
        if !report.recommendations.is_empty() {
            println!("\nRecommendations:");
            for recommendation in &report.recommendations {
                println!("  - {recommendation}");
            }
        }
    }

    if report.score < threshold {
        return Err(CliError::msg(format!(
            "rule document quality {} is below the threshold {threshold}",
            report.score
        ))
        .with_code(2)
        .with_remediation("Apply the recommendations above, then re-run `swell constitution validate`."));
    }
    Ok(())
}

pub(crate) fn show(rt: &Runtime) -> CliResult<()> {
    let path = rt.config().rule_doc_path(rt.root());
    let contents = swell_common::io::read_to_string(&path).map_err(|_| {
        CliError::msg(format!("rule document not found at {}", path.display()))
            .with_remediation("Create it or point paths.rule_doc somewhere else in .swell/config.json.")
    })?;
    print!("{contents}");
    Ok(())
}

fn load_document(rt: &Runtime) -> CliResult<RuleDocument> {
    let path = rt.config().rule_doc_path(rt.root());
    let contents = swell_common::io::read_to_string(&path).map_err(|_| {
        CliError::msg(format!("rule document not found at {}", path.display()))
            .with_remediation("Create it or point paths.rule_doc somewhere else in .swell/config.json.")
    })?;
    Ok(RuleDocument::parse(&contents))
}
