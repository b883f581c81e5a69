//! Context-budget monitoring.
//!
//! Interactive AI workers lose quality as their context fills. Between
//! waves the executor asks the monitor whether the session should request
//! pre-compaction: the monitor estimates token pressure from the byte sizes
//! of the configured sidecar files (plus an overhead per active persona)
//! and maps the estimate onto coarse zones. The monitor never writes the
//! sidecar files; it only reads sizes and, when asked, invokes the external
//! hook.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use swell_common::fs::FileSystem;
use swell_config::ContextConfig;

use crate::process::{ProcessOutput, ProcessRequest, ProcessRunner};

/// Estimated bytes per token.
const BYTES_PER_TOKEN: u64 = 4;

/// Pressure zones, in increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextZone {
    /// Under 30% of the window.
    Optimal,
    /// 30–40%.
    Warning,
    /// 40–50%.
    Critical,
    /// 50% or more.
    Severe,
}

impl ContextZone {
    /// Stable display label.
    pub fn as_str(self) -> &'static str {
        match self {
            ContextZone::Optimal => "optimal",
            ContextZone::Warning => "warning",
            ContextZone::Critical => "critical",
            ContextZone::Severe => "severe",
        }
    }
}

/// One pressure assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBudget {
    /// Estimated tokens consumed.
    pub estimated_tokens: u64,
    /// Window size the estimate is measured against.
    pub window_tokens: u64,
    /// Active personas counted from the state file.
    pub active_personas: usize,
    /// Zone the estimate lands in.
    pub zone: ContextZone,
}

impl ContextBudget {
    /// Whether the executor should request pre-compaction between waves.
    pub fn should_compact(&self, persona_trigger: usize) -> bool {
        self.zone >= ContextZone::Warning || self.active_personas >= persona_trigger
    }
}

/// The monitor itself. Holds no state; every call re-reads the sidecars.
pub struct ContextMonitor<'a> {
    fs: &'a dyn FileSystem,
    config: &'a ContextConfig,
    sidecars: Vec<PathBuf>,
    persona_state: Option<PathBuf>,
}

impl<'a> ContextMonitor<'a> {
    /// Build a monitor over the given sidecar files.
    pub fn new(
        fs: &'a dyn FileSystem,
        config: &'a ContextConfig,
        sidecars: Vec<PathBuf>,
        persona_state: Option<PathBuf>,
    ) -> Self {
        Self {
            fs,
            config,
            sidecars,
            persona_state,
        }
    }

    /// Assess current pressure.
    pub fn assess(&self) -> ContextBudget {
        let total_bytes: u64 = self
            .sidecars
            .iter()
            .filter_map(|p| self.fs.file_size(p))
            .sum();
        let active_personas = self.count_personas();
        let estimated_tokens = total_bytes / BYTES_PER_TOKEN
            + active_personas as u64 * self.config.persona_overhead_tokens;

        let window = self.config.window_tokens.max(1);
        let percent = estimated_tokens * 100 / window;
        let zone = if percent >= 50 {
            ContextZone::Severe
        } else if percent >= 40 {
            ContextZone::Critical
        } else if percent >= 30 {
            ContextZone::Warning
        } else {
            ContextZone::Optimal
        };

        ContextBudget {
            estimated_tokens,
            window_tokens: window,
            active_personas,
            zone,
        }
    }

    /// Count distinct active personas from the JSON state file, when one is
    /// configured. Accepts either an `agents`/`personas` array or a
    /// top-level object keyed by persona name.
    fn count_personas(&self) -> usize {
        let Some(path) = &self.persona_state else {
            return 0;
        };
        let Ok(raw) = self.fs.read_to_string(path) else {
            return 0;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            return 0;
        };
        for key in ["agents", "personas"] {
            match value.get(key) {
                Some(serde_json::Value::Array(items)) => return items.len(),
                Some(serde_json::Value::Object(map)) => return map.len(),
                _ => {}
            }
        }
        match value {
            serde_json::Value::Object(map) => map.len(),
            serde_json::Value::Array(items) => items.len(),
            _ => 0,
        }
    }
}

/// Payload handed to the pre-compaction hook on stdin.
#[derive(Debug, Serialize)]
pub struct HookPayload<'a> {
    /// Wave the executor just finished.
    pub wave: u32,
    /// Active persona count at assessment time.
    pub active_personas: usize,
    /// Why the hook fired (zone label or persona trigger).
    pub reason: &'a str,
}

/// Invoke the pre-compaction hook. Best-effort: a non-zero exit is
/// reported in the returned output, never as an error; the caller logs it
/// and execution continues.
pub fn invoke_hook(
    runner: &dyn ProcessRunner,
    hook: &Path,
    payload: &HookPayload<'_>,
) -> Option<ProcessOutput> {
    let body = serde_json::to_string(payload).ok()?;
    let request = ProcessRequest::new(hook.to_string_lossy()).stdin(body);
    match runner.run_with_timeout(&request, Duration::from_secs(120)) {
        Ok(output) => {
            if !output.success {
                tracing::warn!(
                    hook = %hook.display(),
                    exit = output.exit_code,
                    "pre-compaction hook failed; continuing"
                );
            }
            Some(output)
        }
        Err(err) => {
            tracing::warn!(hook = %hook.display(), error = %err, "pre-compaction hook did not run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;

    #[derive(Default)]
    struct FakeFs {
        sizes: BTreeMap<PathBuf, u64>,
        contents: BTreeMap<PathBuf, String>,
    }

    impl FileSystem for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.sizes.contains_key(path) || self.contents.contains_key(path)
        }
        fn file_size(&self, path: &Path) -> Option<u64> {
            self.sizes.get(path).copied()
        }
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.contents
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
        fn read_dir(&self, _path: &Path) -> io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        fn remove_file(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }
    }

    fn config() -> ContextConfig {
        ContextConfig {
            window_tokens: 1_000,
            persona_overhead_tokens: 50,
            persona_trigger: 5,
        }
    }

    #[test]
    fn small_sidecars_are_optimal() {
        let mut fs = FakeFs::default();
        fs.sizes.insert(PathBuf::from("activity.md"), 400);
        let cfg = config();
        let monitor = ContextMonitor::new(&fs, &cfg, vec![PathBuf::from("activity.md")], None);
        let budget = monitor.assess();
        assert_eq!(budget.estimated_tokens, 100);
        assert_eq!(budget.zone, ContextZone::Optimal);
        assert!(!budget.should_compact(cfg.persona_trigger));
    }

    #[test]
    fn zone_thresholds_map_correctly() {
        let cases = [
            (1_100u64, ContextZone::Optimal),  // 275 tokens, 27%
            (1_300, ContextZone::Warning),     // 325 tokens, 32%
            (1_700, ContextZone::Critical),    // 425 tokens, 42%
            (2_400, ContextZone::Severe),      // 600 tokens, 60%
        ];
        for (bytes, expected) in cases {
            let mut fs = FakeFs::default();
            fs.sizes.insert(PathBuf::from("log.md"), bytes);
            let cfg = config();
            let monitor = ContextMonitor::new(&fs, &cfg, vec![PathBuf::from("log.md")], None);
            assert_eq!(monitor.assess().zone, expected, "bytes={bytes}");
        }
    }

    #[test]
    fn persona_count_triggers_compaction_regardless_of_zone() {
        let mut fs = FakeFs::default();
        fs.contents.insert(
            PathBuf::from("state.json"),
            r#"{"agents": ["a", "b", "c", "d", "e"]}"#.to_string(),
        );
        let cfg = config();
        let monitor =
            ContextMonitor::new(&fs, &cfg, Vec::new(), Some(PathBuf::from("state.json")));
        let budget = monitor.assess();
        assert_eq!(budget.active_personas, 5);
        assert!(budget.should_compact(cfg.persona_trigger));
    }

    #[test]
    fn unreadable_persona_state_counts_zero() {
        let fs = FakeFs::default();
        let cfg = config();
        let monitor =
            ContextMonitor::new(&fs, &cfg, Vec::new(), Some(PathBuf::from("missing.json")));
        assert_eq!(monitor.assess().active_personas, 0);
    }

    #[test]
    fn hook_failure_is_not_an_error() {
        use crate::process::test_support::StubRunner;
        let runner = StubRunner::with_outputs(vec![StubRunner::err("hook exploded")]);
        let payload = HookPayload {
            wave: 2,
            active_personas: 1,
            reason: "warning",
        };
        let output = invoke_hook(&runner, Path::new("/hooks/precompact.sh"), &payload).unwrap();
        assert!(!output.success);
        let sent = runner.requests.borrow();
        assert!(sent[0].stdin.as_ref().unwrap().contains("\"wave\":2"));
    }
}
