//! Liveness probes for native processes.
//!
//! The probe answers one question per PID: is it alive, and if so, what is
//! its kernel start time and resource footprint right now. "Gone" and
//! "could not look up" are distinct outcomes; the sweep treats the former
//! as an orphan and the latter as transient.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::registry::ResourceSnapshot;

/// A transient probe failure; the record moves to `unknown`, not `failed`.
#[derive(Debug, thiserror::Error)]
#[error("process lookup failed: {0}")]
pub struct ProbeError(pub String);

/// A live process as seen by the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedProcess {
    /// Kernel start time, canonical string form.
    pub start_time: String,
    /// Best-effort resource snapshot.
    pub resources: Option<ResourceSnapshot>,
}

/// Native-process liveness lookup.
pub trait ProcessProbe {
    /// Probe `pid`. `Ok(None)` means the process is gone; `Err` means the
    /// lookup itself failed and nothing should be concluded.
    fn probe(&mut self, pid: u32) -> Result<Option<ProbedProcess>, ProbeError>;
}

/// Probe backed by `sysinfo`.
#[derive(Default)]
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    /// Create a probe with an empty process table; each call refreshes the
    /// PID it is asked about.
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl ProcessProbe for SystemProbe {
    fn probe(&mut self, pid: u32) -> Result<Option<ProbedProcess>, ProbeError> {
        let target = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::everything(),
        );
        let Some(process) = self.system.process(target) else {
            return Ok(None);
        };
        Ok(Some(ProbedProcess {
            start_time: process.start_time().to_string(),
            resources: Some(ResourceSnapshot {
                cpu_percent: process.cpu_usage(),
                memory_bytes: process.memory(),
            }),
        }))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted probe shared by sweep tests.

    use super::*;
    use std::collections::BTreeMap;

    /// Per-PID scripted probe outcomes.
    pub enum ProbeScript {
        /// Process is alive with this start time.
        Alive(&'static str),
        /// Process is gone.
        Gone,
        /// Lookup errors transiently.
        Transient,
    }

    /// A `ProcessProbe` that replays a fixed table.
    pub struct FakeProbe {
        pub table: BTreeMap<u32, ProbeScript>,
    }

    impl ProcessProbe for FakeProbe {
        fn probe(&mut self, pid: u32) -> Result<Option<ProbedProcess>, ProbeError> {
            match self.table.get(&pid) {
                Some(ProbeScript::Alive(start_time)) => Ok(Some(ProbedProcess {
                    start_time: start_time.to_string(),
                    resources: Some(ResourceSnapshot {
                        cpu_percent: 1.5,
                        memory_bytes: 10 * 1024 * 1024,
                    }),
                })),
                Some(ProbeScript::Gone) | None => Ok(None),
                Some(ProbeScript::Transient) => {
                    Err(ProbeError("temporary lookup failure".to_string()))
                }
            }
        }
    }
}
