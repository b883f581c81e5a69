//! Dependency graph construction and greedy wave assignment.
//!
//! Two edge sources feed the DAG:
//!
//! 1. explicit predecessors declared on the task line, and
//! 2. implicit file-write conflicts: when two tasks write the same path,
//!    the earlier one (in ingestion order) must land first. This preserves
//!    the author's intended sequence for same-file work without requiring
//!    them to declare it.
//!
//! Wave assignment is greedy and deterministic: tasks become ready in
//! topological order (ties broken by ingestion order), land in the earliest
//! wave after all predecessors, and are bumped forward while their
//! file-write set collides with a task already placed in that wave. Greedy
//! is intended; globally optimal parallelism is a non-goal.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::errors::{DomainError, DomainResult};
use crate::plan::{CheckpointPolicy, Plan, PlanDocument, PlannedTask, Wave, WaveStrategy};
use crate::tasks::Task;

/// Build a wave plan from ingested tasks.
///
/// `created_at` is supplied by the caller so a single orchestration run is
/// timestamp-stable. Fails with [`DomainError::UnknownPredecessor`] or
/// [`DomainError::CircularDependency`]; an empty task slice yields a plan
/// with zero waves.
pub fn build_plan(
    phase_id: &str,
    created_at: &str,
    tasks: &[Task],
) -> DomainResult<PlanDocument> {
    let index_of: BTreeMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    for task in tasks {
        for pred in &task.predecessors {
            if !index_of.contains_key(pred.as_str()) {
                return Err(DomainError::UnknownPredecessor {
                    task_id: task.id.clone(),
                    predecessor: pred.clone(),
                });
            }
        }
    }

    let edges = collect_edges(tasks, &index_of);

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for &(from, to) in &edges {
        successors[from].push(to);
        predecessors[to].push(from);
    }

    // Kahn's algorithm doubles as cycle detection: whatever it cannot
    // consume sits on a cycle.
    let mut indegree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut wave_of: Vec<u32> = vec![0; tasks.len()];
    // wave number -> file paths claimed / members placed so far
    let mut wave_files: BTreeMap<u32, BTreeSet<&str>> = BTreeMap::new();
    let mut wave_members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    let mut placed = 0usize;

    while let Some(Reverse(current)) = ready.pop() {
        let mut wave = 1 + predecessors[current]
            .iter()
            .map(|&p| wave_of[p])
            .max()
            .unwrap_or(0);
        // Conflict edges already separate same-file tasks, but the bump
        // keeps placement correct even for policies that add none.
        loop {
            let claimed = wave_files.entry(wave).or_default();
            if tasks[current]
                .files
                .iter()
                .any(|f| claimed.contains(f.as_str()))
            {
                wave += 1;
                continue;
            }
            for f in &tasks[current].files {
                claimed.insert(f.as_str());
            }
            break;
        }
        wave_of[current] = wave;
        wave_members.entry(wave).or_default().push(current);
        placed += 1;

        for &next in &successors[current] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if placed < tasks.len() {
        let cycle = trace_cycle(tasks, &predecessors, &indegree);
        return Err(DomainError::CircularDependency { cycle });
    }

    // Waves come out 1..N contiguous: a task in wave k has a predecessor or
    // file conflict in wave k-1, so no wave number is skipped.
    let mut waves: Vec<Wave> = Vec::new();
    for (wave_id, mut members) in wave_members {
        if members.is_empty() {
            continue;
        }
        members.sort_unstable();
        let strategy = if members.len() > 1
            && members.iter().all(|&i| !tasks[i].files.is_empty())
        {
            WaveStrategy::Parallel
        } else {
            WaveStrategy::Sequential
        };
        let label = match strategy {
            WaveStrategy::Parallel => "parallel (disjoint file sets)",
            WaveStrategy::Sequential => "sequential",
        };
        let rationale = format!(
            "Wave {wave_id}: {count} task(s), {label}",
            count = members.len()
        );
        let planned = members
            .iter()
            .map(|&i| {
                let t = &tasks[i];
                PlannedTask {
                    task_id: t.id.clone(),
                    agent_role: t.role.clone(),
                    instruction: t.description.clone(),
                    file_locks: t.files.clone(),
                    constitution_rules: t.rule_tags.clone(),
                    dependencies: t.predecessors.clone(),
                }
            })
            .collect();
        waves.push(Wave {
            wave_id,
            strategy,
            rationale,
            tasks: planned,
            checkpoint_after: CheckpointPolicy::default(),
        });
    }

    let document = PlanDocument {
        execution_plan: Plan {
            phase_id: phase_id.to_string(),
            created_at: created_at.to_string(),
            waves,
        },
    };
    document.validate()?;
    Ok(document)
}

fn collect_edges(tasks: &[Task], index_of: &BTreeMap<&str, usize>) -> BTreeSet<(usize, usize)> {
    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();

    for (to, task) in tasks.iter().enumerate() {
        for pred in &task.predecessors {
            let from = index_of[pred.as_str()];
            if from != to {
                edges.insert((from, to));
            }
        }
    }

    let mut writers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, task) in tasks.iter().enumerate() {
        for file in &task.files {
            writers.entry(file.as_str()).or_default().push(i);
        }
    }
    for list in writers.values() {
        for (a, &from) in list.iter().enumerate() {
            for &to in &list[a + 1..] {
                edges.insert((from, to));
            }
        }
    }

    edges
}

/// Walk backwards through unprocessed nodes until one repeats; the repeated
/// span is a cycle, reported in forward order with the entry node repeated
/// at the end.
fn trace_cycle(tasks: &[Task], predecessors: &[Vec<usize>], indegree: &[usize]) -> Vec<String> {
    let residual: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > 0)
        .map(|(i, _)| i)
        .collect();
    let Some(&start) = residual.iter().next() else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut seen: BTreeSet<usize> = BTreeSet::new();
    seen.insert(start);
    let mut current = start;
    loop {
        let Some(&prev) = predecessors[current]
            .iter()
            .filter(|p| residual.contains(p))
            .min()
        else {
            return Vec::new();
        };
        if seen.contains(&prev) {
            let entry = path.iter().position(|&n| n == prev).unwrap_or(0);
            let mut cycle: Vec<String> = path[entry..]
                .iter()
                .rev()
                .map(|&i| tasks[i].id.clone())
                .collect();
            cycle.rotate_right(1);
            cycle.push(cycle[0].clone());
            return cycle;
        }
        seen.insert(prev);
        path.push(prev);
        current = prev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::parse_task_list;

    fn plan_for(list: &str) -> DomainResult<PlanDocument> {
        let parsed = parse_task_list(list).unwrap();
        build_plan("phase-1", "2026-08-01T00:00:00Z", &parsed.tasks)
    }

    #[test]
    fn empty_task_list_yields_zero_waves() {
        let plan = build_plan("p", "t", &[]).unwrap();
        assert!(plan.execution_plan.waves.is_empty());
    }

    #[test]
    fn single_task_is_one_sequential_wave() {
        let plan = plan_for("- [ ] T001: solo in `a.py`\n").unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].strategy, WaveStrategy::Sequential);
        assert_eq!(waves[0].tasks.len(), 1);
    }

    #[test]
    fn disjoint_files_share_a_parallel_wave_and_conflicts_split() {
        // Spec scenario: T1 and T2 run together, T3 touches T1's file.
        let plan = plan_for(
            "- [ ] T1: build in `a.py`\n- [ ] T2: build in `b.py`\n- [ ] T3: touch `a.py`\n",
        )
        .unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].strategy, WaveStrategy::Parallel);
        let ids: Vec<&str> = waves[0].tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
        assert_eq!(waves[1].strategy, WaveStrategy::Sequential);
        assert_eq!(waves[1].tasks[0].task_id, "T3");
    }

    #[test]
    fn explicit_predecessor_forces_later_wave() {
        let plan = plan_for("- [ ] T1: X\n- [ ] T2: Y after T1\n").unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].tasks[0].task_id, "T1");
        assert_eq!(waves[0].strategy, WaveStrategy::Sequential);
        assert_eq!(waves[1].tasks[0].task_id, "T2");
        assert_eq!(waves[1].strategy, WaveStrategy::Sequential);
    }

    #[test]
    fn two_tasks_sharing_a_file_split_into_two_waves() {
        let plan = plan_for("- [ ] T1: edit `x.rs`\n- [ ] T2: edit `x.rs`\n").unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].tasks[0].task_id, "T1");
        assert_eq!(waves[1].tasks[0].task_id, "T2");
    }

    #[test]
    fn tasks_without_files_never_parallelize() {
        let plan = plan_for("- [ ] T1: think\n- [ ] T2: ponder\n").unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].strategy, WaveStrategy::Sequential);
        assert_eq!(waves[0].tasks.len(), 2);
    }

    #[test]
    fn cycle_is_fatal_and_names_both_tasks() {
        let err = plan_for("- [ ] T1: X after T2\n- [ ] T2: Y after T1\n").unwrap_err();
        match err {
            DomainError::CircularDependency { cycle } => {
                assert!(cycle.contains(&"T1".to_string()));
                assert!(cycle.contains(&"T2".to_string()));
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_predecessor_is_fatal_in_the_planner() {
        let err = plan_for("- [ ] T1: X after T9\n").unwrap_err();
        assert!(matches!(err, DomainError::UnknownPredecessor { .. }));
    }

    #[test]
    fn forward_reference_predecessor_is_honored() {
        // T1 declared first but depends on T2 declared later.
        let plan = plan_for("- [ ] T1: X after T2\n- [ ] T2: Y\n").unwrap();
        let waves = &plan.execution_plan.waves;
        assert_eq!(waves[0].tasks[0].task_id, "T2");
        assert_eq!(waves[1].tasks[0].task_id, "T1");
    }

    #[test]
    fn orchestration_is_deterministic() {
        let src = "\
- [ ] T1: core in `a.rs`
- [ ] T2: api in `b.rs` after T1
- [ ] T3: docs in `docs/readme.md`
- [ ] T4: rework `a.rs`
";
        let a = plan_for(src).unwrap().to_canonical_json();
        let b = plan_for(src).unwrap().to_canonical_json();
        assert_eq!(a, b);
    }

    #[test]
    fn chains_stay_linear_at_modest_scale() {
        let mut src = String::new();
        for i in 1..=120 {
            src.push_str(&format!("- [ ] T{i:03}: step in `file_{i}.rs`\n"));
        }
        let plan = plan_for(&src).unwrap();
        assert_eq!(plan.execution_plan.waves.len(), 1);
        assert_eq!(plan.execution_plan.waves[0].tasks.len(), 120);
    }
}
