//! Suite execution.
//!
//! Leaves are collected depth-first and executed either in order on the
//! calling thread or on a work-stealing pool of scoped threads. Leaves have
//! no ordering dependency on each other; the engine's single-flight gate
//! keeps identical leaves from running twice. Per-leaf errors are recorded
//! on the leaf and never stop the traversal. [`SuiteRunner::run_with`]
//! hands each completed result to a callback on the worker that produced
//! it, so uploads can start before the suite finishes.

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use std::sync::Mutex;
use std::time::Instant;

use super::node::{NodeOutcome, TestSuite};
use super::template::SuiteTemplate;
use crate::config::ExecutionConfig;
use crate::engine::ExecutionEngine;
use crate::error::DocResult;
use crate::inputs::{Inputs, Params};
use crate::result::TestResult;

/// Counts from one suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuiteRunSummary {
    /// Executable leaves.
    pub total: usize,
    /// Leaves that completed.
    pub completed: usize,
    /// Leaves that were skipped.
    pub skipped: usize,
    /// Leaves that failed.
    pub failed: usize,
    /// Aggregate verdict; `None` without threshold outcomes.
    pub passed: Option<bool>,
}

/// Runs suites against one execution engine.
#[derive(Debug)]
pub struct SuiteRunner<'e> {
    engine: &'e ExecutionEngine,
    workers: usize,
}

struct Job {
    index: usize,
    section_id: String,
    position: usize,
    test_id: String,
    inputs: DocResult<Inputs>,
    params: Params,
}

impl<'e> SuiteRunner<'e> {
    /// Sequential runner.
    #[must_use]
    pub const fn new(engine: &'e ExecutionEngine) -> Self {
        Self { engine, workers: 1 }
    }

    /// Runner with the configured worker count.
    #[must_use]
    pub fn from_config(engine: &'e ExecutionEngine, config: &ExecutionConfig) -> Self {
        Self::new(engine).with_workers(config.workers)
    }

    /// Run leaves on `workers` threads; values below 2 run sequentially.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Configured worker count.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Build `template` and run it.
    #[must_use]
    pub fn run_template(&self, template: &SuiteTemplate, pool: &Inputs) -> (TestSuite, SuiteRunSummary) {
        let mut suite = TestSuite::build(template, self.engine.registry());
        let summary = self.run(&mut suite, pool);
        (suite, summary)
    }

    /// Execute every leaf of `suite` against the host `pool` of inputs,
    /// attach outcomes and recompute aggregate verdicts.
    pub fn run(&self, suite: &mut TestSuite, pool: &Inputs) -> SuiteRunSummary {
        self.run_with(suite, pool, |_, _, _| {})
    }

    /// Like [`Self::run`], calling `on_result` with the section id, position
    /// and result of every leaf as soon as it completes.
    ///
    /// The callback runs on the worker thread and must not block for long.
    /// Skipped and failed leaves do not reach it.
    pub fn run_with<F>(
        &self,
        suite: &mut TestSuite,
        pool: &Inputs,
        on_result: F,
    ) -> SuiteRunSummary
    where
        F: Fn(&str, usize, &TestResult) + Sync,
    {
        let start = Instant::now();
        let jobs: Vec<Job> = suite
            .leaves()
            .into_iter()
            .enumerate()
            .map(|(index, (section_id, leaf))| Job {
                index,
                section_id: section_id.to_string(),
                position: leaf.position,
                test_id: leaf.test_id.clone(),
                inputs: leaf.bound_inputs(pool),
                params: leaf.params.clone(),
            })
            .collect();
        let total = jobs.len();
        tracing::info!(suite = %suite.id, tests = total, workers = self.workers, "running suite");

        let run_job = |job: &Job| {
            let outcome = match &job.inputs {
                Ok(inputs) => NodeOutcome::from_execution(self.engine.execute(
                    &job.test_id,
                    inputs,
                    &job.params,
                )),
                Err(e) => NodeOutcome::failed(e),
            };
            if let NodeOutcome::Completed(result) = &outcome {
                on_result(&job.section_id, job.position, result);
            }
            outcome
        };
        let outcomes = if self.workers > 1 && total > 1 {
            steal_map(self.workers.min(total), jobs, run_job)
        } else {
            jobs.iter().map(run_job).collect()
        };

        let mut summary = SuiteRunSummary {
            total,
            ..SuiteRunSummary::default()
        };
        for (leaf, outcome) in suite.leaves_mut().into_iter().zip(outcomes) {
            match &outcome {
                NodeOutcome::Completed(_) => summary.completed += 1,
                NodeOutcome::Skipped { .. } => summary.skipped += 1,
                NodeOutcome::Failed { message, .. } => {
                    summary.failed += 1;
                    tracing::warn!(test_id = %leaf.test_id, error = %message, "suite leaf failed");
                }
                NodeOutcome::Pending => {}
            }
            leaf.outcome = outcome;
        }
        summary.passed = suite.aggregate();

        tracing::info!(
            suite = %suite.id,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            passed = ?summary.passed,
            elapsed_ms = start.elapsed().as_millis(),
            "suite finished"
        );
        summary
    }
}

/// Map `f` over `jobs` on a work-stealing pool, returning outcomes in job
/// order.
fn steal_map<F>(workers: usize, jobs: Vec<Job>, f: F) -> Vec<NodeOutcome>
where
    F: Fn(&Job) -> NodeOutcome + Sync,
{
    let n = jobs.len();
    let injector: Injector<Job> = Injector::new();
    let locals: Vec<Worker<Job>> = (0..workers).map(|_| Worker::new_fifo()).collect();
    let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();
    for job in jobs {
        injector.push(job);
    }

    let results: Mutex<Vec<(usize, NodeOutcome)>> = Mutex::new(Vec::with_capacity(n));
    std::thread::scope(|s| {
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = &injector;
            let stealers = &stealers;
            let results = &results;
            let f = &f;
            s.spawn(move || {
                while let Some(job) = find_job(worker_id, &local, injector, stealers) {
                    let outcome = f(&job);
                    if let Ok(mut guard) = results.lock() {
                        guard.push((job.index, outcome));
                    }
                }
            });
        }
    });

    let mut results = results
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);
    let mut outcomes: Vec<NodeOutcome> = results.into_iter().map(|(_, o)| o).collect();
    // A worker that could not record its outcome leaves the leaf pending.
    outcomes.resize_with(n, NodeOutcome::default);
    outcomes
}

fn find_job(
    worker_id: usize,
    local: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
) -> Option<Job> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(job) => return Some(job),
            Steal::Empty => break,
            Steal::Retry => {}
        }
    }
    for i in 1..=stealers.len() {
        let victim = &stealers[(worker_id + i) % stealers.len()];
        loop {
            match victim.steal() {
                Steal::Success(job) => return Some(job),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
    }
    None
}
