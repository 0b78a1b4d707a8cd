//! Sequential runner with reverse-order compensation

use crate::error::{Result, RunnerError};
use crate::report::{CleanupReport, RunReport, RunState};
use crate::state::{CANCELLED, HALTED, StateBag};
use crate::step::{Step, StepAction, StepState};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Executes an ordered list of steps against one state bag.
///
/// Steps never run concurrently: later steps depend on values only earlier
/// steps produce. When a step halts or the build is cancelled, no further
/// step runs, and `cleanup` is called for every step whose `run` was
/// invoked, most recent first.
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self::with_cancellation(steps, CancellationToken::new())
    }

    pub fn with_cancellation(steps: Vec<Box<dyn Step>>, cancel: CancellationToken) -> Self {
        Self { steps, cancel }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Interrupt the run. In-flight remote waits are abandoned and the unwind
    /// still happens.
    pub fn cancel(&self) {
        tracing::info!("Cancelling the step runner...");
        self.cancel.cancel();
    }

    /// Check that every key a step reads is present in `initial` or written
    /// by an earlier step.
    pub fn validate(&self, initial: &StateBag) -> Result<()> {
        if self.steps.is_empty() {
            return Err(RunnerError::Empty);
        }

        let mut provided: HashSet<&'static str> = initial.keys().collect();
        for step in &self.steps {
            for &key in step.reads() {
                if !provided.contains(key) {
                    return Err(RunnerError::MissingKey {
                        step: step.name().to_string(),
                        key,
                    });
                }
            }
            provided.extend(step.writes().iter().copied());
        }
        Ok(())
    }

    /// Run every step in order, then unwind.
    pub async fn run(&self, state: &mut StateBag) -> RunReport {
        let start = std::time::Instant::now();
        let mut states = vec![StepState::NotStarted; self.steps.len()];
        let mut run_state = RunState::Completed;

        for (index, step) in self.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!("Build cancelled before step '{}'", step.name());
                state.put(CANCELLED, true);
                run_state = RunState::Cancelled;
                break;
            }

            tracing::debug!("Running step {}/{}: {}", index + 1, self.steps.len(), step.name());
            states[index] = StepState::Running;
            let action = step.run(&self.cancel, state).await;
            states[index] = action.into();

            match action {
                StepAction::Continue => {}
                StepAction::Halt => {
                    tracing::debug!("Step '{}' halted the build", step.name());
                    state.put(HALTED, true);
                    run_state = RunState::Halted;
                    break;
                }
                StepAction::Cancelled => {
                    tracing::info!("Step '{}' was cancelled", step.name());
                    state.put(CANCELLED, true);
                    run_state = RunState::Cancelled;
                    break;
                }
            }
        }

        let cleanup = self.unwind(&states, state).await;

        RunReport {
            state: run_state,
            steps: self
                .steps
                .iter()
                .zip(states)
                .map(|(step, state)| (step.name().to_string(), state))
                .collect(),
            cleanup,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn unwind(&self, states: &[StepState], state: &mut StateBag) -> CleanupReport {
        let mut report = CleanupReport::new();

        for (step, step_state) in self.steps.iter().zip(states).rev() {
            if !step_state.has_run() {
                continue;
            }

            tracing::debug!("Cleaning up step: {}", step.name());
            match step.cleanup(state).await {
                Ok(()) => report.add_success(step.name()),
                Err(e) => {
                    tracing::warn!("Cleanup of '{}' failed: {:#}", step.name(), e);
                    report.add_failure(step.name(), format!("{:#}", e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ERROR, StateKey};
    use crate::step::halt;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    const OUTPUT: StateKey<String> = StateKey::new("output");

    struct Recording {
        name: String,
        action: StepAction,
        fail_cleanup: bool,
        journal: Journal,
    }

    impl Recording {
        fn boxed(name: &str, action: StepAction, journal: &Journal) -> Box<dyn Step> {
            Box::new(Self {
                name: name.to_string(),
                action,
                fail_cleanup: false,
                journal: journal.clone(),
            })
        }
    }

    #[async_trait]
    impl Step for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
            self.journal.lock().unwrap().push(format!("run:{}", self.name));
            match self.action {
                StepAction::Halt => halt(state, anyhow::anyhow!("{} failed", self.name)),
                other => other,
            }
        }

        async fn cleanup(&self, _state: &mut StateBag) -> anyhow::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("cleanup:{}", self.name));
            if self.fail_cleanup {
                anyhow::bail!("cleanup of {} failed", self.name);
            }
            Ok(())
        }
    }

    struct Reader;

    #[async_trait]
    impl Step for Reader {
        fn name(&self) -> &str {
            "reader"
        }

        fn reads(&self) -> &[&'static str] {
            const READS: &[&str] = &[OUTPUT.name()];
            READS
        }

        async fn run(&self, _cancel: &CancellationToken, _state: &mut StateBag) -> StepAction {
            StepAction::Continue
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_all_continue_cleans_up_in_reverse() {
        let journal = journal();
        let runner = Runner::new(vec![
            Recording::boxed("one", StepAction::Continue, &journal),
            Recording::boxed("two", StepAction::Continue, &journal),
            Recording::boxed("three", StepAction::Continue, &journal),
        ]);

        let mut state = StateBag::new();
        let report = runner.run(&mut state).await;

        assert!(report.is_success());
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "run:one",
                "run:two",
                "run:three",
                "cleanup:three",
                "cleanup:two",
                "cleanup:one"
            ]
        );
    }

    #[tokio::test]
    async fn test_unwind_after_failure_at_every_position() {
        for k in 1..=4usize {
            let journal = journal();
            let steps = (1..=4usize)
                .map(|i| {
                    let action = if i == k {
                        StepAction::Halt
                    } else {
                        StepAction::Continue
                    };
                    Recording::boxed(&format!("s{}", i), action, &journal)
                })
                .collect();
            let runner = Runner::new(steps);

            let mut state = StateBag::new();
            let report = runner.run(&mut state).await;

            assert_eq!(report.state, RunState::Halted);
            assert!(state.flag(HALTED));
            assert_eq!(state.get(ERROR).to_string(), format!("s{} failed", k));

            let cleanups: Vec<String> = journal
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| e.strip_prefix("cleanup:").map(str::to_string))
                .collect();
            let expected: Vec<String> = (1..=k).rev().map(|i| format!("s{}", i)).collect();
            assert_eq!(cleanups, expected, "failure at step {}", k);

            let runs = journal
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.starts_with("run:"))
                .count();
            assert_eq!(runs, k);
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_stop_unwind() {
        let journal = journal();
        let failing = Box::new(Recording {
            name: "two".to_string(),
            action: StepAction::Continue,
            fail_cleanup: true,
            journal: journal.clone(),
        });
        let runner = Runner::new(vec![
            Recording::boxed("one", StepAction::Continue, &journal),
            failing,
            Recording::boxed("three", StepAction::Halt, &journal),
        ]);

        let mut state = StateBag::new();
        let report = runner.run(&mut state).await;

        assert!(!report.cleanup.is_success());
        assert_eq!(report.cleanup.entries.len(), 3);
        assert_eq!(report.cleanup.failures().count(), 1);
        assert!(journal.lock().unwrap().contains(&"cleanup:one".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_step_stops_run_and_unwinds() {
        let journal = journal();
        let runner = Runner::new(vec![
            Recording::boxed("one", StepAction::Continue, &journal),
            Recording::boxed("two", StepAction::Cancelled, &journal),
            Recording::boxed("three", StepAction::Continue, &journal),
        ]);

        let mut state = StateBag::new();
        let report = runner.run(&mut state).await;

        assert_eq!(report.state, RunState::Cancelled);
        assert!(state.flag(CANCELLED));
        assert_eq!(report.executed_steps(), vec!["one", "two"]);
        assert_eq!(report.steps[2].1, StepState::NotStarted);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let journal = journal();
        let runner = Runner::new(vec![Recording::boxed(
            "one",
            StepAction::Continue,
            &journal,
        )]);
        runner.cancel();

        let mut state = StateBag::new();
        let report = runner.run(&mut state).await;

        assert_eq!(report.state, RunState::Cancelled);
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_validate_reports_missing_key() {
        let runner = Runner::new(vec![Box::new(Reader)]);
        let err = runner.validate(&StateBag::new()).unwrap_err();

        match err {
            RunnerError::MissingKey { step, key } => {
                assert_eq!(step, "reader");
                assert_eq!(key, "output");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validate_accepts_initial_keys() {
        let runner = Runner::new(vec![Box::new(Reader)]);
        let mut state = StateBag::new();
        state.put(OUTPUT, "done".to_string());

        assert!(runner.validate(&state).is_ok());
    }
}
