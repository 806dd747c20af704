use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use thiserror::Error;

use super::PollConfig;

const STATUS_SUCCESSFUL: &str = "successful";
const STATUS_FAILED: &str = "failed";

/// Launches deployments and answers batched status lookups for them. The
/// provider runs the deployments of one group concurrently; this side only
/// observes them.
#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    type Spec: Send + Sync;

    async fn launch(&self, spec: &Self::Spec) -> Result<String>;

    /// Current status of every pending deployment the provider still knows
    /// about. Handles missing from the map stay pending.
    async fn statuses(&self, pending: &BTreeSet<String>) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Clone)]
pub struct DeploymentGroup<S> {
    deployments: Vec<S>,
}

impl<S> DeploymentGroup<S> {
    pub fn new(deployments: Vec<S>) -> Self {
        Self { deployments }
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

/// Ordered groups of deployments. Group `i + 1` is not launched until every
/// deployment of group `i` resolved successfully.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlan<S> {
    groups: Vec<DeploymentGroup<S>>,
}

impl<S> DeploymentPlan<S> {
    pub fn new(groups: Vec<DeploymentGroup<S>>) -> Self {
        Self { groups }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment {id} failed with status {status}")]
    Failed { id: String, status: String },

    #[error("deployments never failed or succeeded after {attempts} attempts, still pending: {}", pending.join(", "))]
    TimedOut { attempts: u32, pending: Vec<String> },

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

pub struct DeploymentOrchestrator {
    config: PollConfig,
}

impl DeploymentOrchestrator {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Runs the plan to completion. Success is implicit in every group
    /// resolving; the first failure or timeout aborts the whole plan with no
    /// rollback of groups that already succeeded.
    pub async fn run<D: DeploymentDriver>(
        &self,
        driver: &D,
        plan: &DeploymentPlan<D::Spec>,
    ) -> Result<(), DeployError> {
        for (index, group) in plan.groups.iter().enumerate() {
            info!(
                "deploying group {}/{} ({} deployments)",
                index + 1,
                plan.groups.len(),
                group.len()
            );

            let mut pending = BTreeSet::new();
            for spec in &group.deployments {
                pending.insert(driver.launch(spec).await?);
            }

            self.wait_for_group(driver, pending).await?;
            info!("group {}/{} resolved", index + 1, plan.groups.len());
        }
        Ok(())
    }

    async fn wait_for_group<D: DeploymentDriver>(
        &self,
        driver: &D,
        mut pending: BTreeSet<String>,
    ) -> Result<(), DeployError> {
        let mut attempts = 0;
        while !pending.is_empty() {
            tokio::time::sleep(self.config.interval).await;
            attempts += 1;
            if attempts > self.config.max_attempts {
                return Err(DeployError::TimedOut {
                    attempts: self.config.max_attempts,
                    pending: pending.into_iter().collect(),
                });
            }

            let statuses = driver.statuses(&pending).await?;
            for id in pending.clone() {
                let Some(status) = statuses.get(&id) else {
                    continue;
                };
                info!("{} : {}", id, status);
                if status.eq_ignore_ascii_case(STATUS_FAILED) {
                    return Err(DeployError::Failed {
                        id,
                        status: status.clone(),
                    });
                }
                if status.eq_ignore_ascii_case(STATUS_SUCCESSFUL) {
                    pending.remove(&id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out sequential deployment IDs and replays one status map per
    /// poll cycle; the last map repeats.
    struct FakeDriver {
        launched: Mutex<Vec<String>>,
        rounds: Mutex<Vec<HashMap<String, String>>>,
        polls: AtomicU32,
    }

    impl FakeDriver {
        fn new(rounds: Vec<Vec<(&str, &str)>>) -> Self {
            Self {
                launched: Mutex::new(Vec::new()),
                rounds: Mutex::new(
                    rounds
                        .into_iter()
                        .map(|round| {
                            round
                                .into_iter()
                                .map(|(id, status)| (id.to_string(), status.to_string()))
                                .collect()
                        })
                        .collect(),
                ),
                polls: AtomicU32::new(0),
            }
        }

        fn launched(&self) -> Vec<String> {
            self.launched.lock().unwrap().clone()
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeploymentDriver for FakeDriver {
        type Spec = String;

        async fn launch(&self, spec: &String) -> Result<String> {
            self.launched.lock().unwrap().push(spec.clone());
            Ok(spec.clone())
        }

        async fn statuses(
            &self,
            _pending: &BTreeSet<String>,
        ) -> Result<HashMap<String, String>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut rounds = self.rounds.lock().unwrap();
            if rounds.len() > 1 {
                Ok(rounds.remove(0))
            } else {
                Ok(rounds[0].clone())
            }
        }
    }

    fn orchestrator(max_attempts: u32) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(PollConfig {
            interval: Duration::from_millis(0),
            max_attempts,
        })
    }

    fn plan(groups: Vec<Vec<&str>>) -> DeploymentPlan<String> {
        DeploymentPlan::new(
            groups
                .into_iter()
                .map(|g| DeploymentGroup::new(g.into_iter().map(String::from).collect()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn single_group_resolves_when_all_succeed() {
        let driver = FakeDriver::new(vec![
            vec![("d1", "running"), ("d2", "successful")],
            vec![("d1", "successful")],
        ]);
        let plan = plan(vec![vec!["d1", "d2"]]);
        orchestrator(100).run(&driver, &plan).await.unwrap();
        assert_eq!(driver.launched(), vec!["d1", "d2"]);
        assert_eq!(driver.polls(), 2);
    }

    #[tokio::test]
    async fn failure_aborts_without_waiting_for_the_rest() {
        let driver = FakeDriver::new(vec![vec![
            ("d1", "pending"),
            ("d2", "failed"),
            ("d3", "pending"),
        ]]);
        let plan = plan(vec![vec!["d1", "d2", "d3"]]);
        let err = orchestrator(100).run(&driver, &plan).await.unwrap_err();
        match err {
            DeployError::Failed { id, status } => {
                assert_eq!(id, "d2");
                assert_eq!(status, "failed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.polls(), 1);
    }

    #[tokio::test]
    async fn later_group_launches_then_aborts_in_wait_phase() {
        let driver = FakeDriver::new(vec![
            vec![("a1", "successful"), ("a2", "successful")],
            vec![("b1", "failed"), ("b2", "running")],
        ]);
        let plan = plan(vec![vec!["a1", "a2"], vec!["b1", "b2"]]);
        let err = orchestrator(100).run(&driver, &plan).await.unwrap_err();
        assert!(matches!(err, DeployError::Failed { id, .. } if id == "b1"));
        // The failing group's launches still happened before the wait.
        assert_eq!(driver.launched(), vec!["a1", "a2", "b1", "b2"]);
    }

    #[tokio::test]
    async fn groups_are_strictly_sequenced() {
        let driver = FakeDriver::new(vec![vec![
            ("a1", "successful"),
            ("b1", "successful"),
        ]]);
        let plan = plan(vec![vec!["a1"], vec!["b1"]]);
        orchestrator(100).run(&driver, &plan).await.unwrap();
        assert_eq!(driver.launched(), vec!["a1", "b1"]);
    }

    #[tokio::test]
    async fn times_out_with_pending_handles() {
        let driver = FakeDriver::new(vec![vec![("d1", "running")]]);
        let plan = plan(vec![vec!["d1"]]);
        let err = orchestrator(5).run(&driver, &plan).await.unwrap_err();
        match err {
            DeployError::TimedOut { attempts, pending } => {
                assert_eq!(attempts, 5);
                assert_eq!(pending, vec!["d1".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.polls(), 5);
    }

    #[tokio::test]
    async fn unknown_handles_in_response_stay_pending() {
        let driver = FakeDriver::new(vec![
            vec![("other", "failed")],
            vec![("d1", "successful")],
        ]);
        let plan = plan(vec![vec!["d1"]]);
        // "other" is not in the pending set, so its failure is ignored.
        orchestrator(100).run(&driver, &plan).await.unwrap();
        assert_eq!(driver.polls(), 2);
    }

    #[tokio::test]
    async fn statuses_are_case_insensitive() {
        let driver = FakeDriver::new(vec![vec![("d1", "Successful")]]);
        let plan = plan(vec![vec!["d1"]]);
        orchestrator(100).run(&driver, &plan).await.unwrap();
    }

    #[tokio::test]
    async fn empty_group_is_a_no_op() {
        let driver = FakeDriver::new(vec![vec![("d1", "successful")]]);
        let plan = plan(vec![vec![], vec!["d1"]]);
        orchestrator(100).run(&driver, &plan).await.unwrap();
    }
}
