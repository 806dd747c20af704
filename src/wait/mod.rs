pub mod deploy;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::info;

/// Status lookup for a single resource. `None` means the provider no longer
/// reports the resource at all.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn status(&self, handle: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 100,
        }
    }
}

impl PollConfig {
    pub fn overridden(interval: Option<Duration>, max_attempts: Option<u32>) -> Self {
        let defaults = Self::default();
        Self {
            interval: interval.unwrap_or(defaults.interval),
            max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
        }
    }
}

/// How a reported status is compared against the desired terminal state.
/// The target is an exact match; the failure marker is a substring match.
#[derive(Debug, Clone)]
pub struct StatusMatcher {
    target: String,
    failure_marker: Option<String>,
    case_insensitive: bool,
}

impl StatusMatcher {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            failure_marker: None,
            case_insensitive: false,
        }
    }

    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn is_target(&self, status: &str) -> bool {
        if self.case_insensitive {
            status.eq_ignore_ascii_case(&self.target)
        } else {
            status == self.target
        }
    }

    fn is_failure(&self, status: &str) -> bool {
        match &self.failure_marker {
            Some(marker) if self.case_insensitive => status
                .to_ascii_lowercase()
                .contains(&marker.to_ascii_lowercase()),
            Some(marker) => status.contains(marker.as_str()),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The resource reported the target status.
    Reached { status: String, attempts: u32 },
    /// The resource reported a status matching the failure marker.
    Failed { status: String, attempts: u32 },
    /// The attempt cap was exhausted without a terminal status.
    TimedOut { attempts: u32 },
    /// The provider stopped reporting the resource. Treated as a
    /// success-like resolution for every resource type.
    Gone { attempts: u32 },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Reached { .. } | PollOutcome::Gone { .. })
    }
}

/// Bounded sleep-then-query wait loop shared by every wait surface. Each
/// cycle sleeps the configured interval, queries the probe once, and checks
/// the target before the failure marker.
pub struct StatusPoller {
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub async fn wait(
        &self,
        probe: &dyn StatusProbe,
        handle: &str,
        matcher: &StatusMatcher,
    ) -> Result<PollOutcome> {
        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;
            attempts += 1;

            let status = match probe.status(handle).await? {
                Some(status) => status,
                None => {
                    info!("{} is no longer reported, treating as resolved", handle);
                    return Ok(PollOutcome::Gone { attempts });
                }
            };

            if matcher.is_target(&status) {
                return Ok(PollOutcome::Reached { status, attempts });
            }
            if matcher.is_failure(&status) {
                info!("{} failed with status {}", handle, status);
                return Ok(PollOutcome::Failed { status, attempts });
            }
            info!("{} is in status {}", handle, status);
        }

        info!(
            "{} never reached state {} after {} attempts",
            handle, matcher.target, attempts
        );
        Ok(PollOutcome::TimedOut { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed status sequence; the last entry repeats once the
    /// script runs out.
    struct ScriptedProbe {
        script: Mutex<Vec<Option<String>>>,
        queries: AtomicU32,
    }

    impl ScriptedProbe {
        fn new<I: IntoIterator<Item = &'static str>>(statuses: I) -> Self {
            Self {
                script: Mutex::new(
                    statuses
                        .into_iter()
                        .map(|s| Some(s.to_string()))
                        .collect(),
                ),
                queries: AtomicU32::new(0),
            }
        }

        fn gone_after<I: IntoIterator<Item = &'static str>>(statuses: I) -> Self {
            let mut script: Vec<Option<String>> = statuses
                .into_iter()
                .map(|s| Some(s.to_string()))
                .collect();
            script.push(None);
            Self {
                script: Mutex::new(script),
                queries: AtomicU32::new(0),
            }
        }

        fn queries(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusProbe for ScriptedProbe {
        async fn status(&self, _handle: &str) -> Result<Option<String>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }
    }

    fn fast_poller(max_attempts: u32) -> StatusPoller {
        StatusPoller::new(PollConfig {
            interval: Duration::from_millis(0),
            max_attempts,
        })
    }

    #[tokio::test]
    async fn reaches_target_without_extra_queries() {
        let probe = ScriptedProbe::new([
            "CREATE_IN_PROGRESS",
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
        ]);
        let matcher = StatusMatcher::new("CREATE_COMPLETE").failing_on("FAILED");
        let outcome = fast_poller(100)
            .wait(&probe, "my-stack", &matcher)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Reached {
                status: "CREATE_COMPLETE".to_string(),
                attempts: 3
            }
        );
        assert_eq!(probe.queries(), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_failure_status() {
        let probe = ScriptedProbe::new([
            "CREATE_IN_PROGRESS",
            "ROLLBACK_FAILED",
            "CREATE_COMPLETE",
        ]);
        let matcher = StatusMatcher::new("CREATE_COMPLETE").failing_on("FAILED");
        let outcome = fast_poller(100)
            .wait(&probe, "my-stack", &matcher)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                status: "ROLLBACK_FAILED".to_string(),
                attempts: 2
            }
        );
        assert_eq!(probe.queries(), 2);
    }

    #[tokio::test]
    async fn times_out_after_exactly_max_attempts() {
        let probe = ScriptedProbe::new(["UPDATE_IN_PROGRESS"]);
        let matcher = StatusMatcher::new("UPDATE_COMPLETE").failing_on("FAILED");
        let outcome = fast_poller(7)
            .wait(&probe, "my-stack", &matcher)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 7 });
        assert_eq!(probe.queries(), 7);
    }

    #[tokio::test]
    async fn already_resolved_handle_needs_one_query() {
        let probe = ScriptedProbe::new(["CREATE_COMPLETE"]);
        let matcher = StatusMatcher::new("CREATE_COMPLETE").failing_on("FAILED");
        let outcome = fast_poller(100)
            .wait(&probe, "my-stack", &matcher)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Reached {
                status: "CREATE_COMPLETE".to_string(),
                attempts: 1
            }
        );
        assert_eq!(probe.queries(), 1);
    }

    #[tokio::test]
    async fn rollback_complete_is_not_a_failure_match() {
        let probe = ScriptedProbe::new([
            "UPDATE_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE",
        ]);
        let matcher = StatusMatcher::new("UPDATE_COMPLETE").failing_on("FAILED");
        let outcome = fast_poller(10)
            .wait(&probe, "my-stack", &matcher)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 10 });
    }

    #[tokio::test]
    async fn vanished_resource_resolves_as_gone() {
        let probe = ScriptedProbe::gone_after(["Terminating"]);
        let matcher = StatusMatcher::new("Terminated").case_insensitive();
        let outcome = fast_poller(10)
            .wait(&probe, "my-env", &matcher)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Gone { attempts: 2 });
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn case_insensitive_target_match() {
        let probe = ScriptedProbe::new(["online"]);
        let matcher = StatusMatcher::new("Online").case_insensitive();
        let outcome = fast_poller(5)
            .wait(&probe, "i-123", &matcher)
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Reached { attempts: 1, .. }));
    }
}
