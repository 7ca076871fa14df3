use crate::falcon::api::{BatchCommand, BatchCommandResult, BatchSession};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use tracing::{info, warn};

const NO_SESSION_REASON: &str = "no session established";

/// What happened to a host during the push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    Succeeded,
    /// The host was offline and the commands were queued for it.
    Queued,
    Failed(String),
    /// Dry run, nothing was sent to the host.
    Skipped,
}

impl HostOutcome {
    /// The first failure is kept, otherwise a queued command makes the host queued.
    fn merge(self, other: HostOutcome) -> HostOutcome {
        match (self, other) {
            (failed @ HostOutcome::Failed(_), _) | (_, failed @ HostOutcome::Failed(_)) => failed,
            (HostOutcome::Queued, _) | (_, HostOutcome::Queued) => HostOutcome::Queued,
            (HostOutcome::Skipped, _) | (_, HostOutcome::Skipped) => HostOutcome::Skipped,
            _ => HostOutcome::Succeeded,
        }
    }
}

impl Display for HostOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HostOutcome::Succeeded => write!(f, "succeeded"),
            HostOutcome::Queued => write!(f, "queued while offline"),
            HostOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            HostOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushSummary {
    pub succeeded: usize,
    pub queued: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PushSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.queued + self.failed + self.skipped
    }
}

impl Display for PushSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} hosts: {} succeeded, {} queued, {} failed, {} skipped",
            self.total(),
            self.succeeded,
            self.queued,
            self.failed,
            self.skipped
        )
    }
}

/// Per host outcomes, in the order hosts were collected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushReport {
    host_ids: Vec<String>,
    outcomes: HashMap<String, HostOutcome>,
}

impl PushReport {
    pub fn skipped(host_ids: &[String]) -> Self {
        let mut report = Self::default();
        for host_id in host_ids {
            report.update(host_id, HostOutcome::Skipped);
        }
        report
    }

    /// Records the batch init result of `host_ids`. Hosts without a session are failed.
    pub(crate) fn record_session(&mut self, host_ids: &[String], session: &BatchSession) {
        for host_id in host_ids {
            let outcome = match session.hosts.get(host_id) {
                None => HostOutcome::Failed(NO_SESSION_REASON.to_string()),
                Some(host) if !host.errors.is_empty() => {
                    HostOutcome::Failed(format!("init session: {}", host.errors.join("; ")))
                }
                Some(host) if host.offline_queued => HostOutcome::Queued,
                Some(_) => HostOutcome::Succeeded,
            };
            self.update(host_id, outcome);
        }
    }

    /// Records the result of `command` on each of `host_ids`.
    pub(crate) fn record_command(
        &mut self,
        host_ids: &[String],
        command: &BatchCommand,
        result: &BatchCommandResult,
    ) {
        for host_id in host_ids {
            if matches!(self.outcome(host_id), Some(HostOutcome::Failed(_))) {
                continue;
            }
            let outcome = match result.hosts.get(host_id) {
                None => HostOutcome::Failed(format!("{}: no result", command.base_command)),
                Some(host) => match host.failure() {
                    Some(reason) => HostOutcome::Failed(format!("{}: {reason}", command.base_command)),
                    None if host.offline_queued => HostOutcome::Queued,
                    None => HostOutcome::Succeeded,
                },
            };
            self.update(host_id, outcome);
        }
    }

    fn update(&mut self, host_id: &str, outcome: HostOutcome) {
        match self.outcomes.remove(host_id) {
            Some(current) => {
                self.outcomes.insert(host_id.to_string(), current.merge(outcome));
            }
            None => {
                self.host_ids.push(host_id.to_string());
                self.outcomes.insert(host_id.to_string(), outcome);
            }
        }
    }

    pub fn outcome(&self, host_id: &str) -> Option<&HostOutcome> {
        self.outcomes.get(host_id)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &HostOutcome)> {
        self.host_ids
            .iter()
            .filter_map(|id| self.outcomes.get(id).map(|outcome| (id.as_str(), outcome)))
    }

    pub fn is_empty(&self) -> bool {
        self.host_ids.is_empty()
    }

    pub fn summary(&self) -> PushSummary {
        self.outcomes
            .values()
            .fold(PushSummary::default(), |mut summary, outcome| {
                match outcome {
                    HostOutcome::Succeeded => summary.succeeded += 1,
                    HostOutcome::Queued => summary.queued += 1,
                    HostOutcome::Failed(_) => summary.failed += 1,
                    HostOutcome::Skipped => summary.skipped += 1,
                }
                summary
            })
    }

    /// Logs every host and the summary.
    pub fn log(&self) {
        for (host_id, outcome) in self.outcomes() {
            match outcome {
                HostOutcome::Failed(_) => warn!("Host {host_id} {outcome}"),
                _ => info!("Host {host_id} {outcome}"),
            }
        }
        info!("{}", self.summary());
    }
}
