//! Job status state machine and workflow aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::HierarchyError;

/// Status of a single job node.
///
/// State transitions:
/// - Queued -> Running -> Complete
/// - Queued -> Running -> Requeued -> Running (retry cycle)
/// - any -> Failed (classified by the surrounding job-processing system)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Requeued,
    Failed,
}

impl JobStatus {
    /// Value persisted in the job record's `status` field.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Requeued => "requeued",
            JobStatus::Failed => "failed",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "requeued" => Ok(JobStatus::Requeued),
            "failed" => Ok(JobStatus::Failed),
            other => Err(HierarchyError::StructuralAnomaly(format!(
                "unknown job status {other:?}"
            ))),
        }
    }
}

/// Workflow status (aggregated from every job of the tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Nothing has started yet.
    Queued,

    /// At least one job is in flight, or the tree is partially complete.
    Running,

    /// Every job completed.
    Complete,

    /// At least one job failed.
    Failed,
}

impl WorkflowStatus {
    /// Aggregate job statuses into a workflow status.
    ///
    /// Precedence: failed > running (or partially complete) > complete > queued.
    /// A job with no stored status counts as queued.
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Option<JobStatus>>,
    {
        let mut any = false;
        let mut all_complete = true;
        let mut all_queued = true;
        for status in statuses {
            any = true;
            let status = status.unwrap_or(JobStatus::Queued);
            if status == JobStatus::Failed {
                return WorkflowStatus::Failed;
            }
            all_complete &= status == JobStatus::Complete;
            all_queued &= status == JobStatus::Queued;
        }

        if !any || all_queued {
            WorkflowStatus::Queued
        } else if all_complete {
            WorkflowStatus::Complete
        } else {
            WorkflowStatus::Running
        }
    }

    /// The status collection a workflow in this status is indexed under.
    pub fn category(self) -> StatusCategory {
        match self {
            WorkflowStatus::Queued | WorkflowStatus::Running => StatusCategory::Running,
            WorkflowStatus::Complete => StatusCategory::Complete,
            WorkflowStatus::Failed => StatusCategory::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Queued => "queued",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Complete => "complete",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status categories used to index workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Running,
    Complete,
    Failed,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 3] = [
        StatusCategory::Running,
        StatusCategory::Complete,
        StatusCategory::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCategory::Running => "running",
            StatusCategory::Complete => "complete",
            StatusCategory::Failed => "failed",
        }
    }

    /// Terminal categories may be pruned; running must never be.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatusCategory::Running)
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use JobStatus::*;

    #[rstest]
    #[case::queued(Queued)]
    #[case::running(Running)]
    #[case::complete(Complete)]
    #[case::requeued(Requeued)]
    #[case::failed(Failed)]
    fn persisted_value_parses_back(#[case] status: JobStatus) {
        assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
    }

    #[test]
    fn unknown_persisted_value_is_an_anomaly() {
        let err = "exploded".parse::<JobStatus>().unwrap_err();
        assert!(matches!(err, HierarchyError::StructuralAnomaly(_)));
    }

    #[rstest]
    #[case::single_failed_leaf(vec![Complete, Complete, Failed], WorkflowStatus::Failed)]
    #[case::failed_beats_running(vec![Running, Failed, Queued], WorkflowStatus::Failed)]
    #[case::all_complete(vec![Complete, Complete], WorkflowStatus::Complete)]
    #[case::one_running(vec![Complete, Running], WorkflowStatus::Running)]
    #[case::requeued_is_in_flight(vec![Complete, Requeued], WorkflowStatus::Running)]
    #[case::partially_complete(vec![Complete, Queued], WorkflowStatus::Running)]
    #[case::all_queued(vec![Queued, Queued], WorkflowStatus::Queued)]
    fn aggregate_follows_precedence(
        #[case] statuses: Vec<JobStatus>,
        #[case] expected: WorkflowStatus,
    ) {
        let aggregate = WorkflowStatus::aggregate(statuses.into_iter().map(Some));
        assert_eq!(aggregate, expected);
    }

    #[test]
    fn missing_status_counts_as_queued() {
        assert_eq!(
            WorkflowStatus::aggregate([None, Some(Complete)]),
            WorkflowStatus::Running
        );
        assert_eq!(WorkflowStatus::aggregate([None]), WorkflowStatus::Queued);
    }

    #[rstest]
    #[case(WorkflowStatus::Queued, StatusCategory::Running)]
    #[case(WorkflowStatus::Running, StatusCategory::Running)]
    #[case(WorkflowStatus::Complete, StatusCategory::Complete)]
    #[case(WorkflowStatus::Failed, StatusCategory::Failed)]
    fn workflow_status_maps_to_category(
        #[case] status: WorkflowStatus,
        #[case] category: StatusCategory,
    ) {
        assert_eq!(status.category(), category);
    }

    #[test]
    fn only_running_category_is_in_flight() {
        assert!(!StatusCategory::Running.is_terminal());
        assert!(StatusCategory::Complete.is_terminal());
        assert!(StatusCategory::Failed.is_terminal());
    }
}
