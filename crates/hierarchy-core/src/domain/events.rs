//! Events - 状態遷移の通知
//!
//! NotificationBus に流れるイベントを定義します。
//! 配信は at-least-once 前提なので、受け手は冪等に処理すること。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::Jid;
use super::status::{JobStatus, WorkflowStatus};

/// Named notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    JobStatusUpdate,
    WorkflowStatusUpdate,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::JobStatusUpdate => "job.status_update",
            Topic::WorkflowStatusUpdate => "workflow.status_update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job's status was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusChange {
    pub jid: Jid,
    pub status: JobStatus,
    pub previous: Option<JobStatus>,
}

/// A workflow's aggregate status changed. `workflow` is the root jid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatusChange {
    pub workflow: Jid,
    pub status: WorkflowStatus,
    pub previous: Option<WorkflowStatus>,
}

/// Notification はバス上のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    JobStatusUpdate(JobStatusChange),
    WorkflowStatusUpdate(WorkflowStatusChange),
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::JobStatusUpdate(_) => Topic::JobStatusUpdate,
            Notification::WorkflowStatusUpdate(_) => Topic::WorkflowStatusUpdate,
        }
    }
}
