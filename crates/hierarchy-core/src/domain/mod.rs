//! Domain model (ids, statuses, records, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod record;
pub mod status;

pub use self::errors::{ErrorKind, HierarchyError, Result};
pub use self::events::{JobStatusChange, Notification, Topic, WorkflowStatusChange};
pub use self::ids::Jid;
pub use self::record::JobRecord;
pub use self::status::{JobStatus, StatusCategory, WorkflowStatus};
