//! Tree - ジョブの親子関係と workflow 集約
//!
//! # 主要コンポーネント
//! - **JobNode**: 1 ジョブへのハンドル（状態遷移・木の走査）
//! - **Workflow**: root 単位の集約ステータス
//! - **WorkflowCursor**: コレクションを Workflow として列挙

pub mod node;
pub mod workflow;

pub use self::node::{JobNode, Transition};
pub use self::workflow::{Workflow, WorkflowCursor};
