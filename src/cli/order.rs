//! Ordering CLI subcommands.

use clap::Subcommand;

/// Bucket ordering commands.
///
/// ```bash
/// taskflow order list to-do-3c4d
/// taskflow order set to-do-3c4d c-0003 a-0001 b-0002
/// taskflow order move x-0001 --from to-do-3c4d --to done-5e6f --position 0
/// ```
#[derive(Subcommand, Debug, Clone)]
pub enum OrderCommand {
    /// List a bucket's task ids in order.
    List {
        /// Status ID
        status_id: String,
    },

    /// Replace a bucket's order. Every member must be listed exactly once.
    Set {
        /// Status ID
        status_id: String,
        /// Task IDs in the new order
        task_ids: Vec<String>,
    },

    /// Move a task within or across buckets.
    Move {
        /// Task ID
        task_id: String,
        /// Status the task is in now
        #[arg(long)]
        from: String,
        /// Destination status
        #[arg(long)]
        to: String,
        /// Destination index, clamped to the bucket (appends when omitted)
        #[arg(long, allow_negative_numbers = true)]
        position: Option<i64>,
    },

    /// Verify a bucket's positions are dense.
    Check {
        /// Status ID
        status_id: String,
    },
}
