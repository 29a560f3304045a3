//! Catalogue CLI subcommands.

use clap::Subcommand;

/// Catalogue commands.
///
/// Tasks are owned by the wider task system; these commands exist so a
/// board can be set up and inspected from the shell.
///
/// ```bash
/// taskflow catalog project "Website"
/// taskflow catalog status website-1a2b "To Do"
/// taskflow catalog task to-do-3c4d "Write copy"
/// ```
#[derive(Subcommand, Debug, Clone)]
pub enum CatalogCommand {
    /// Create a project.
    Project {
        /// Project name
        name: String,
    },

    /// Create a flow in a project.
    Flow {
        /// Project ID
        project_id: String,
        /// Flow name
        name: String,
    },

    /// Create a status bucket as the project's last column.
    Status {
        /// Project ID
        project_id: String,
        /// Column name
        name: String,
    },

    /// Create a task at the end of a status bucket.
    Task {
        /// Status ID
        status_id: String,
        /// Task title
        title: String,
    },

    /// List a project's status buckets.
    Statuses {
        /// Project ID
        project_id: String,
    },

    /// List a project's tasks.
    Tasks {
        /// Project ID
        project_id: String,
    },

    /// Delete a task along with its edges, closing the gap in its bucket.
    #[command(name = "delete-task")]
    DeleteTask {
        /// Task ID
        id: String,
    },
}
