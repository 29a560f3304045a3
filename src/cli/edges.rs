//! Edge CLI subcommands.

use clap::Subcommand;

/// Dependency edge commands.
///
/// ```bash
/// taskflow edges create launch-1a2b design-0001 build-0002 --type smoothstep
/// echo '{"flow_id": "launch-1a2b", "edges": [...]}' | taskflow edges import
/// taskflow edges delete launch-1a2b e1,e2
/// ```
#[derive(Subcommand, Debug, Clone)]
pub enum EdgesCommand {
    /// List a flow's edges.
    List {
        /// Flow ID
        flow_id: String,
    },

    /// Create one edge.
    Create {
        /// Flow ID
        flow_id: String,
        /// Source task ID
        source: String,
        /// Target task ID
        target: String,
        /// Edge ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Edge type
        #[arg(long = "type")]
        edge_type: Option<String>,
        /// JSON payload stored with the edge
        #[arg(long)]
        data: Option<String>,
    },

    /// Create several edges atomically (stdin: create-edges JSON).
    Import,

    /// Delete edges by id.
    Delete {
        /// Flow ID
        flow_id: String,
        /// Comma-separated edge IDs
        ids: String,
    },
}
