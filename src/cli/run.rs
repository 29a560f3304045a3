//! Command execution for the CLI.
//!
//! This module handles running CLI commands and producing output.

use crate::cli::{CatalogCommand, Cli, Command, EdgesCommand, OrderCommand};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::flow::bulk::{self, ErrorOutput};
use crate::flow::{ordering, EdgeSpec, FlowStore, SqliteFlowStore};
use crate::guard::{Actor, AllowAll, GuardedStore};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

/// Output from running the CLI, with separate stdout and stderr messages.
#[derive(Debug)]
pub struct CliOutput {
    /// Exit code for the process.
    pub exit_code: ExitCode,
    /// Messages to print to stdout.
    pub stdout: Vec<String>,
    /// Messages to print to stderr.
    pub stderr: Vec<String>,
}

/// Default result limit for the audit log.
const DEFAULT_RESULT_LIMIT: usize = 50;

/// Run a parsed command line with the given stdin input.
pub fn run(cli: Cli, stdin: &str) -> CliOutput {
    if !cli.command.needs_store() {
        return run_version();
    }

    let store = match open_store(cli.db.as_deref()) {
        Ok(s) => s,
        Err(e) => return error_output(&e),
    };
    let guarded = GuardedStore::new(store, AllowAll, Actor::user(cli.actor));
    run_with_store(&guarded, cli.command, stdin)
}

/// Run a command against an already opened store.
pub fn run_with_store(store: &dyn FlowStore, command: Command, stdin: &str) -> CliOutput {
    match command {
        Command::Version => run_version(),
        Command::Catalog(cmd) => run_catalog_cmd(store, cmd),
        Command::Edges(cmd) => run_edges_cmd(store, cmd, stdin),
        Command::Order(cmd) => run_order_cmd(store, cmd),
        Command::Batch => respond(bulk::batch_from_json(store, stdin)),
        Command::Graph { flow_id } => respond(store.project(&flow_id)),
        Command::AuditLog { subject, limit } => {
            let limit = Some(limit.unwrap_or(DEFAULT_RESULT_LIMIT));
            respond(store.get_audit_log(subject.as_deref(), limit))
        }
    }
}

fn run_version() -> CliOutput {
    CliOutput {
        exit_code: ExitCode::SUCCESS,
        stdout: vec![],
        stderr: vec![format!("taskflow v{}", crate::VERSION)],
    }
}

// === Catalogue Commands ===

fn run_catalog_cmd(store: &dyn FlowStore, cmd: CatalogCommand) -> CliOutput {
    match cmd {
        CatalogCommand::Project { name } => respond(store.create_project(&name)),
        CatalogCommand::Flow { project_id, name } => respond(store.create_flow(&project_id, &name)),
        CatalogCommand::Status { project_id, name } => {
            respond(store.create_status(&project_id, &name))
        }
        CatalogCommand::Task { status_id, title } => respond(store.create_task(&status_id, &title)),
        CatalogCommand::Statuses { project_id } => respond(store.list_statuses(&project_id)),
        CatalogCommand::Tasks { project_id } => respond(store.list_tasks(&project_id)),
        CatalogCommand::DeleteTask { id } => respond(store.delete_task(&id)),
    }
}

// === Edge Commands ===

fn run_edges_cmd(store: &dyn FlowStore, cmd: EdgesCommand, stdin: &str) -> CliOutput {
    match cmd {
        EdgesCommand::List { flow_id } => respond(store.list_edges(&flow_id)),
        EdgesCommand::Create { flow_id, source, target, id, edge_type, data } => {
            respond(edges_create(store, &flow_id, source, target, id, edge_type, data.as_deref()))
        }
        EdgesCommand::Import => respond(bulk::create_edges_from_json(store, stdin)),
        EdgesCommand::Delete { flow_id, ids } => {
            respond(bulk::delete_edges_from_csv(store, &flow_id, &ids))
        }
    }
}

fn edges_create(
    store: &dyn FlowStore,
    flow_id: &str,
    source: String,
    target: String,
    id: Option<String>,
    edge_type: Option<String>,
    data: Option<&str>,
) -> Result<crate::flow::Dependency> {
    let data = data
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| Error::InvalidArgument(format!("--data is not valid JSON: {e}")))?;
    let spec = EdgeSpec { id, source, target, edge_type, data };
    store.create_edge(flow_id, spec)
}

// === Ordering Commands ===

fn run_order_cmd(store: &dyn FlowStore, cmd: OrderCommand) -> CliOutput {
    match cmd {
        OrderCommand::List { status_id } => respond(store.list_ordered(&status_id)),
        OrderCommand::Set { status_id, task_ids } => respond(store.reorder(&status_id, &task_ids)),
        OrderCommand::Move { task_id, from, to, position } => {
            let target = position.map(ordering::target_index);
            respond(store.move_task(&task_id, &from, &to, target))
        }
        OrderCommand::Check { status_id } => match store.check_ordering(&status_id) {
            Ok(report) if report.is_dense() => json_output(&report),
            Ok(report) => {
                let mut output = json_output(&report);
                output.exit_code = ExitCode::from(2);
                output
            }
            Err(e) => error_output(&e),
        },
    }
}

// === Helpers ===

fn open_store(db: Option<&Path>) -> Result<SqliteFlowStore> {
    match db {
        Some(path) => {
            let cwd = std::env::current_dir()?;
            let config = EngineConfig::load_from(&cwd)?.unwrap_or_default();
            SqliteFlowStore::with_settings(path, config.store_settings())
        }
        None => bulk::open_default_store(),
    }
}

fn respond<T: Serialize>(result: Result<T>) -> CliOutput {
    match result {
        Ok(value) => json_output(&value),
        Err(e) => error_output(&e),
    }
}

fn json_output<T: Serialize>(value: &T) -> CliOutput {
    match serde_json::to_string_pretty(value) {
        Ok(json) => CliOutput { exit_code: ExitCode::SUCCESS, stdout: vec![json], stderr: vec![] },
        Err(e) => error_output(&Error::from(e)),
    }
}

fn error_output(err: &Error) -> CliOutput {
    let rendered = serde_json::to_string(&ErrorOutput::from(err)).unwrap_or_else(|_| err.to_string());
    CliOutput { exit_code: ExitCode::from(1), stdout: vec![], stderr: vec![rendered] }
}
