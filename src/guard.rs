//! Authorization boundary in front of a [`FlowStore`].
//!
//! Authentication and membership live outside the engine. An
//! [`AccessGuard`] answers one question (may this actor touch this
//! project?) and [`GuardedStore`] asks it before delegating any call. The
//! project is resolved from whatever id the call names: a flow, a status
//! bucket, or a task.

use crate::error::{Entity, Error, Result};
use crate::flow::models::{
    AuditEntry, Dependency, EdgeSpec, Flow, FlowGraph, OrderingReport, Project, StatusBucket,
    TaskDeletion, TaskNode,
};
use crate::flow::{BatchOp, BatchOptions, BatchOutcome, FlowStore};
use std::collections::{BTreeSet, HashMap, HashSet};

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    /// Authenticated user id; `None` for an anonymous caller.
    pub user_id: Option<String>,
}

impl Actor {
    /// An authenticated user.
    pub fn user(id: impl Into<String>) -> Self {
        Self { user_id: Some(id.into()) }
    }

    /// An unauthenticated caller.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// The user id, or `Unauthorized` for an anonymous actor.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| Error::Unauthorized("no authenticated user".to_string()))
    }
}

/// Decides whether an actor may act on a project.
pub trait AccessGuard: Send + Sync {
    /// Returns `Unauthorized` for an anonymous actor and `Forbidden` for an
    /// actor without access to `project_id`.
    ///
    /// # Errors
    ///
    /// As above.
    fn authorize(&self, actor: &Actor, project_id: &str) -> Result<()>;
}

/// Admits every authenticated actor to every project.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn authorize(&self, actor: &Actor, _project_id: &str) -> Result<()> {
        actor.require_user().map(|_| ())
    }
}

/// Static project membership table.
#[derive(Debug, Clone, Default)]
pub struct MembershipGuard {
    members: HashMap<String, HashSet<String>>,
}

impl MembershipGuard {
    /// An empty table; every authenticated actor is forbidden everywhere.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `user_id` to `project_id`.
    #[must_use]
    pub fn grant(mut self, project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.members.entry(project_id.into()).or_default().insert(user_id.into());
        self
    }
}

impl AccessGuard for MembershipGuard {
    fn authorize(&self, actor: &Actor, project_id: &str) -> Result<()> {
        let user = actor.require_user()?;
        if self.members.get(project_id).is_some_and(|m| m.contains(user)) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{user} is not a member of project {project_id}")))
        }
    }
}

/// A [`FlowStore`] that authorizes one actor before every call.
#[derive(Debug, Clone)]
pub struct GuardedStore<S, G> {
    inner: S,
    guard: G,
    actor: Actor,
}

impl<S: FlowStore, G: AccessGuard> GuardedStore<S, G> {
    /// Wrap `inner`, acting as `actor`.
    pub const fn new(inner: S, guard: G, actor: Actor) -> Self {
        Self { inner, guard, actor }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// The acting caller.
    pub const fn actor(&self) -> &Actor {
        &self.actor
    }

    fn flow_project(&self, flow_id: &str) -> Result<String> {
        let flow =
            self.inner.get_flow(flow_id)?.ok_or_else(|| Error::not_found(Entity::Flow, flow_id))?;
        Ok(flow.project_id)
    }

    fn status_project(&self, status_id: &str) -> Result<String> {
        let status = self
            .inner
            .get_status(status_id)?
            .ok_or_else(|| Error::not_found(Entity::Status, status_id))?;
        Ok(status.project_id)
    }

    fn task_project(&self, task_id: &str) -> Result<String> {
        let task =
            self.inner.get_task(task_id)?.ok_or_else(|| Error::not_found(Entity::Task, task_id))?;
        Ok(task.project_id)
    }

    fn allow(&self, project_id: &str) -> Result<()> {
        self.guard.authorize(&self.actor, project_id)
    }

    fn allow_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.actor.require_user()?;
        let mut projects = BTreeSet::new();
        for op in ops {
            match op {
                BatchOp::CreateEdge { flow_id, .. } | BatchOp::DeleteEdges { flow_id, .. } => {
                    projects.insert(self.flow_project(flow_id)?);
                }
                BatchOp::Reorder { status_id, .. } => {
                    projects.insert(self.status_project(status_id)?);
                }
                BatchOp::MoveTask { from_status_id, to_status_id, .. } => {
                    projects.insert(self.status_project(from_status_id)?);
                    projects.insert(self.status_project(to_status_id)?);
                }
            }
        }
        projects.iter().try_for_each(|p| self.allow(p))
    }
}

impl<S: FlowStore, G: AccessGuard> FlowStore for GuardedStore<S, G> {
    fn create_project(&self, name: &str) -> Result<Project> {
        self.actor.require_user()?;
        self.inner.create_project(name)
    }

    fn create_flow(&self, project_id: &str, name: &str) -> Result<Flow> {
        self.allow(project_id)?;
        self.inner.create_flow(project_id, name)
    }

    fn create_status(&self, project_id: &str, name: &str) -> Result<StatusBucket> {
        self.allow(project_id)?;
        self.inner.create_status(project_id, name)
    }

    fn create_task(&self, status_id: &str, title: &str) -> Result<TaskNode> {
        self.allow(&self.status_project(status_id)?)?;
        self.inner.create_task(status_id, title)
    }

    fn get_flow(&self, id: &str) -> Result<Option<Flow>> {
        let flow = self.inner.get_flow(id)?;
        if let Some(flow) = &flow {
            self.allow(&flow.project_id)?;
        }
        Ok(flow)
    }

    fn get_status(&self, id: &str) -> Result<Option<StatusBucket>> {
        let status = self.inner.get_status(id)?;
        if let Some(status) = &status {
            self.allow(&status.project_id)?;
        }
        Ok(status)
    }

    fn get_task(&self, id: &str) -> Result<Option<TaskNode>> {
        let task = self.inner.get_task(id)?;
        if let Some(task) = &task {
            self.allow(&task.project_id)?;
        }
        Ok(task)
    }

    fn list_statuses(&self, project_id: &str) -> Result<Vec<StatusBucket>> {
        self.allow(project_id)?;
        self.inner.list_statuses(project_id)
    }

    fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskNode>> {
        self.allow(project_id)?;
        self.inner.list_tasks(project_id)
    }

    fn delete_task(&self, id: &str) -> Result<TaskDeletion> {
        self.allow(&self.task_project(id)?)?;
        self.inner.delete_task(id)
    }

    fn list_edges(&self, flow_id: &str) -> Result<Vec<Dependency>> {
        self.allow(&self.flow_project(flow_id)?)?;
        self.inner.list_edges(flow_id)
    }

    fn create_edge(&self, flow_id: &str, spec: EdgeSpec) -> Result<Dependency> {
        self.allow(&self.flow_project(flow_id)?)?;
        self.inner.create_edge(flow_id, spec)
    }

    fn create_edges(&self, flow_id: &str, specs: Vec<EdgeSpec>) -> Result<Vec<Dependency>> {
        self.allow(&self.flow_project(flow_id)?)?;
        self.inner.create_edges(flow_id, specs)
    }

    fn delete_edges(&self, flow_id: &str, edge_ids: &[String]) -> Result<usize> {
        self.allow(&self.flow_project(flow_id)?)?;
        self.inner.delete_edges(flow_id, edge_ids)
    }

    fn list_ordered(&self, status_id: &str) -> Result<Vec<String>> {
        self.allow(&self.status_project(status_id)?)?;
        self.inner.list_ordered(status_id)
    }

    fn reorder(&self, status_id: &str, task_ids: &[String]) -> Result<Vec<TaskNode>> {
        self.allow(&self.status_project(status_id)?)?;
        self.inner.reorder(status_id, task_ids)
    }

    fn move_task(
        &self,
        task_id: &str,
        from_status_id: &str,
        to_status_id: &str,
        target_position: Option<usize>,
    ) -> Result<TaskNode> {
        self.allow(&self.status_project(from_status_id)?)?;
        self.allow(&self.status_project(to_status_id)?)?;
        self.inner.move_task(task_id, from_status_id, to_status_id, target_position)
    }

    fn check_ordering(&self, status_id: &str) -> Result<OrderingReport> {
        self.allow(&self.status_project(status_id)?)?;
        self.inner.check_ordering(status_id)
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchOutcome>> {
        self.allow_batch(&ops)?;
        self.inner.apply_batch(ops)
    }

    fn apply_batch_with(
        &self,
        ops: Vec<BatchOp>,
        options: &BatchOptions,
    ) -> Result<Vec<BatchOutcome>> {
        self.allow_batch(&ops)?;
        self.inner.apply_batch_with(ops, options)
    }

    fn project(&self, flow_id: &str) -> Result<FlowGraph> {
        self.allow(&self.flow_project(flow_id)?)?;
        self.inner.project(flow_id)
    }

    fn get_audit_log(
        &self,
        subject: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        self.actor.require_user()?;
        self.inner.get_audit_log(subject, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flow::SqliteFlowStore;
    use tempfile::TempDir;

    struct Setup {
        _dir: TempDir,
        raw: SqliteFlowStore,
        project: Project,
        flow: Flow,
        todo: StatusBucket,
    }

    fn setup() -> Setup {
        let dir = TempDir::new().unwrap();
        let raw = SqliteFlowStore::new(dir.path().join("test.db")).unwrap();
        let project = raw.create_project("Team").unwrap();
        let flow = raw.create_flow(&project.id, "F").unwrap();
        let todo = raw.create_status(&project.id, "To Do").unwrap();
        Setup { _dir: dir, raw, project, flow, todo }
    }

    #[test]
    fn test_anonymous_is_unauthorized() {
        let s = setup();
        let store = GuardedStore::new(s.raw.clone(), AllowAll, Actor::anonymous());
        let err = store.list_edges(&s.flow.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(store.create_project("X").unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_membership_is_enforced() {
        let s = setup();
        let guard = MembershipGuard::new().grant(&s.project.id, "alice");

        let alice = GuardedStore::new(s.raw.clone(), guard.clone(), Actor::user("alice"));
        let task = alice.create_task(&s.todo.id, "Mine").unwrap();
        assert_eq!(alice.list_ordered(&s.todo.id).unwrap(), vec![task.id.clone()]);

        let mallory = GuardedStore::new(s.raw.clone(), guard, Actor::user("mallory"));
        let err = mallory.reorder(&s.todo.id, &[task.id.clone()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(mallory.get_task(&task.id).unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(mallory.delete_task(&task.id).unwrap_err().kind(), ErrorKind::Forbidden);
        assert!(s.raw.get_task(&task.id).unwrap().is_some());
    }

    #[test]
    fn test_batch_checks_every_project() {
        let s = setup();
        let other = s.raw.create_project("Other").unwrap();
        let foreign = s.raw.create_status(&other.id, "Backlog").unwrap();
        let guard = MembershipGuard::new().grant(&s.project.id, "alice");
        let alice = GuardedStore::new(s.raw.clone(), guard, Actor::user("alice"));

        let ops = vec![
            BatchOp::DeleteEdges { flow_id: s.flow.id.clone(), edge_ids: vec![] },
            BatchOp::Reorder { status_id: foreign.id.clone(), task_ids: vec![] },
        ];
        assert_eq!(alice.apply_batch(ops).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_unknown_ids_are_not_found_before_authorization() {
        let s = setup();
        let store = GuardedStore::new(s.raw.clone(), MembershipGuard::new(), Actor::user("bob"));
        assert_eq!(store.list_edges("ghost").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(store.get_flow("ghost").unwrap().is_none());
    }
}
