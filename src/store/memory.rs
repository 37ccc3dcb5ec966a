//! In-memory `AdminStore` for dispatcher tests
//!
//! No foreign keys are enforced, so it also shows what happens to dependent
//! rows on a store without constraints. Failures and stalls can be injected.

use crate::store::{AdminStore, ProjectId, ProjectSummary, ProjectTable, StoreError};
use futures::{stream, stream::BoxStream, StreamExt};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

#[derive(Debug, Default)]
struct UserRow {
    is_manager: bool,
    password_hash: String,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, UserRow>,
    projects: BTreeMap<i32, String>,
    owns: BTreeMap<i32, String>,
    views: Vec<(i32, String)>,
    fail_table: Option<ProjectTable>,
    fail_all: bool,
    fail_listing_after: Option<usize>,
    stall: Option<Duration>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// alice owns 1 "Alpha", bob owns 2 "Beta", bob views 1
    pub(crate) fn seeded() -> Self {
        let store = Self::default();
        store.add_user("alice");
        store.add_user("bob");
        {
            let mut state = store.lock();
            state.projects.insert(1, "Alpha".into());
            state.projects.insert(2, "Beta".into());
            state.owns.insert(1, "alice".into());
            state.owns.insert(2, "bob".into());
            state.views.push((1, "bob".into()));
        }
        store
    }

    pub(crate) fn add_user(&self, name: &str) {
        self.lock().users.insert(name.to_string(), UserRow::default());
    }

    pub(crate) fn viewers(&self, pid: ProjectId) -> Vec<String> {
        self.lock()
            .views
            .iter()
            .filter(|(p, _)| *p == pid.get())
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub(crate) fn fail_on(&self, table: ProjectTable) {
        self.lock().fail_table = Some(table);
    }

    pub(crate) fn fail_all(&self) {
        self.lock().fail_all = true;
    }

    pub(crate) fn fail_listing_after(&self, rows: usize) {
        self.lock().fail_listing_after = Some(rows);
    }

    pub(crate) fn stall(&self, delay: Duration) {
        self.lock().stall = Some(delay);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Apply injected stalls and failures before touching any row
    async fn enter(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let (stall, fail_all) = {
            let state = self.lock();
            (state.stall, state.fail_all)
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if fail_all {
            return Err(StoreError::Injected("injected failure".into()));
        }
        Ok(self.lock())
    }

    fn listing<T: Send + 'static>(&self, rows: Vec<T>) -> BoxStream<'_, Result<T, StoreError>> {
        let limit = self.lock().fail_listing_after;
        let mut items: Vec<Result<T, StoreError>> = rows.into_iter().map(Ok).collect();
        if let Some(limit) = limit {
            items.truncate(limit);
            items.push(Err(StoreError::Injected("row could not be decoded".into())));
        }
        stream::iter(items).boxed()
    }
}

impl AdminStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.enter().await.map(drop)
    }

    async fn set_is_manager(&self, user: &str, is_manager: bool) -> Result<u64, StoreError> {
        let mut state = self.enter().await?;
        Ok(match state.users.get_mut(user) {
            Some(row) => {
                row.is_manager = is_manager;
                1
            }
            None => 0,
        })
    }

    async fn is_manager(&self, user: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.enter().await?.users.get(user).map(|row| row.is_manager))
    }

    async fn set_password_hash(&self, user: &str, hash: &str) -> Result<u64, StoreError> {
        let mut state = self.enter().await?;
        Ok(match state.users.get_mut(user) {
            Some(row) => {
                row.password_hash = hash.to_string();
                1
            }
            None => 0,
        })
    }

    async fn password_hash(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .enter()
            .await?
            .users
            .get(user)
            .map(|row| row.password_hash.clone()))
    }

    async fn set_owner(&self, pid: ProjectId, user: &str) -> Result<u64, StoreError> {
        let mut state = self.enter().await?;
        Ok(match state.owns.get_mut(&pid.get()) {
            Some(owner) => {
                *owner = user.to_string();
                1
            }
            None => 0,
        })
    }

    async fn owner(&self, pid: ProjectId) -> Result<Option<String>, StoreError> {
        Ok(self.enter().await?.owns.get(&pid.get()).cloned())
    }

    fn user_names(&self) -> BoxStream<'_, Result<String, StoreError>> {
        let names = self.lock().users.keys().cloned().collect();
        self.listing(names)
    }

    fn projects(&self) -> BoxStream<'_, Result<ProjectSummary, StoreError>> {
        let projects = self
            .lock()
            .projects
            .iter()
            .map(|(id, name)| ProjectSummary { id: *id, name: name.clone() })
            .collect();
        self.listing(projects)
    }

    fn owned_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<ProjectSummary, StoreError>> {
        let projects = {
            let state = self.lock();
            state
                .owns
                .iter()
                .filter(|(_, owner)| owner.as_str() == user)
                .filter_map(|(id, _)| {
                    state
                        .projects
                        .get(id)
                        .map(|name| ProjectSummary { id: *id, name: name.clone() })
                })
                .collect()
        };
        self.listing(projects)
    }

    async fn delete_user(&self, user: &str) -> Result<u64, StoreError> {
        let mut state = self.enter().await?;
        Ok(state.users.remove(user).map_or(0, |_| 1))
    }

    async fn delete_project_rows(
        &self,
        table: ProjectTable,
        pid: ProjectId,
    ) -> Result<u64, StoreError> {
        let mut state = self.enter().await?;
        if state.fail_table == Some(table) {
            return Err(StoreError::Injected(format!("cannot delete from {}", table)));
        }
        let id = pid.get();
        let removed = match table {
            ProjectTable::Views => {
                let before = state.views.len();
                state.views.retain(|(p, _)| *p != id);
                before - state.views.len()
            }
            ProjectTable::Owns => state.owns.remove(&id).map_or(0, |_| 1),
            ProjectTable::Projects => state.projects.remove(&id).map_or(0, |_| 1),
        };
        Ok(removed as u64)
    }
}
