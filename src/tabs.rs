//! Tab host: owns the browse sessions of one window.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::catalog::RelationRef;
use crate::config::BrowseSettings;
use crate::error::{AppError, AppResult};
use crate::remote::{ConnectionId, RemoteStore, SortSpec};
use crate::session::BrowseSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    fn new() -> Self { TabId(Uuid::new_v4()) }
}

impl Display for TabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Page(u64),
    NextPage,
    PreviousPage,
    PageSize(u64),
    Sort(Option<SortSpec>),
    Relation(RelationRef),
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabInfo {
    pub id: TabId,
    pub relation: RelationRef,
    pub pending_count: usize,
}

pub struct TabHost {
    store: Arc<dyn RemoteStore>,
    settings: BrowseSettings,
    tabs: RwLock<HashMap<TabId, BrowseSession>>,
    /// Tab ids in opening order
    order: RwLock<Vec<TabId>>,
}

impl TabHost {
    pub fn new(store: Arc<dyn RemoteStore>, settings: BrowseSettings) -> Self {
        Self { store, settings, tabs: RwLock::new(HashMap::new()), order: RwLock::new(Vec::new()) }
    }

    pub fn settings(&self) -> &BrowseSettings { &self.settings }

    /// Open `relation` (bare names resolve against the default schema) in a new tab.
    pub async fn open_tab(&self, conn: ConnectionId, relation: &str) -> AppResult<TabId> {
        let relation = RelationRef::parse(relation, &self.settings.default_schema);
        let session = BrowseSession::open(self.store.clone(), conn, relation.clone(), self.settings.page_size).await?;
        let id = TabId::new();
        self.tabs.write().insert(id, session);
        self.order.write().push(id);
        info!(target: "pgbrowse::session", "tab {} opened on {}", id, relation);
        Ok(id)
    }

    /// Drop a tab and everything it holds, pending edits included.
    pub fn close_tab(&self, id: TabId) -> AppResult<()> {
        let removed = self.tabs.write().remove(&id);
        match removed {
            Some(session) => {
                self.order.write().retain(|t| *t != id);
                let pending = session.pending_count();
                info!(target: "pgbrowse::session", "tab {} closed ({} pending edit(s) dropped)", id, pending);
                Ok(())
            }
            None => Err(Self::no_tab(id)),
        }
    }

    pub fn session(&self, id: TabId) -> AppResult<BrowseSession> {
        self.tabs.read().get(&id).cloned().ok_or_else(|| Self::no_tab(id))
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        let tabs = self.tabs.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| {
                tabs.get(id).map(|s| TabInfo { id: *id, relation: s.relation(), pending_count: s.pending_count() })
            })
            .collect()
    }

    pub async fn navigate(&self, id: TabId, nav: Navigation) -> AppResult<()> {
        let session = self.session(id)?;
        match nav {
            Navigation::Page(p) => session.set_page(p).await,
            Navigation::NextPage => {
                let next = session.page() + 1;
                if session.page_count() > 0 && next > session.page_count() {
                    return Ok(());
                }
                session.set_page(next).await
            }
            Navigation::PreviousPage => match session.page() {
                0 | 1 => Ok(()),
                p => session.set_page(p - 1).await,
            },
            Navigation::PageSize(n) => session.set_page_size(n).await,
            Navigation::Sort(sort) => session.set_sort(sort).await,
            Navigation::Relation(relation) => session.set_relation(relation).await,
            Navigation::Refresh => session.refresh().await,
        }
    }

    fn no_tab(id: TabId) -> AppError { AppError::not_found("no_tab", format!("tab {} is not open", id)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;

    fn host() -> (TabHost, ConnectionId) {
        let store = Arc::new(MemoryStore::demo());
        let conn = store.connection();
        let settings = BrowseSettings { page_size: 2, ..BrowseSettings::default() };
        (TabHost::new(store, settings), conn)
    }

    #[tokio::test]
    async fn tabs_are_independent() {
        let (host, conn) = host();
        let a = host.open_tab(conn.clone(), "users").await.unwrap();
        let b = host.open_tab(conn, "public.users").await.unwrap();
        host.session(a).unwrap().record_edit(0, "name", "Zoe").unwrap();
        assert_eq!(host.session(a).unwrap().pending_count(), 1);
        assert_eq!(host.session(b).unwrap().pending_count(), 0);
        assert_eq!(host.tabs().len(), 2);
        let shown = format!("{:?}", host.session(b).unwrap());
        assert!(shown.contains("users") && shown.contains("pending: 0"), "{}", shown);
        host.close_tab(a).unwrap();
        assert_eq!(host.session(a).unwrap_err().code_str(), "no_tab");
        assert_eq!(host.close_tab(a).unwrap_err().code_str(), "no_tab");
    }

    #[tokio::test]
    async fn navigation_clamps_at_the_ends() {
        let (host, conn) = host();
        let id = host.open_tab(conn, "users").await.unwrap();
        host.navigate(id, Navigation::PreviousPage).await.unwrap();
        assert_eq!(host.session(id).unwrap().page(), 1);
        host.navigate(id, Navigation::Page(3)).await.unwrap();
        host.navigate(id, Navigation::NextPage).await.unwrap();
        assert_eq!(host.session(id).unwrap().page(), 3);
        host.navigate(id, Navigation::PreviousPage).await.unwrap();
        assert_eq!(host.session(id).unwrap().page(), 2);
    }

    #[tokio::test]
    async fn unknown_relation_does_not_open_a_tab() {
        let (host, conn) = host();
        let err = host.open_tab(conn, "nope").await.unwrap_err();
        assert_eq!(err.code_str(), "remote_error");
        assert!(host.tabs().is_empty());
    }
}
