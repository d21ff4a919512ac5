//! Session store contract and the in-memory implementation.
//!
//! The store is backend-agnostic; the orchestrator is the single writer
//! per session and rewrites the context in its terminal path.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use boardgen_core::SessionContext;

use crate::error::Result;

/// Keyed session-context store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SessionContext>>;
    async fn put(&self, ctx: SessionContext) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<String, SessionContext>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<SessionContext>> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn put(&self, ctx: SessionContext) -> Result<()> {
        self.inner.write().await.insert(ctx.id.clone(), ctx);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.inner.write().await.clear();
        Ok(())
    }
}
