//! The capability contract every backend must satisfy.
//!
//! The sync engine is written only against [`DocumentStore`] and
//! [`Subscription`], so the embedded SQLite [`crate::Database`] can be
//! swapped for any managed document database offering the same primitives.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::document::{DocRef, Document, Patch};
use crate::error::Result;
use crate::query::{Filter, Query, Snapshot};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read.
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>>;

    /// Create a document with a caller-chosen id. Fails with
    /// `AlreadyExists` if the id is taken.
    async fn create(&self, doc: &DocRef, patch: Patch) -> Result<()>;

    /// Create a document with a store-assigned id and return that id.
    async fn add(&self, collection: &str, patch: Patch) -> Result<String>;

    /// Partial update. Fails with `NotFound` if the document is missing.
    async fn update(&self, doc: &DocRef, patch: Patch) -> Result<()>;

    /// One-shot query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Live query. The first snapshot reflects the current state; later
    /// ones follow every change to the result. Dropping the subscription
    /// cancels it.
    fn subscribe(&self, query: Query) -> Result<Subscription>;

    /// Live view of a single document (zero or one row per snapshot).
    fn subscribe_doc(&self, doc: &DocRef) -> Result<Subscription> {
        self.subscribe(Query::collection(doc.collection.clone()).filter(Filter::IdEq(doc.id.clone())))
    }
}

/// Producer half of a [`Subscription`], held by the backend.
pub type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot>>;

/// Cancellable stream of ordered snapshots.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<Snapshot>>,
}

impl Subscription {
    /// A connected sender / subscription pair.
    pub fn channel() -> (SnapshotSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next snapshot. `None` once the backend has gone away.
    pub async fn next(&mut self) -> Option<Result<Snapshot>> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<Result<Snapshot>> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving. Queued snapshots are discarded.
    pub fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Stream for Subscription {
    type Item = Result<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A [`Subscription`] whose snapshots are decoded into model values.
pub struct Live<T> {
    inner: Subscription,
    decode: fn(Snapshot) -> Result<T>,
}

impl<T> Live<T> {
    pub fn new(inner: Subscription, decode: fn(Snapshot) -> Result<T>) -> Self {
        Self { inner, decode }
    }

    pub async fn next(&mut self) -> Option<Result<T>> {
        let snapshot = self.inner.next().await?;
        Some(snapshot.and_then(self.decode))
    }

    pub fn try_next(&mut self) -> Option<Result<T>> {
        let snapshot = self.inner.try_next()?;
        Some(snapshot.and_then(self.decode))
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
