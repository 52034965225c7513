#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use duet_shared::identity::{AuthUser, LocalIdentity};
use duet_shared::{ChatId, MessageId, UserId};
use duet_store::{
    Database, DocRef, Document, DocumentStore, FsBlobStore, Patch, Query, SnapshotSender,
    StoreError, Subscription,
};
use duet_sync::{Client, Notice, NoticeSink, SummaryRepair, SyncConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Add,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Users,
    Chats,
    Messages,
}

impl Target {
    fn matches(self, collection: &str) -> bool {
        match self {
            Target::Users => collection == "users",
            Target::Chats => collection == "chats",
            Target::Messages => collection.starts_with("chats/") && collection.ends_with("/messages"),
        }
    }
}

struct Fault {
    op: Op,
    target: Target,
    remaining: usize,
}

/// SQLite store with injectable write failures and subscription errors.
pub struct FaultyStore {
    inner: Database,
    faults: Mutex<Vec<Fault>>,
    taps: Mutex<Vec<(String, SnapshotSender)>>,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: Database::open_in_memory().unwrap(),
            faults: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `times` matching writes with `Unavailable`.
    pub fn fail(&self, op: Op, target: Target, times: usize) {
        self.faults.lock().unwrap().push(Fault {
            op,
            target,
            remaining: times,
        });
    }

    /// Push an error into every live query on a matching collection.
    pub fn break_subscriptions(&self, target: Target) {
        for (collection, tx) in self.taps.lock().unwrap().iter() {
            if target.matches(collection) {
                let _ = tx.send(Err(StoreError::PermissionDenied(collection.clone())));
            }
        }
    }

    /// Write attempts seen so far, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn watchers(&self) -> usize {
        self.inner.watcher_count().unwrap()
    }

    fn check(&self, op: Op, collection: &str) -> duet_store::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.lock().unwrap();
        if let Some(fault) = faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0 && f.target.matches(collection))
        {
            fault.remaining -= 1;
            return Err(StoreError::Unavailable(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, doc: &DocRef) -> duet_store::Result<Option<Document>> {
        self.inner.get(doc).await
    }

    async fn create(&self, doc: &DocRef, patch: Patch) -> duet_store::Result<()> {
        self.check(Op::Create, &doc.collection)?;
        self.inner.create(doc, patch).await
    }

    async fn add(&self, collection: &str, patch: Patch) -> duet_store::Result<String> {
        self.check(Op::Add, collection)?;
        self.inner.add(collection, patch).await
    }

    async fn update(&self, doc: &DocRef, patch: Patch) -> duet_store::Result<()> {
        self.check(Op::Update, &doc.collection)?;
        self.inner.update(doc, patch).await
    }

    async fn query(&self, query: &Query) -> duet_store::Result<Vec<Document>> {
        self.inner.query(query).await
    }

    fn subscribe(&self, query: Query) -> duet_store::Result<Subscription> {
        let (tx, subscription) = Subscription::channel();
        let collection = query.collection.clone();
        self.inner.attach(query, tx.clone())?;
        self.taps.lock().unwrap().push((collection, tx));
        Ok(subscription)
    }
}

/// Records every stale-summary report.
#[derive(Default)]
pub struct RecordingRepair {
    pub calls: Mutex<Vec<(ChatId, MessageId)>>,
}

impl SummaryRepair for RecordingRepair {
    fn summary_stale(&self, chat: &ChatId, message: &MessageId, _error: &StoreError) {
        self.calls.lock().unwrap().push((chat.clone(), message.clone()));
    }
}

pub struct User {
    pub client: Client,
    pub identity: Arc<LocalIdentity>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub uid: UserId,
}

impl User {
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

pub struct World {
    pub store: Arc<FaultyStore>,
    pub ada: User,
    pub bea: User,
    pub repair: Arc<RecordingRepair>,
    _blobs: TempDir,
}

pub fn auth_user(uid: &str, name: &str) -> AuthUser {
    AuthUser {
        uid: UserId::new(uid),
        display_name: name.into(),
        email: format!("{}@duet.test", name.to_lowercase()),
        photo_url: String::new(),
    }
}

async fn user(
    store: &Arc<FaultyStore>,
    blobs: &Arc<FsBlobStore>,
    repair: &Arc<RecordingRepair>,
    config: &SyncConfig,
    auth: AuthUser,
) -> User {
    let identity = Arc::new(LocalIdentity::signed_in(auth.clone()));
    let (sink, notices) = NoticeSink::channel();
    let client = Client::new(config.clone(), store.clone(), identity.clone(), blobs.clone())
        .unwrap()
        .with_notices(sink)
        .with_repair(repair.clone());
    client.register_profile(&auth).await.unwrap();
    User {
        client,
        identity,
        notices,
        uid: auth.uid,
    }
}

/// Two registered users, Ada (`u1`) and Bea (`u2`), sharing one store.
pub async fn world() -> World {
    world_with(SyncConfig::default()).await
}

pub async fn world_with(config: SyncConfig) -> World {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FaultyStore::new());
    let blobs = Arc::new(
        FsBlobStore::new(dir.path().to_path_buf(), None, FsBlobStore::DEFAULT_MAX_SIZE)
            .await
            .unwrap(),
    );
    let repair = Arc::new(RecordingRepair::default());

    let ada = user(&store, &blobs, &repair, &config, auth_user("u1", "Ada")).await;
    let bea = user(&store, &blobs, &repair, &config, auth_user("u2", "Bea")).await;

    World {
        store,
        ada,
        bea,
        repair,
        _blobs: dir,
    }
}

pub fn chat_id() -> ChatId {
    ChatId("u1_u2".into())
}
