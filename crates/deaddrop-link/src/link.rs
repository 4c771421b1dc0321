//! Link lifecycle state machine and action worker.
//!
//! A link is one dead-drop channel between two peers. All storage traffic
//! for a link funnels through a single worker task consuming a bounded
//! action queue, so fetches and posts never interleave and the window
//! rotation stays consistent. Callers interact only through the
//! non-blocking queueing operations; results come back through the
//! [`TransportEvents`] callbacks.
//!
//! Shutdown is cooperative: the in-flight action finishes, the worker
//! exits, currently-puttable grants are released synchronously, and a
//! detached task releases the gettable grants and deletes the buckets
//! after a delay that lets requests already in flight at the remote peer
//! complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deaddrop_storage::{ObjectGateway, PermissionLedger, StorageError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::address::LinkAddress;
use crate::chain::next_object_id;
use crate::error::{LinkError, LinkResult};
use crate::events::{ContentDescriptor, Handle, PackageStatus, TransportEvents};
use crate::properties::LinkProperties;
use crate::window::ObjectWindows;

/// Caller-assigned id of a scheduled action, keying its enqueued content.
pub type ActionId = u64;

/// Pending actions a link will hold before rejecting submissions.
pub const ACTION_QUEUE_CAPACITY: usize = 10;

/// Default delay before the post-shutdown cleanup revokes gettable grants
/// and deletes the buckets.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(60);

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Accepting actions.
    Running,
    /// Shutdown requested; in-flight work draining.
    ShuttingDown,
    /// Worker joined and grants released.
    Stopped,
}

/// Behavior variant of a link, fixed at construction.
#[derive(Clone)]
pub enum LinkRole {
    /// Anonymous peer: plain get/put against currently-granted object ids.
    PublicUser,
    /// Bucket owner: additionally rotates the grant windows.
    AccountHolder(AccountHolderRole),
}

/// The account-holder side of a link: ledger handle, grant windows, and
/// whether the link is receive-only.
#[derive(Clone)]
pub struct AccountHolderRole {
    ledger: Arc<PermissionLedger>,
    windows: Arc<AsyncMutex<ObjectWindows>>,
    single_receive: bool,
}

#[derive(Debug)]
enum QueuedAction {
    Fetch {
        #[allow(dead_code)]
        handles: Vec<Handle>,
    },
    Post {
        handles: Vec<Handle>,
        action_id: ActionId,
    },
}

/// One dead-drop link.
pub struct Link {
    id: String,
    address: LinkAddress,
    properties: LinkProperties,
    role: LinkRole,
    events: Arc<dyn TransportEvents>,
    content: Arc<Mutex<HashMap<ActionId, Vec<u8>>>>,
    action_tx: mpsc::Sender<QueuedAction>,
    shutdown_tx: watch::Sender<bool>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    state: Mutex<LinkState>,
    cleanup_delay: Duration,
}

impl Link {
    /// Open a public-user link: no bucket ownership, no windows, raw
    /// anonymous object traffic through `gateway`.
    pub async fn open_public_user(
        link_id: impl Into<String>,
        advertised: LinkAddress,
        is_creator: bool,
        gateway: Arc<dyn ObjectGateway>,
        events: Arc<dyn TransportEvents>,
    ) -> LinkResult<Arc<Self>> {
        Self::open(
            link_id.into(),
            advertised,
            is_creator,
            LinkRole::PublicUser,
            gateway,
            events,
            DEFAULT_CLEANUP_DELAY,
        )
        .await
    }

    /// Open an account-holder link: creates the bucket(s), installs the
    /// owner's standing grants, primes the puttable window, and starts
    /// the worker. `single_receive` disables the outbound side and window
    /// rotation entirely.
    pub async fn open_account_holder(
        link_id: impl Into<String>,
        advertised: LinkAddress,
        is_creator: bool,
        single_receive: bool,
        cleanup_delay: Duration,
        ledger: Arc<PermissionLedger>,
        events: Arc<dyn TransportEvents>,
    ) -> LinkResult<Arc<Self>> {
        let gateway = ledger.gateway().clone();
        let role = LinkRole::AccountHolder(AccountHolderRole {
            ledger,
            windows: Arc::new(AsyncMutex::new(ObjectWindows::new())),
            single_receive,
        });
        Self::open(
            link_id.into(),
            advertised,
            is_creator,
            role,
            gateway,
            events,
            cleanup_delay,
        )
        .await
    }

    async fn open(
        link_id: String,
        advertised: LinkAddress,
        is_creator: bool,
        role: LinkRole,
        gateway: Arc<dyn ObjectGateway>,
        events: Arc<dyn TransportEvents>,
        cleanup_delay: Duration,
    ) -> LinkResult<Arc<Self>> {
        advertised.validate()?;

        let properties = LinkProperties {
            link_address: Some(advertised.to_json()),
            ..LinkProperties::default()
        };

        // The advertised address describes the loader's view; the creator
        // fetches what the loader posts and vice versa.
        let address = if is_creator {
            debug!(link_id = %link_id, "creator side, flipping address");
            advertised.flipped()
        } else {
            advertised
        };

        if let LinkRole::AccountHolder(account) = &role {
            let ledger = &account.ledger;
            ledger
                .gateway()
                .create_bucket(&address.fetch_bucket, &address.region)
                .await?;
            if !address.single_bucket() {
                ledger
                    .gateway()
                    .create_bucket(&address.post_bucket, &address.region)
                    .await?;
            }
            let mut windows = account.windows.lock().await;
            if account.single_receive {
                ledger
                    .grant_owner_defaults(&address.fetch_bucket, None)
                    .await?;
                windows.prime_single(ledger, &address).await?;
            } else {
                ledger
                    .grant_owner_defaults(&address.fetch_bucket, Some(address.post_bucket.as_str()))
                    .await?;
                windows.prime(ledger, &address).await?;
            }
        }

        let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let content = Arc::new(Mutex::new(HashMap::new()));

        let worker = Worker {
            link_id: link_id.clone(),
            role: role.clone(),
            address: address.clone(),
            gateway,
            events: events.clone(),
            content: content.clone(),
        };
        let handle = tokio::spawn(worker.run(action_rx, shutdown_rx));
        info!(link_id = %link_id, "link started");

        Ok(Arc::new(Self {
            id: link_id,
            address,
            properties,
            role,
            events,
            content,
            action_tx,
            shutdown_tx,
            worker: AsyncMutex::new(Some(handle)),
            state: Mutex::new(LinkState::Running),
            cleanup_delay,
        }))
    }

    /// The link's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Advertised properties, including the external address.
    pub fn properties(&self) -> &LinkProperties {
        &self.properties
    }

    /// The link's internal (creator-flipped) address.
    pub fn address(&self) -> &LinkAddress {
        &self.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Whether this link is receive-only.
    pub fn is_single_receive(&self) -> bool {
        matches!(
            &self.role,
            LinkRole::AccountHolder(account) if account.single_receive
        )
    }

    /// Current puttable window contents (empty for public-user links).
    pub async fn puttable_window(&self) -> Vec<String> {
        match &self.role {
            LinkRole::AccountHolder(account) => account.windows.lock().await.puttable_snapshot(),
            LinkRole::PublicUser => Vec::new(),
        }
    }

    /// Current gettable window contents (empty for public-user links).
    pub async fn gettable_window(&self) -> Vec<String> {
        match &self.role {
            LinkRole::AccountHolder(account) => account.windows.lock().await.gettable_snapshot(),
            LinkRole::PublicUser => Vec::new(),
        }
    }

    fn ensure_running(&self) -> LinkResult<()> {
        if *self.state.lock() == LinkState::Running {
            Ok(())
        } else {
            Err(LinkError::LinkShutdown {
                link_id: self.id.clone(),
            })
        }
    }

    /// Stage content for a later post action. Last write wins per action
    /// id; the map is unbounded and relies on the caller dequeuing.
    pub fn enqueue_content(&self, action_id: ActionId, content: Vec<u8>) -> LinkResult<()> {
        self.ensure_running()?;
        debug!(link_id = %self.id, action_id, bytes = content.len(), "content enqueued");
        self.content.lock().insert(action_id, content);
        Ok(())
    }

    /// Discard staged content for an action id. No-op if absent.
    pub fn dequeue_content(&self, action_id: ActionId) -> LinkResult<()> {
        self.content.lock().remove(&action_id);
        Ok(())
    }

    /// Queue a fetch action. Never blocks; a full queue rejects with
    /// [`LinkError::QueueFull`].
    pub fn fetch(&self, handles: Vec<Handle>) -> LinkResult<()> {
        self.ensure_running()?;
        self.submit(QueuedAction::Fetch { handles })
    }

    /// Queue a post action for previously enqueued content. A post with no
    /// staged content is a caller-contract violation and resolves to an
    /// immediate `FailedGeneric` report without queueing anything.
    pub fn post(&self, handles: Vec<Handle>, action_id: ActionId) -> LinkResult<()> {
        self.ensure_running()?;

        if self.action_tx.capacity() == 0 {
            error!(link_id = %self.id, "action queue full");
            return Err(LinkError::QueueFull {
                link_id: self.id.clone(),
            });
        }

        if !self.content.lock().contains_key(&action_id) {
            warn!(link_id = %self.id, action_id, "post without enqueued content");
            for &handle in &handles {
                self.events
                    .on_package_status_changed(handle, PackageStatus::FailedGeneric);
            }
            return Ok(());
        }

        self.submit(QueuedAction::Post { handles, action_id })
    }

    fn submit(&self, action: QueuedAction) -> LinkResult<()> {
        self.action_tx.try_send(action).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                error!(link_id = %self.id, "action queue full");
                LinkError::QueueFull {
                    link_id: self.id.clone(),
                }
            }
            mpsc::error::TrySendError::Closed(_) => LinkError::LinkShutdown {
                link_id: self.id.clone(),
            },
        })
    }

    /// Shut the link down. Waits for the in-flight action, releases every
    /// currently-puttable grant, and schedules the delayed best-effort
    /// cleanup of gettable grants and buckets. Idempotent: the second call
    /// returns immediately.
    pub async fn shutdown(&self) {
        let handle = { self.worker.lock().await.take() };
        let Some(handle) = handle else {
            debug!(link_id = %self.id, "shutdown already performed");
            return;
        };

        info!(link_id = %self.id, "shutting down link");
        *self.state.lock() = LinkState::ShuttingDown;
        let _ = self.shutdown_tx.send(true);
        let _ = handle.await;

        if let LinkRole::AccountHolder(account) = &self.role {
            let puttable = account.windows.lock().await.puttable_snapshot();
            for key in puttable {
                if let Err(e) = account
                    .ledger
                    .make_unputtable(
                        &key,
                        &self.address.fetch_bucket,
                        &self.address.initial_fetch_obj_uuid,
                    )
                    .await
                {
                    warn!(link_id = %self.id, key = %key, error = %e,
                        "failed to release puttable grant at shutdown");
                }
            }

            let gettable = account.windows.lock().await.gettable_snapshot();
            let ledger = account.ledger.clone();
            let address = self.address.clone();
            let delay = self.cleanup_delay;
            let link_id = self.id.clone();
            tokio::spawn(async move {
                // Give requests already in flight at the remote peer time
                // to finish before their access disappears.
                tokio::time::sleep(delay).await;
                for key in gettable {
                    if let Err(e) = ledger
                        .make_ungettable(&key, &address.post_bucket, &address.initial_post_obj_uuid)
                        .await
                    {
                        warn!(link_id = %link_id, key = %key, error = %e,
                            "failed to release gettable grant during cleanup");
                    }
                }
                let gateway = ledger.gateway();
                if let Err(e) = gateway
                    .delete_bucket(&address.fetch_bucket, &address.region)
                    .await
                {
                    warn!(link_id = %link_id, error = %e, "failed to delete fetch bucket");
                }
                if !address.single_bucket() {
                    if let Err(e) = gateway
                        .delete_bucket(&address.post_bucket, &address.region)
                        .await
                    {
                        warn!(link_id = %link_id, error = %e, "failed to delete post bucket");
                    }
                }
                debug!(link_id = %link_id, "deferred cleanup complete");
            });
        }

        *self.state.lock() = LinkState::Stopped;
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // Best effort: stop the worker. Grant release requires shutdown().
        let _ = self.shutdown_tx.send(true);
    }
}

struct Worker {
    link_id: String,
    role: LinkRole,
    address: LinkAddress,
    gateway: Arc<dyn ObjectGateway>,
    events: Arc<dyn TransportEvents>,
    content: Arc<Mutex<HashMap<ActionId, Vec<u8>>>>,
}

impl Worker {
    async fn run(
        self,
        mut actions: mpsc::Receiver<QueuedAction>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut fetch_obj = self.address.initial_fetch_obj_uuid.clone();
        let mut post_obj = self.address.initial_post_obj_uuid.clone();
        debug!(link_id = %self.link_id, "link worker started");

        loop {
            let action = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                action = actions.recv() => match action {
                    Some(action) => action,
                    None => break,
                },
            };

            match action {
                QueuedAction::Fetch { .. } => {
                    fetch_obj = self.fetch_on_worker(&fetch_obj).await;
                }
                QueuedAction::Post { handles, action_id } => {
                    post_obj = self.post_on_worker(&post_obj, &handles, action_id).await;
                }
            }
        }

        debug!(link_id = %self.link_id, "link worker stopped");
    }

    async fn fetch_on_worker(&self, fetch_obj: &str) -> String {
        match &self.role {
            LinkRole::PublicUser => self.fetch_public(fetch_obj).await,
            LinkRole::AccountHolder(account) if account.single_receive => {
                self.fetch_single_receive(account, fetch_obj).await
            }
            LinkRole::AccountHolder(account) => self.fetch_full_duplex(account, fetch_obj).await,
        }
    }

    async fn fetch_public(&self, fetch_obj: &str) -> String {
        match self
            .gateway
            .get_object(&self.address.fetch_bucket, fetch_obj)
            .await
        {
            Ok(data) => {
                info!(link_id = %self.link_id, bytes = data.len(), "fetched object");
                let next = next_object_id(fetch_obj);
                self.deliver(&data);
                next
            }
            Err(StorageError::ObjectNotFound { .. }) => {
                debug!(link_id = %self.link_id, key = %fetch_obj,
                    "nothing posted yet, will retry on next fetch");
                fetch_obj.to_string()
            }
            Err(e) => {
                warn!(link_id = %self.link_id, error = %e, "fetch failed");
                fetch_obj.to_string()
            }
        }
    }

    async fn fetch_full_duplex(&self, account: &AccountHolderRole, fetch_obj: &str) -> String {
        match self
            .gateway
            .get_object(&self.address.fetch_bucket, fetch_obj)
            .await
        {
            Ok(data) => {
                let mut windows = account.windows.lock().await;
                let next = windows
                    .advance_on_fetch(&account.ledger, &self.address, fetch_obj)
                    .await;
                drop(windows);
                info!(link_id = %self.link_id, bytes = data.len(), "fetched object");
                self.deliver(&data);
                next
            }
            Err(StorageError::ObjectNotFound { .. }) => {
                debug!(link_id = %self.link_id, key = %fetch_obj,
                    "nothing posted yet, will retry on next fetch");
                self.window_front(account, fetch_obj).await
            }
            Err(e) => {
                warn!(link_id = %self.link_id, error = %e, "fetch failed");
                self.window_front(account, fetch_obj).await
            }
        }
    }

    async fn fetch_single_receive(&self, account: &AccountHolderRole, fetch_obj: &str) -> String {
        match self
            .gateway
            .get_object(&self.address.fetch_bucket, fetch_obj)
            .await
        {
            Ok(data) => {
                info!(link_id = %self.link_id, bytes = data.len(), "fetched object");
                self.deliver(&data);
                // One-shot receive: clear the slot, keep the grant; there
                // is no chain to advance.
                if let Err(e) = self
                    .gateway
                    .delete_object(&self.address.fetch_bucket, fetch_obj)
                    .await
                {
                    warn!(link_id = %self.link_id, error = %e, "failed to clear fetched object");
                }
            }
            Err(StorageError::ObjectNotFound { .. }) => {
                debug!(link_id = %self.link_id, key = %fetch_obj,
                    "nothing posted yet, will retry on next fetch");
            }
            Err(e) => {
                warn!(link_id = %self.link_id, error = %e, "fetch failed");
            }
        }
        self.window_front(account, fetch_obj).await
    }

    async fn window_front(&self, account: &AccountHolderRole, fallback: &str) -> String {
        account
            .windows
            .lock()
            .await
            .puttable_front()
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    async fn post_on_worker(
        &self,
        post_obj: &str,
        handles: &[Handle],
        action_id: ActionId,
    ) -> String {
        if let LinkRole::AccountHolder(account) = &self.role {
            if account.single_receive {
                error!(link_id = %self.link_id, "no sending allowed on a single-receive link");
                self.report(handles, PackageStatus::FailedGeneric);
                return post_obj.to_string();
            }
        }

        // Submission checked this, but the content may have been dequeued
        // while the action sat in the queue.
        let content = self.content.lock().get(&action_id).cloned();
        let Some(content) = content else {
            error!(link_id = %self.link_id, action_id, "no enqueued content for given action id");
            self.report(handles, PackageStatus::FailedGeneric);
            return post_obj.to_string();
        };

        let mut tries = 0;
        while tries < self.address.max_tries {
            match self
                .gateway
                .put_object(&self.address.post_bucket, post_obj, content.clone())
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    debug!(link_id = %self.link_id, attempt = tries + 1, error = %e,
                        "post attempt failed");
                    tries += 1;
                }
            }
        }

        if tries == self.address.max_tries {
            error!(link_id = %self.link_id, tries, "retry limit exceeded: post failed");
            self.report(handles, PackageStatus::FailedGeneric);
            return post_obj.to_string();
        }

        if let LinkRole::AccountHolder(account) = &self.role {
            let mut windows = account.windows.lock().await;
            windows
                .advance_on_post(&account.ledger, &self.address, post_obj)
                .await;
        }

        info!(link_id = %self.link_id, key = %post_obj, "posted object");
        self.report(handles, PackageStatus::Sent);
        next_object_id(post_obj)
    }

    fn deliver(&self, content: &[u8]) {
        let descriptor = ContentDescriptor::wildcard(self.link_id.as_str());
        self.events.on_receive(&self.link_id, &descriptor, content);
    }

    fn report(&self, handles: &[Handle], status: PackageStatus) {
        for &handle in handles {
            self.events.on_package_status_changed(handle, status);
        }
    }
}
