//! Sliding object-id windows.
//!
//! An account-holder link keeps two ordered windows of object ids, each
//! id backed by a live grant in the permission ledger:
//!
//! - *puttable*: ids the remote peer may currently write inbound messages
//!   to (front = next expected fetch, back = furthest pre-granted slot);
//! - *gettable*: ids the remote peer may currently read outbound messages
//!   from (front = oldest still exposed).
//!
//! Every advance is a grant/revoke pair so window membership and ledger
//! state move in lock-step. Ledger failures during an advance are logged
//! and the rotation proceeds; a stalled window would permanently
//! desynchronize the peers, which is worse than a grant left dangling.

use std::collections::VecDeque;

use deaddrop_storage::{PermissionLedger, StorageResult};
use tracing::{error, info, warn};

use crate::address::LinkAddress;
use crate::chain::next_object_id;

/// The two grant windows of one account-holder link.
#[derive(Debug, Default)]
pub struct ObjectWindows {
    puttable: VecDeque<String>,
    gettable: VecDeque<String>,
}

impl ObjectWindows {
    /// Empty windows; call [`prime`](Self::prime) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the puttable window: the initial fetch id plus
    /// `address.open_objects` chained successors, each granted as the
    /// window grows. Fails if a grant cannot be installed, since a link
    /// that starts without its window is unusable.
    pub async fn prime(
        &mut self,
        ledger: &PermissionLedger,
        address: &LinkAddress,
    ) -> StorageResult<()> {
        self.prime_single(ledger, address).await?;
        for _ in 0..address.open_objects {
            let next = match self.puttable.back() {
                Some(tail) => next_object_id(tail),
                None => next_object_id(&address.initial_fetch_obj_uuid),
            };
            ledger
                .make_puttable(&next, &address.fetch_bucket, &address.initial_fetch_obj_uuid)
                .await?;
            self.puttable.push_back(next);
        }
        Ok(())
    }

    /// Seed a one-slot puttable window (single-receive links never rotate).
    pub async fn prime_single(
        &mut self,
        ledger: &PermissionLedger,
        address: &LinkAddress,
    ) -> StorageResult<()> {
        let initial = address.initial_fetch_obj_uuid.clone();
        ledger
            .make_puttable(&initial, &address.fetch_bucket, &address.initial_fetch_obj_uuid)
            .await?;
        self.puttable.push_back(initial);
        Ok(())
    }

    /// Slide the puttable window forward by one after a successful fetch:
    /// grow the tail by the chain successor and grant it, evict the front
    /// and revoke it. Returns the new front, which is the next fetch
    /// target.
    pub async fn advance_on_fetch(
        &mut self,
        ledger: &PermissionLedger,
        address: &LinkAddress,
        fetched: &str,
    ) -> String {
        let tail = match self.puttable.back() {
            Some(tail) => tail.clone(),
            None => fetched.to_string(),
        };
        let grown = next_object_id(&tail);
        if let Err(e) = ledger
            .make_puttable(&grown, &address.fetch_bucket, &address.initial_fetch_obj_uuid)
            .await
        {
            warn!(key = %grown, error = %e, "failed to grant grown puttable slot");
        }
        self.puttable.push_back(grown.clone());

        // The front should be exactly the id we just fetched; anything else
        // means the window and the remote chain have drifted. Evict it anyway.
        if let Some(evicted) = self.puttable.pop_front() {
            if evicted != fetched {
                error!(
                    evicted = %evicted,
                    fetched = %fetched,
                    "front of puttable window was not the fetched object (popped anyway)"
                );
            }
            if let Err(e) = ledger
                .make_unputtable(&evicted, &address.fetch_bucket, &address.initial_fetch_obj_uuid)
                .await
            {
                warn!(key = %evicted, error = %e, "failed to revoke evicted puttable slot");
            }
        }

        self.puttable.front().cloned().unwrap_or(grown)
    }

    /// Rotate the gettable window after a successful post: evict the
    /// oldest exposed id once the window is at capacity, then grant and
    /// append the id just posted.
    pub async fn advance_on_post(
        &mut self,
        ledger: &PermissionLedger,
        address: &LinkAddress,
        posted: &str,
    ) {
        if self.gettable.len() >= address.open_objects {
            if let Some(old) = self.gettable.pop_front() {
                info!(key = %old, "retiring oldest gettable object");
                if let Err(e) = ledger
                    .make_ungettable(&old, &address.post_bucket, &address.initial_post_obj_uuid)
                    .await
                {
                    warn!(key = %old, error = %e, "failed to revoke retired gettable slot");
                }
            }
        }

        if let Err(e) = ledger
            .make_gettable(posted, &address.post_bucket, &address.initial_post_obj_uuid)
            .await
        {
            warn!(key = %posted, error = %e, "failed to grant posted object");
        }
        self.gettable.push_back(posted.to_string());
    }

    /// The next fetch target, if the window is primed.
    pub fn puttable_front(&self) -> Option<&String> {
        self.puttable.front()
    }

    /// Current puttable window contents, front first.
    pub fn puttable_snapshot(&self) -> Vec<String> {
        self.puttable.iter().cloned().collect()
    }

    /// Current gettable window contents, front first.
    pub fn gettable_snapshot(&self) -> Vec<String> {
        self.gettable.iter().cloned().collect()
    }

    /// Number of currently puttable ids.
    pub fn puttable_len(&self) -> usize {
        self.puttable.len()
    }

    /// Number of currently gettable ids.
    pub fn gettable_len(&self) -> usize {
        self.gettable.len()
    }
}
