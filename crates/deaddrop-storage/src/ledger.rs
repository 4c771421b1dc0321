//! Object permission ledger.
//!
//! Tracks, per bucket, the policy document granting object-level access to
//! the remote peer, and republishes the whole document on every mutation
//! (the storage API has no partial policy update). A single ledger is
//! shared by every link of a transport that touches the same buckets, so
//! all mutations serialize through one async mutex held across the full
//! read-modify-write-publish sequence.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::gateway::ObjectGateway;
use crate::policy::{object_arn, Permission, PolicyDocument, PolicyStatement, Principal};

/// Sid prefix for the rolling public-write window on the fetch bucket.
pub const PUBLIC_PUTTABLE_PREFIX: &str = "public-puttable-";
/// Sid prefix for the rolling public-read window on the post bucket.
pub const PUBLIC_GETTABLE_PREFIX: &str = "public-gettable-";
/// Sid of the owner's standing wildcard write grant.
pub const PRIVATE_PUTTABLE_SID: &str = "private-puttable";
/// Sid of the owner's standing wildcard read grant.
pub const PRIVATE_GETTABLE_SID: &str = "private-gettable";

/// Permission ledger over a storage gateway.
pub struct PermissionLedger {
    gateway: Arc<dyn ObjectGateway>,
    self_principal: String,
    policies: Mutex<HashMap<String, PolicyDocument>>,
}

impl PermissionLedger {
    /// Create a ledger publishing through the given gateway on behalf of
    /// the account with the given canonical id.
    pub fn new(gateway: Arc<dyn ObjectGateway>, self_principal: impl Into<String>) -> Self {
        Self {
            gateway,
            self_principal: self_principal.into(),
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// The gateway this ledger publishes through.
    pub fn gateway(&self) -> &Arc<dyn ObjectGateway> {
        &self.gateway
    }

    /// Canonical id of the owning account.
    pub fn self_principal(&self) -> &str {
        &self.self_principal
    }

    /// Add `key` to the statement `sid` of `bucket`'s policy, creating the
    /// statement if absent, then publish the updated document. Granting a
    /// resource that is already present leaves the statement unchanged.
    pub async fn grant(
        &self,
        key: &str,
        bucket: &str,
        sid: &str,
        permission: Permission,
        principal: Principal,
    ) -> StorageResult<()> {
        let mut policies = self.policies.lock().await;
        let doc = policies.entry(bucket.to_string()).or_default();

        let resource = object_arn(bucket, key);
        match doc.find_statement(sid) {
            Some(idx) => {
                let statement = &mut doc.statement[idx];
                if !statement.resource.contains(&resource) {
                    statement.resource.push(resource);
                }
            }
            None => {
                info!(sid, bucket, "statement absent from policy, adding it");
                doc.statement
                    .push(PolicyStatement::single(sid, principal, permission, resource));
            }
        }

        self.gateway.publish_policy(bucket, doc).await
    }

    /// Remove `key` from the statement `sid` of `bucket`'s policy and
    /// publish. A statement emptied by the removal is dropped entirely.
    /// A missing statement or resource is an error: it means the window
    /// and the ledger have desynchronized, and the caller decides whether
    /// that is fatal.
    pub async fn revoke(&self, key: &str, bucket: &str, sid: &str) -> StorageResult<()> {
        let mut policies = self.policies.lock().await;
        let doc = policies
            .get_mut(bucket)
            .ok_or_else(|| StorageError::StatementNotFound {
                bucket: bucket.to_string(),
                sid: sid.to_string(),
            })?;

        let idx = doc
            .find_statement(sid)
            .ok_or_else(|| StorageError::StatementNotFound {
                bucket: bucket.to_string(),
                sid: sid.to_string(),
            })?;

        let resource = object_arn(bucket, key);
        let statement = &mut doc.statement[idx];
        let pos = statement
            .resource
            .iter()
            .position(|r| *r == resource)
            .ok_or_else(|| StorageError::ResourceNotFound {
                sid: sid.to_string(),
                resource: resource.clone(),
            })?;
        statement.resource.remove(pos);

        if statement.resource.is_empty() {
            info!(sid, "removed last resource, dropping policy statement");
            doc.statement.remove(idx);
        }

        self.gateway.publish_policy(bucket, doc).await
    }

    /// Expose `key` on the post bucket for anonymous reads.
    pub async fn make_gettable(
        &self,
        key: &str,
        post_bucket: &str,
        initial_post_obj: &str,
    ) -> StorageResult<()> {
        debug!(key, post_bucket, "make gettable");
        let sid = format!("{PUBLIC_GETTABLE_PREFIX}{initial_post_obj}");
        self.grant(key, post_bucket, &sid, Permission::GetObject, Principal::Public)
            .await
    }

    /// Revoke anonymous read access to `key` and clear the object so stale
    /// content is not left world-readable.
    pub async fn make_ungettable(
        &self,
        key: &str,
        post_bucket: &str,
        initial_post_obj: &str,
    ) -> StorageResult<()> {
        debug!(key, post_bucket, "make ungettable");
        self.gateway.delete_object(post_bucket, key).await?;
        let sid = format!("{PUBLIC_GETTABLE_PREFIX}{initial_post_obj}");
        self.revoke(key, post_bucket, &sid).await
    }

    /// Expose `key` on the fetch bucket for anonymous writes, clearing any
    /// stale object first.
    pub async fn make_puttable(
        &self,
        key: &str,
        fetch_bucket: &str,
        initial_fetch_obj: &str,
    ) -> StorageResult<()> {
        debug!(key, fetch_bucket, "make puttable");
        self.gateway.delete_object(fetch_bucket, key).await?;
        let sid = format!("{PUBLIC_PUTTABLE_PREFIX}{initial_fetch_obj}");
        self.grant(key, fetch_bucket, &sid, Permission::PutObject, Principal::Public)
            .await
    }

    /// Revoke anonymous write access to `key` and delete whatever the
    /// remote may have written there.
    pub async fn make_unputtable(
        &self,
        key: &str,
        fetch_bucket: &str,
        initial_fetch_obj: &str,
    ) -> StorageResult<()> {
        debug!(key, fetch_bucket, "make unputtable");
        self.gateway.delete_object(fetch_bucket, key).await?;
        let sid = format!("{PUBLIC_PUTTABLE_PREFIX}{initial_fetch_obj}");
        self.revoke(key, fetch_bucket, &sid).await
    }

    /// Install the account owner's standing wildcard grants: write access
    /// to the whole fetch bucket, and (for full-duplex links) read access
    /// to the whole post bucket.
    pub async fn grant_owner_defaults(
        &self,
        fetch_bucket: &str,
        post_bucket: Option<&str>,
    ) -> StorageResult<()> {
        self.grant(
            "*",
            fetch_bucket,
            PRIVATE_PUTTABLE_SID,
            Permission::PutObject,
            Principal::Canonical(self.self_principal.clone()),
        )
        .await?;
        if let Some(post_bucket) = post_bucket {
            self.grant(
                "*",
                post_bucket,
                PRIVATE_GETTABLE_SID,
                Permission::GetObject,
                Principal::Canonical(self.self_principal.clone()),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    async fn ledger_with_bucket(bucket: &str) -> (Arc<MemoryGateway>, PermissionLedger) {
        let gw = Arc::new(MemoryGateway::new());
        gw.create_bucket(bucket, "us-east-1").await.unwrap();
        let ledger = PermissionLedger::new(gw.clone(), "cafe01");
        (gw, ledger)
    }

    #[tokio::test]
    async fn test_grant_creates_statement_and_publishes() {
        let (gw, ledger) = ledger_with_bucket("b").await;
        ledger
            .grant("k1", "b", "sid", Permission::PutObject, Principal::Public)
            .await
            .unwrap();

        let doc = gw.last_policy("b").unwrap();
        assert_eq!(doc.statement.len(), 1);
        assert_eq!(doc.statement[0].sid, "sid");
        assert_eq!(doc.statement[0].resource, vec![object_arn("b", "k1")]);
        assert_eq!(gw.stats().policy_puts, 1);
    }

    #[tokio::test]
    async fn test_grant_appends_to_existing_statement() {
        let (gw, ledger) = ledger_with_bucket("b").await;
        ledger
            .grant("k1", "b", "sid", Permission::PutObject, Principal::Public)
            .await
            .unwrap();
        ledger
            .grant("k2", "b", "sid", Permission::PutObject, Principal::Public)
            .await
            .unwrap();

        let doc = gw.last_policy("b").unwrap();
        assert_eq!(doc.statement.len(), 1);
        assert_eq!(doc.statement[0].resource.len(), 2);
    }

    #[tokio::test]
    async fn test_grant_same_resource_twice_is_deduped() {
        let (gw, ledger) = ledger_with_bucket("b").await;
        for _ in 0..2 {
            ledger
                .grant("k1", "b", "sid", Permission::PutObject, Principal::Public)
                .await
                .unwrap();
        }
        let doc = gw.last_policy("b").unwrap();
        assert_eq!(doc.statement[0].resource.len(), 1);
        // Both mutations still published the document.
        assert_eq!(gw.stats().policy_puts, 2);
    }

    #[tokio::test]
    async fn test_revoke_last_resource_drops_statement() {
        let (gw, ledger) = ledger_with_bucket("b").await;
        ledger
            .grant("k1", "b", "sid", Permission::GetObject, Principal::Public)
            .await
            .unwrap();
        ledger.revoke("k1", "b", "sid").await.unwrap();

        let doc = gw.last_policy("b").unwrap();
        assert!(doc.statement.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_missing_statement_is_error() {
        let (_gw, ledger) = ledger_with_bucket("b").await;
        let err = ledger.revoke("k1", "b", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::StatementNotFound { .. }));
    }

    #[tokio::test]
    async fn test_revoke_missing_resource_is_error() {
        let (_gw, ledger) = ledger_with_bucket("b").await;
        ledger
            .grant("k1", "b", "sid", Permission::GetObject, Principal::Public)
            .await
            .unwrap();
        let err = ledger.revoke("other", "b", "sid").await.unwrap_err();
        assert!(matches!(err, StorageError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_make_puttable_clears_stale_object() {
        let (gw, ledger) = ledger_with_bucket("fetch").await;
        gw.put_object("fetch", "k1", vec![9, 9]).await.unwrap();
        ledger.make_puttable("k1", "fetch", "seed0").await.unwrap();

        assert_eq!(gw.object_count("fetch"), 0);
        let doc = gw.last_policy("fetch").unwrap();
        assert_eq!(doc.statement[0].sid, format!("{PUBLIC_PUTTABLE_PREFIX}seed0"));
        assert_eq!(doc.statement[0].action, vec![Permission::PutObject]);
    }

    #[tokio::test]
    async fn test_make_ungettable_deletes_and_revokes() {
        let (gw, ledger) = ledger_with_bucket("post").await;
        gw.put_object("post", "k1", vec![1]).await.unwrap();
        ledger.make_gettable("k1", "post", "seed1").await.unwrap();
        ledger.make_ungettable("k1", "post", "seed1").await.unwrap();

        assert_eq!(gw.object_count("post"), 0);
        assert!(gw.last_policy("post").unwrap().statement.is_empty());
    }

    #[tokio::test]
    async fn test_owner_defaults_full_duplex() {
        let gw = Arc::new(MemoryGateway::new());
        gw.create_bucket("fetch", "us-east-1").await.unwrap();
        gw.create_bucket("post", "us-east-1").await.unwrap();
        let ledger = PermissionLedger::new(gw.clone(), "cafe01");

        ledger
            .grant_owner_defaults("fetch", Some("post"))
            .await
            .unwrap();

        let fetch_doc = gw.last_policy("fetch").unwrap();
        assert_eq!(fetch_doc.statement[0].sid, PRIVATE_PUTTABLE_SID);
        assert_eq!(
            fetch_doc.statement[0].principal,
            Principal::Canonical("cafe01".to_string())
        );
        assert_eq!(fetch_doc.statement[0].resource, vec![object_arn("fetch", "*")]);

        let post_doc = gw.last_policy("post").unwrap();
        assert_eq!(post_doc.statement[0].sid, PRIVATE_GETTABLE_SID);
    }
}
