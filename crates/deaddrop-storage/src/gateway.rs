//! Object-storage gateway abstraction.
//!
//! The transport core talks to the storage service exclusively through the
//! [`ObjectGateway`] trait: bucket lifecycle, object get/put/delete, and
//! whole-document policy publication. Real deployments back this with an
//! HTTP client against the service API; tests use [`MemoryGateway`], an
//! in-memory implementation with operation counters and fault injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::policy::PolicyDocument;

/// Gateway to the object-storage service.
///
/// Every operation is independently fallible. The core retries only
/// `put_object` internally; all other calls are attempted once per
/// invocation, with retry driven by the caller's scheduled actions.
#[async_trait]
pub trait ObjectGateway: Send + Sync {
    /// Create a bucket in the given region. Creating an existing bucket
    /// succeeds.
    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()>;

    /// Delete a bucket and everything in it.
    async fn delete_bucket(&self, bucket: &str, region: &str) -> StorageResult<()>;

    /// Retrieve an object. Absent and zero-length objects both report
    /// [`StorageError::ObjectNotFound`].
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Store an object, replacing any previous content at the key.
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Delete an object. Deleting an absent key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Replace the bucket's access policy with the given document.
    async fn publish_policy(&self, bucket: &str, policy: &PolicyDocument) -> StorageResult<()>;
}

/// Operation counters for [`MemoryGateway`].
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    /// Number of bucket creations.
    pub bucket_creates: u64,
    /// Number of bucket deletions.
    pub bucket_deletes: u64,
    /// Number of object reads (including misses).
    pub gets: u64,
    /// Number of object writes (including injected failures).
    pub puts: u64,
    /// Number of object deletions.
    pub deletes: u64,
    /// Number of policy publications.
    pub policy_puts: u64,
}

/// In-memory gateway for tests.
///
/// Tracks per-operation counts, remembers the last policy document
/// published per bucket, and can be told to fail the next N puts or gets
/// to exercise retry paths.
#[derive(Default)]
pub struct MemoryGateway {
    buckets: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    policies: Mutex<HashMap<String, PolicyDocument>>,
    stats: Mutex<GatewayStats>,
    fail_puts: AtomicU32,
    fail_gets: AtomicU32,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` `put_object` calls with [`StorageError::Unavailable`].
    pub fn fail_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` `get_object` calls with [`StorageError::Unavailable`].
    pub fn fail_gets(&self, n: u32) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Snapshot of operation counters.
    pub fn stats(&self) -> GatewayStats {
        self.stats.lock().clone()
    }

    /// Whether the bucket currently exists.
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.lock().contains_key(bucket)
    }

    /// Number of objects currently stored in the bucket.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .get(bucket)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// The last policy document published for the bucket, if any.
    pub fn last_policy(&self, bucket: &str) -> Option<PolicyDocument> {
        self.policies.lock().get(bucket).cloned()
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectGateway for MemoryGateway {
    async fn create_bucket(&self, bucket: &str, _region: &str) -> StorageResult<()> {
        self.stats.lock().bucket_creates += 1;
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default();
        debug!(bucket, "created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str, _region: &str) -> StorageResult<()> {
        self.stats.lock().bucket_deletes += 1;
        if self.buckets.lock().remove(bucket).is_none() {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        self.policies.lock().remove(bucket);
        debug!(bucket, "deleted bucket");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.stats.lock().gets += 1;
        if Self::take_fault(&self.fail_gets) {
            return Err(StorageError::Unavailable {
                reason: "injected get failure".to_string(),
            });
        }
        let buckets = self.buckets.lock();
        let data = buckets.get(bucket).and_then(|b| b.get(key));
        match data {
            Some(bytes) if !bytes.is_empty() => Ok(bytes.clone()),
            _ => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> StorageResult<()> {
        self.stats.lock().puts += 1;
        if Self::take_fault(&self.fail_puts) {
            return Err(StorageError::Unavailable {
                reason: "injected put failure".to_string(),
            });
        }
        let mut buckets = self.buckets.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.stats.lock().deletes += 1;
        let mut buckets = self.buckets.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects.remove(key);
        Ok(())
    }

    async fn publish_policy(&self, bucket: &str, policy: &PolicyDocument) -> StorageResult<()> {
        self.stats.lock().policy_puts += 1;
        if !self.buckets.lock().contains_key(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        self.policies
            .lock()
            .insert(bucket.to_string(), policy.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.put_object("b", "k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(gw.get_object("b", "k").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        let err = gw.get_object("b", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_object_reads_as_not_found() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.put_object("b", "k", vec![]).await.unwrap();
        let err = gw.get_object("b", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_absent_key_succeeds() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.delete_object("b", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_to_missing_bucket_fails() {
        let gw = MemoryGateway::new();
        let err = gw.put_object("nope", "k", vec![1]).await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_bucket_idempotent() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.put_object("b", "k", vec![1]).await.unwrap();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        assert_eq!(gw.object_count("b"), 1);
        assert_eq!(gw.stats().bucket_creates, 2);
    }

    #[tokio::test]
    async fn test_delete_bucket_drops_policy() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.publish_policy("b", &PolicyDocument::new()).await.unwrap();
        assert!(gw.last_policy("b").is_some());
        gw.delete_bucket("b", "us-east-1").await.unwrap();
        assert!(gw.last_policy("b").is_none());
        assert!(!gw.bucket_exists("b"));
    }

    #[tokio::test]
    async fn test_fault_injection_counts_down() {
        let gw = MemoryGateway::new();
        gw.create_bucket("b", "us-east-1").await.unwrap();
        gw.fail_puts(2);
        assert!(gw.put_object("b", "k", vec![1]).await.is_err());
        assert!(gw.put_object("b", "k", vec![1]).await.is_err());
        gw.put_object("b", "k", vec![1]).await.unwrap();
        assert_eq!(gw.stats().puts, 3);
    }
}
