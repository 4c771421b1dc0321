//! Transport composition root.
//!
//! One [`Transport`] instance plays one side of the channel: it owns the
//! permission ledger (account holders only), creates and destroys links,
//! and dispatches the host's scheduled actions to the right link. All
//! per-link behavior lives in `deaddrop-link`; this layer is routing,
//! validation, and lifecycle reporting.

use std::sync::Arc;
use std::time::Duration;

use deaddrop_link::{
    seeded_object_id, ContentDescriptor, Handle, Link, LinkAddress, LinkProperties, LinkStatus,
    TransportEvents,
};
use deaddrop_storage::{ObjectGateway, PermissionLedger};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::action::{ActionDescriptor, ActionType, TransportAction};
use crate::config::{TransportConfig, TransportRole};
use crate::error::{TransportError, TransportResult};
use crate::registry::LinkRegistry;

/// One action kind the transport supports, with its content types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedAction {
    /// Action name (`fetch` or `post`).
    pub name: String,
    /// Content types accepted for the action.
    pub content_types: Vec<String>,
}

/// Capabilities advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportProperties {
    /// The actions this transport executes.
    pub supported_actions: Vec<SupportedAction>,
}

/// One side of a dead-drop channel.
pub struct Transport {
    config: TransportConfig,
    gateway: Arc<dyn ObjectGateway>,
    ledger: Option<Arc<PermissionLedger>>,
    events: Arc<dyn TransportEvents>,
    links: LinkRegistry,
}

impl Transport {
    /// Build a transport for the configured role. Account holders get a
    /// ledger shared by every link they open.
    pub fn new(
        config: TransportConfig,
        gateway: Arc<dyn ObjectGateway>,
        events: Arc<dyn TransportEvents>,
    ) -> TransportResult<Self> {
        config.validate()?;
        let ledger = match config.role {
            TransportRole::AccountHolder => Some(Arc::new(PermissionLedger::new(
                gateway.clone(),
                config.canonical_id.clone().unwrap_or_default(),
            ))),
            TransportRole::PublicUser => None,
        };
        info!(role = config.role.as_str(), "transport created");
        Ok(Self {
            config,
            gateway,
            ledger,
            events,
            links: LinkRegistry::new(),
        })
    }

    /// The transport's configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Capabilities advertised to the host.
    pub fn transport_properties() -> TransportProperties {
        TransportProperties {
            supported_actions: vec![
                SupportedAction {
                    name: "post".to_string(),
                    content_types: vec!["*/*".to_string()],
                },
                SupportedAction {
                    name: "fetch".to_string(),
                    content_types: vec![],
                },
            ],
        }
    }

    /// Properties of a registered link.
    pub fn link_properties(&self, link_id: &str) -> TransportResult<LinkProperties> {
        let link = self.require_link(link_id)?;
        Ok(link.properties().clone())
    }

    /// Number of currently registered links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn require_link(&self, link_id: &str) -> TransportResult<Arc<Link>> {
        self.links
            .get(link_id)
            .ok_or_else(|| TransportError::LinkNotFound {
                link_id: link_id.to_string(),
            })
    }

    fn pre_link_create(&self, handle: Handle, link_id: &str) -> TransportResult<()> {
        let current = self.links.len();
        if current >= self.config.max_links {
            error!(link_id, current, max = self.config.max_links, "too many links");
            self.events
                .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
            return Err(TransportError::TooManyLinks {
                current,
                max: self.config.max_links,
            });
        }
        Ok(())
    }

    /// Create a fresh link whose address is derived from the configured
    /// bucket and shared seed. Both peers compute the same initial ids, so
    /// a loader with the same seed can meet this link without ever seeing
    /// its address.
    pub async fn create_link(&self, handle: Handle, link_id: &str) -> TransportResult<()> {
        self.pre_link_create(handle, link_id)?;

        let address = LinkAddress {
            region: self.config.region.clone(),
            fetch_bucket: self.config.bucket.clone(),
            initial_fetch_obj_uuid: seeded_object_id("fetch", &self.config.seed),
            post_bucket: self.config.bucket.clone(),
            initial_post_obj_uuid: seeded_object_id("post", &self.config.seed),
            open_objects: self.config.open_objects,
            max_tries: self.config.max_tries,
        };
        debug!(link_id, address = %address.to_json(), "created new link address");

        self.open_link(handle, link_id, address, true, LinkStatus::Created)
            .await
    }

    /// Load a link from an address advertised by the remote creator.
    pub async fn load_link_address(
        &self,
        handle: Handle,
        link_id: &str,
        link_address: &str,
    ) -> TransportResult<()> {
        self.pre_link_create(handle, link_id)?;
        let address = match LinkAddress::from_json(link_address) {
            Ok(address) => address,
            Err(e) => {
                error!(link_id, error = %e, "rejecting malformed link address");
                self.events
                    .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
                return Err(e.into());
            }
        };
        self.open_link(handle, link_id, address, false, LinkStatus::Loaded)
            .await
    }

    /// Multi-address loading is not supported on this channel; the link
    /// is reported destroyed immediately.
    pub async fn load_link_addresses(
        &self,
        handle: Handle,
        link_id: &str,
        _link_addresses: &[String],
    ) -> TransportResult<()> {
        self.events
            .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
        Err(TransportError::MultiAddressUnsupported)
    }

    /// Create the creator side of a link from an explicit address.
    pub async fn create_link_from_address(
        &self,
        handle: Handle,
        link_id: &str,
        link_address: &str,
    ) -> TransportResult<()> {
        self.pre_link_create(handle, link_id)?;
        let address = match LinkAddress::from_json(link_address) {
            Ok(address) => address,
            Err(e) => {
                error!(link_id, error = %e, "rejecting malformed link address");
                self.events
                    .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
                return Err(e.into());
            }
        };
        self.open_link(handle, link_id, address, true, LinkStatus::Created)
            .await
    }

    async fn open_link(
        &self,
        handle: Handle,
        link_id: &str,
        address: LinkAddress,
        is_creator: bool,
        status: LinkStatus,
    ) -> TransportResult<()> {
        let opened = match &self.ledger {
            Some(ledger) => {
                Link::open_account_holder(
                    link_id,
                    address,
                    is_creator,
                    self.config.single_receive,
                    Duration::from_secs(self.config.cleanup_delay_secs),
                    ledger.clone(),
                    self.events.clone(),
                )
                .await
            }
            None => {
                Link::open_public_user(
                    link_id,
                    address,
                    is_creator,
                    self.gateway.clone(),
                    self.events.clone(),
                )
                .await
            }
        };

        match opened {
            Ok(link) => {
                self.links.add(link);
                self.events.on_link_status_changed(handle, link_id, status);
                Ok(())
            }
            Err(e) => {
                error!(link_id, error = %e, "failed to open link");
                self.events
                    .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
                Err(e.into())
            }
        }
    }

    /// Shut a link down and forget it.
    pub async fn destroy_link(&self, handle: Handle, link_id: &str) -> TransportResult<()> {
        let Some(link) = self.links.remove(link_id) else {
            error!(link_id, "link does not exist");
            return Err(TransportError::LinkNotFound {
                link_id: link_id.to_string(),
            });
        };
        link.shutdown().await;
        self.events
            .on_link_status_changed(handle, link_id, LinkStatus::Destroyed);
        Ok(())
    }

    /// Encoding parameters for an upcoming action: posts carry wildcard
    /// content for their link, fetches carry nothing.
    pub fn action_params(&self, action: &TransportAction) -> TransportResult<Vec<ContentDescriptor>> {
        let descriptor = ActionDescriptor::from_json(&action.json)?;
        Ok(match descriptor.action_type {
            ActionType::Fetch => vec![],
            ActionType::Post => vec![ContentDescriptor::wildcard(descriptor.link_id)],
        })
    }

    /// Stage content for an upcoming post action. Empty content and fetch
    /// actions are ignored.
    pub fn enqueue_content(&self, action: &TransportAction, content: &[u8]) -> TransportResult<()> {
        if content.is_empty() {
            debug!(action_id = action.action_id, "skipping enqueue, content is empty");
            return Ok(());
        }
        let descriptor = ActionDescriptor::from_json(&action.json)?;
        match descriptor.action_type {
            ActionType::Fetch => Ok(()),
            ActionType::Post => {
                let link = self.require_link(&descriptor.link_id)?;
                link.enqueue_content(action.action_id, content.to_vec())?;
                Ok(())
            }
        }
    }

    /// Discard staged content for an action.
    pub fn dequeue_content(&self, action: &TransportAction) -> TransportResult<()> {
        let descriptor = ActionDescriptor::from_json(&action.json)?;
        match descriptor.action_type {
            ActionType::Fetch => Ok(()),
            ActionType::Post => {
                let link = self.require_link(&descriptor.link_id)?;
                link.dequeue_content(action.action_id)?;
                Ok(())
            }
        }
    }

    /// Execute a scheduled action: queue a fetch or post on its link. An
    /// action for a link that is already gone is tolerated, since the
    /// scheduler may outrun link teardown.
    pub fn do_action(&self, handles: Vec<Handle>, action: &TransportAction) -> TransportResult<()> {
        let descriptor = ActionDescriptor::from_json(&action.json)?;
        let Some(link) = self.links.get(&descriptor.link_id) else {
            debug!(link_id = %descriptor.link_id, "link for action is gone, likely shutting down");
            return Ok(());
        };
        match descriptor.action_type {
            ActionType::Fetch => link.fetch(handles)?,
            ActionType::Post => link.post(handles, action.action_id)?,
        }
        Ok(())
    }

    /// Shut down every link. Each link's deferred bucket cleanup still
    /// runs on its own delay.
    pub async fn shutdown(&self) {
        for link in self.links.drain() {
            link.shutdown().await;
        }
        info!(role = self.config.role.as_str(), "transport shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deaddrop_link::{next_object_id, PackageStatus, RecordingEvents};
    use deaddrop_storage::MemoryGateway;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(5);

    fn account_config() -> TransportConfig {
        TransportConfig {
            role: TransportRole::AccountHolder,
            bucket: "tp-bucket".to_string(),
            seed: "s33d".to_string(),
            canonical_id: Some("cafe01".to_string()),
            max_tries: 3,
            ..Default::default()
        }
    }

    struct Fixture {
        gateway: Arc<MemoryGateway>,
        events: Arc<RecordingEvents>,
        transport: Transport,
    }

    fn fixture(config: TransportConfig) -> Fixture {
        let gateway = Arc::new(MemoryGateway::new());
        let events = Arc::new(RecordingEvents::new());
        let transport = Transport::new(config, gateway.clone(), events.clone()).unwrap();
        Fixture {
            gateway,
            events,
            transport,
        }
    }

    fn post_action(action_id: u64, link_id: &str) -> TransportAction {
        TransportAction::new(
            action_id,
            &ActionDescriptor {
                link_id: link_id.to_string(),
                action_type: ActionType::Post,
            },
        )
    }

    fn fetch_action(action_id: u64, link_id: &str) -> TransportAction {
        TransportAction::new(
            action_id,
            &ActionDescriptor {
                link_id: link_id.to_string(),
                action_type: ActionType::Fetch,
            },
        )
    }

    #[test]
    fn test_transport_properties_shape() {
        let props = Transport::transport_properties();
        assert_eq!(props.supported_actions.len(), 2);
        assert_eq!(props.supported_actions[0].name, "post");
        assert_eq!(props.supported_actions[0].content_types, vec!["*/*"]);
        assert!(props.supported_actions[1].content_types.is_empty());
    }

    #[tokio::test]
    async fn test_create_link_registers_and_reports() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();

        assert_eq!(fx.transport.link_count(), 1);
        assert_eq!(
            fx.events.link_statuses(),
            vec![(1, "link-a".to_string(), LinkStatus::Created)]
        );
        // The advertised address is derived from the shared seed.
        let props = fx.transport.link_properties("link-a").unwrap();
        let address = LinkAddress::from_json(&props.link_address.unwrap()).unwrap();
        assert_eq!(address.fetch_bucket, "tp-bucket");
        assert_eq!(address.initial_fetch_obj_uuid, seeded_object_id("fetch", "s33d"));
        assert_eq!(address.initial_post_obj_uuid, seeded_object_id("post", "s33d"));
    }

    #[tokio::test]
    async fn test_create_link_public_user_touches_no_policies() {
        let config = TransportConfig {
            bucket: "tp-bucket".to_string(),
            seed: "s33d".to_string(),
            ..Default::default()
        };
        let fx = fixture(config);
        fx.transport.create_link(1, "link-p").await.unwrap();

        assert_eq!(fx.transport.link_count(), 1);
        assert_eq!(fx.gateway.stats().policy_puts, 0);
        assert_eq!(fx.gateway.stats().bucket_creates, 0);
    }

    #[tokio::test]
    async fn test_max_links_enforced() {
        let config = TransportConfig {
            max_links: 1,
            ..account_config()
        };
        let fx = fixture(config);
        fx.transport.create_link(1, "link-a").await.unwrap();

        let err = fx.transport.create_link(2, "link-b").await.unwrap_err();
        assert!(matches!(err, TransportError::TooManyLinks { .. }));
        assert_eq!(
            fx.events.link_statuses().last().unwrap(),
            &(2, "link-b".to_string(), LinkStatus::Destroyed)
        );
    }

    #[tokio::test]
    async fn test_load_link_address_reports_loaded() {
        let fx = fixture(account_config());
        let address = LinkAddress {
            region: "us-east-1".to_string(),
            fetch_bucket: "remote-bucket".to_string(),
            initial_fetch_obj_uuid: "f0".to_string(),
            post_bucket: "remote-bucket".to_string(),
            initial_post_obj_uuid: "p0".to_string(),
            open_objects: 1,
            max_tries: 3,
        };
        fx.transport
            .load_link_address(5, "link-l", &address.to_json())
            .await
            .unwrap();

        assert_eq!(
            fx.events.link_statuses(),
            vec![(5, "link-l".to_string(), LinkStatus::Loaded)]
        );
        // Loader side keeps the address unflipped.
        let link = fx.transport.require_link("link-l").unwrap();
        assert_eq!(link.address().initial_fetch_obj_uuid, "f0");
    }

    #[tokio::test]
    async fn test_malformed_address_reports_destroyed() {
        let fx = fixture(account_config());
        let err = fx
            .transport
            .load_link_address(5, "link-x", "{ not json")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Link(_)));
        assert_eq!(
            fx.events.link_statuses(),
            vec![(5, "link-x".to_string(), LinkStatus::Destroyed)]
        );
        assert_eq!(fx.transport.link_count(), 0);
    }

    #[tokio::test]
    async fn test_load_link_addresses_unsupported() {
        let fx = fixture(account_config());
        let err = fx
            .transport
            .load_link_addresses(4, "link-m", &["{}".to_string(), "{}".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MultiAddressUnsupported));
        assert_eq!(
            fx.events.link_statuses(),
            vec![(4, "link-m".to_string(), LinkStatus::Destroyed)]
        );
    }

    #[tokio::test]
    async fn test_destroy_link_shuts_down_and_reports() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();
        fx.transport.destroy_link(2, "link-a").await.unwrap();

        assert_eq!(fx.transport.link_count(), 0);
        assert_eq!(
            fx.events.link_statuses().last().unwrap(),
            &(2, "link-a".to_string(), LinkStatus::Destroyed)
        );

        let err = fx.transport.destroy_link(3, "link-a").await.unwrap_err();
        assert!(matches!(err, TransportError::LinkNotFound { .. }));
    }

    #[tokio::test]
    async fn test_do_action_posts_through_link() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();

        let action = post_action(7, "link-a");
        fx.transport.enqueue_content(&action, b"payload").unwrap();
        fx.transport.do_action(vec![70], &action).unwrap();

        let statuses = timeout(TICK, fx.events.wait_for_statuses(1)).await.unwrap();
        assert_eq!(statuses, vec![(70, PackageStatus::Sent)]);
        // The creator posts on the flipped chain: the loader's fetch side.
        let posted_key = seeded_object_id("fetch", "s33d");
        assert_eq!(
            fx.gateway.get_object("tp-bucket", &posted_key).await.unwrap(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn test_do_action_fetch_delivers() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();

        // The remote (loader) posts into the creator's fetch chain.
        let remote_key = seeded_object_id("post", "s33d");
        fx.gateway
            .put_object("tp-bucket", &remote_key, b"gift".to_vec())
            .await
            .unwrap();

        fx.transport
            .do_action(vec![], &fetch_action(8, "link-a"))
            .unwrap();
        let receives = timeout(TICK, fx.events.wait_for_receives(1)).await.unwrap();
        assert_eq!(receives, vec![("link-a".to_string(), b"gift".to_vec())]);

        // The fetched slot rotated out of the window.
        let link = fx.transport.require_link("link-a").unwrap();
        let window = link.puttable_window().await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0], next_object_id(&remote_key));
    }

    #[tokio::test]
    async fn test_do_action_for_missing_link_is_tolerated() {
        let fx = fixture(account_config());
        fx.transport
            .do_action(vec![1], &fetch_action(9, "gone"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_action_rejected() {
        let fx = fixture(account_config());
        let action = TransportAction {
            action_id: 1,
            json: "{ nope".to_string(),
        };
        assert!(matches!(
            fx.transport.do_action(vec![], &action),
            Err(TransportError::MalformedAction(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_empty_content_is_skipped() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();

        let action = post_action(7, "link-a");
        fx.transport.enqueue_content(&action, b"").unwrap();
        // No content was staged, so the post fails immediately.
        fx.transport.do_action(vec![70], &action).unwrap();
        let statuses = timeout(TICK, fx.events.wait_for_statuses(1)).await.unwrap();
        assert_eq!(statuses, vec![(70, PackageStatus::FailedGeneric)]);
    }

    #[tokio::test]
    async fn test_action_params_shape() {
        let fx = fixture(account_config());
        let post = fx.transport.action_params(&post_action(1, "link-a")).unwrap();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].content_type, "*/*");
        assert_eq!(post[0].link_id, "link-a");

        let fetch = fx.transport.action_params(&fetch_action(2, "link-a")).unwrap();
        assert!(fetch.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_links() {
        let fx = fixture(account_config());
        fx.transport.create_link(1, "link-a").await.unwrap();
        fx.transport.shutdown().await;
        assert_eq!(fx.transport.link_count(), 0);
    }
}
