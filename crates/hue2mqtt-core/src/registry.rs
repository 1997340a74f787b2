// ── Bridge registry ──
//
// Single owner of all `Bridge` entries. The map lives behind a `watch`
// channel: every mutation swaps in a new `Arc` snapshot under the
// channel's write lock, so readers see the old map or the new one, never
// a half-applied merge. Subscribers (the stream supervisor) are woken on
// every change.

use std::sync::Arc;

use hue2mqtt_api::ApiClient;
use hue2mqtt_api::discovery;
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::CoreError;
use crate::model::{Bridge, BridgeStatus};

/// Immutable view of every bridge, in insertion order.
pub type BridgeSnapshot = Arc<IndexMap<String, Arc<Bridge>>>;

#[derive(Debug, Clone)]
pub struct BridgeRegistry {
    snapshot: Arc<watch::Sender<BridgeSnapshot>>,
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(IndexMap::new()));
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    /// Merge `bridge` into the entry with the same id, creating it if
    /// absent. Returns the registry snapshot after the merge.
    pub fn upsert(&self, bridge: Bridge) -> Result<BridgeSnapshot, CoreError> {
        if bridge.id.trim().is_empty() {
            return Err(CoreError::InvalidBridge {
                id: bridge.id,
                reason: "empty id".into(),
            });
        }

        self.snapshot.send_modify(|current| {
            let mut next = IndexMap::clone(current);
            match next.get(&bridge.id) {
                Some(existing) => {
                    let mut merged = Bridge::clone(existing);
                    merged.merge(bridge);
                    next.insert(merged.id.clone(), Arc::new(merged));
                }
                None => {
                    debug!(bridge_id = %bridge.id, address = %bridge.address, "registering bridge");
                    next.insert(bridge.id.clone(), Arc::new(bridge));
                }
            }
            *current = Arc::new(next);
        });

        Ok(self.snapshot())
    }

    /// Record a stream status for a known bridge. Unknown ids are ignored
    /// and an unchanged status does not wake subscribers.
    pub fn set_status(&self, id: &str, status: BridgeStatus) {
        self.snapshot.send_if_modified(|current| {
            let Some(existing) = current.get(id) else {
                return false;
            };
            if existing.status == Some(status) {
                return false;
            }
            let mut updated = Bridge::clone(existing);
            updated.status = Some(status);
            let mut next = IndexMap::clone(current);
            next.insert(updated.id.clone(), Arc::new(updated));
            *current = Arc::new(next);
            true
        });
    }

    pub fn get(&self, id: &str) -> Result<Arc<Bridge>, CoreError> {
        self.snapshot
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::BridgeNotFound { id: id.into() })
    }

    /// The first bridge by insertion order.
    pub fn get_default(&self) -> Result<Arc<Bridge>, CoreError> {
        self.snapshot
            .borrow()
            .first()
            .map(|(_, bridge)| Arc::clone(bridge))
            .ok_or(CoreError::NoBridges)
    }

    pub fn list(&self) -> Vec<Arc<Bridge>> {
        self.snapshot.borrow().values().cloned().collect()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Startup ──────────────────────────────────────────────────────

    /// Load the configured bridges, fall back to network discovery when
    /// none were given, then verify every bridge has a credential.
    ///
    /// A bridge without a credential is fatal: every later call needs it.
    pub async fn initialize(
        &self,
        configured: Vec<Bridge>,
        discovery: &DiscoveryConfig,
        api: &ApiClient,
    ) -> Result<BridgeSnapshot, CoreError> {
        let has_static = !configured.is_empty();
        for bridge in configured {
            self.upsert(bridge)?;
        }

        if has_static {
            debug!("static bridge list supplied, skipping discovery");
        } else if !discovery.enabled {
            debug!("discovery disabled");
        } else {
            match discovery::discover(api, discovery.url.clone()).await {
                Ok(candidates) => {
                    info!(count = candidates.len(), "bridge discovery finished");
                    for candidate in candidates {
                        let mut bridge = Bridge::new(candidate.id.clone(), candidate.address());
                        bridge.credential.clone_from(&discovery.credential);
                        self.upsert(bridge)?;
                    }
                }
                Err(e) => warn!(error = %e, url = %discovery.url, "bridge discovery failed"),
            }
        }

        self.verify()
    }

    /// Fail unless there is at least one bridge and all have credentials.
    pub fn verify(&self) -> Result<BridgeSnapshot, CoreError> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(CoreError::NoBridges);
        }
        let missing: Vec<String> = snapshot
            .values()
            .filter(|b| !b.has_credential())
            .map(|b| b.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::MissingCredential {
                bridge_ids: missing,
            });
        }
        Ok(snapshot)
    }
}
