//! Type-Subscription registry
//!
//! Consumers subscribe to type registration/removal events. Notification
//! bodies are produced by a [`ConsumerCallbackHandler`] selected by the
//! subscription's API version, so several consumer API versions can
//! coexist. A subscriber whose callback keeps failing after retries is
//! removed.

use super::info_types::InfoType;
use super::multimap::MultiMap;
use super::store::EntityStore;
use crate::callbacks::retry::{retry, RetryPolicy};
use crate::clients::CallbackError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ics_common::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Store directory name for subscriptions
pub const STORE_KIND: &str = "infotypesubscriptions";

const MAX_CONCURRENCY: usize = 5;

/// A consumer's request to hear about type availability changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub callback_url: String,
    pub owner: String,
    /// Selects the callback handler that formats the notification
    pub api_version: String,
}

/// Per-API-version notification sender
#[async_trait]
pub trait ConsumerCallbackHandler: Send + Sync {
    async fn notify_type_registered(
        &self,
        info_type: &InfoType,
        subscription: &SubscriptionInfo,
    ) -> std::result::Result<String, CallbackError>;

    async fn notify_type_removed(
        &self,
        info_type: &InfoType,
        subscription: &SubscriptionInfo,
    ) -> std::result::Result<String, CallbackError>;
}

/// Stand-in for an unregistered API version; every call fails
struct MissingHandler {
    api_version: String,
}

#[async_trait]
impl ConsumerCallbackHandler for MissingHandler {
    async fn notify_type_registered(
        &self,
        _info_type: &InfoType,
        _subscription: &SubscriptionInfo,
    ) -> std::result::Result<String, CallbackError> {
        Err(CallbackError::NoHandler(self.api_version.clone()))
    }

    async fn notify_type_removed(
        &self,
        _info_type: &InfoType,
        _subscription: &SubscriptionInfo,
    ) -> std::result::Result<String, CallbackError> {
        Err(CallbackError::NoHandler(self.api_version.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
enum TypeEvent {
    Registered,
    Removed,
}

#[derive(Default)]
struct SubscriptionIndex {
    all: HashMap<String, Arc<SubscriptionInfo>>,
    by_owner: MultiMap<Arc<SubscriptionInfo>>,
}

impl SubscriptionIndex {
    fn insert(&mut self, subscription: Arc<SubscriptionInfo>) {
        if let Some(previous) = self.all.remove(&subscription.id) {
            self.by_owner.remove(&previous.owner, &previous.id);
        }
        self.by_owner
            .put(&subscription.owner, &subscription.id, Arc::clone(&subscription));
        self.all.insert(subscription.id.clone(), subscription);
    }

    /// Drop whatever is currently stored under `id`, keyed by the stored
    /// entry's owner
    fn remove(&mut self, id: &str) -> Option<Arc<SubscriptionInfo>> {
        let current = self.all.remove(id)?;
        self.by_owner.remove(&current.owner, &current.id);
        Some(current)
    }
}

pub struct InfoTypeSubscriptions {
    index: Mutex<SubscriptionIndex>,
    store: EntityStore,
    handlers: RwLock<HashMap<String, Arc<dyn ConsumerCallbackHandler>>>,
    retry_base_delay: Duration,
}

impl InfoTypeSubscriptions {
    pub fn new(store: EntityStore, retry_base_delay: Duration) -> Self {
        Self {
            index: Mutex::new(SubscriptionIndex::default()),
            store,
            handlers: RwLock::new(HashMap::new()),
            retry_base_delay,
        }
    }

    /// Plug in the notification format of one consumer API version
    pub fn register_callback_handler(&self, handler: Arc<dyn ConsumerCallbackHandler>, api_version: &str) {
        self.handlers.write().insert(api_version.to_string(), handler);
    }

    pub fn restore_from_disk(&self) -> Result<usize> {
        let restored: Vec<SubscriptionInfo> = self.store.load_all()?;
        let count = restored.len();
        let mut index = self.index.lock();
        for subscription in restored {
            index.insert(Arc::new(subscription));
        }
        info!(count, "Restored type subscriptions");
        Ok(count)
    }

    pub fn put(&self, subscription: SubscriptionInfo) -> Arc<SubscriptionInfo> {
        let subscription = Arc::new(subscription);
        let mut index = self.index.lock();
        index.insert(Arc::clone(&subscription));
        if let Err(e) = self.store.write(&subscription.id, subscription.as_ref()) {
            warn!(subscription_id = %subscription.id, error = %e, "Could not save subscription");
        }
        debug!(subscription_id = %subscription.id, "Added type status subscription");
        subscription
    }

    pub fn get(&self, id: &str) -> Option<Arc<SubscriptionInfo>> {
        self.index.lock().all.get(id).cloned()
    }

    /// Like [`get`](Self::get) but `NotFound` when absent
    pub fn get_subscription(&self, id: &str) -> Result<Arc<SubscriptionInfo>> {
        self.get(id)
            .ok_or_else(|| Error::not_found("Information subscription", id))
    }

    pub fn all_subscriptions(&self) -> Vec<Arc<SubscriptionInfo>> {
        self.index.lock().all.values().cloned().collect()
    }

    pub fn subscriptions_for_owner(&self, owner: &str) -> Vec<Arc<SubscriptionInfo>> {
        self.index.lock().by_owner.get(owner)
    }

    pub fn remove(&self, subscription: &SubscriptionInfo) {
        let mut index = self.index.lock();
        if index.remove(&subscription.id).is_none() {
            return;
        }
        self.delete_file(&subscription.id);
    }

    /// Remove `snapshot` only if it is still the stored definition.
    ///
    /// Returns false when the subscription was replaced or removed since
    /// the snapshot was taken.
    pub fn remove_if_current(&self, snapshot: &Arc<SubscriptionInfo>) -> bool {
        let mut index = self.index.lock();
        match index.all.get(&snapshot.id) {
            Some(current) if Arc::ptr_eq(current, snapshot) => {}
            _ => return false,
        }
        index.remove(&snapshot.id);
        self.delete_file(&snapshot.id);
        true
    }

    fn delete_file(&self, id: &str) {
        if let Err(e) = self.store.delete(id) {
            debug!(subscription_id = %id, error = %e, "Could not delete subscription from database");
        }
        debug!(subscription_id = %id, "Removed type status subscription");
    }

    pub fn len(&self) -> usize {
        self.index.lock().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut index = self.index.lock();
        index.all.clear();
        index.by_owner.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not delete database");
        }
    }

    /// Tell every subscriber that `info_type` was registered. Runs
    /// detached; the handle may be awaited or dropped.
    pub fn notify_type_registered(self: &Arc<Self>, info_type: Arc<InfoType>) -> JoinHandle<()> {
        self.notify_all_subscribers(info_type, TypeEvent::Registered)
    }

    /// Tell every subscriber that `info_type` was removed
    pub fn notify_type_removed(self: &Arc<Self>, info_type: Arc<InfoType>) -> JoinHandle<()> {
        self.notify_all_subscribers(info_type, TypeEvent::Removed)
    }

    fn handler_for(&self, api_version: &str) -> Arc<dyn ConsumerCallbackHandler> {
        match self.handlers.read().get(api_version) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(MissingHandler {
                api_version: api_version.to_string(),
            }),
        }
    }

    fn notify_all_subscribers(self: &Arc<Self>, info_type: Arc<InfoType>, event: TypeEvent) -> JoinHandle<()> {
        let subscriptions = self.all_subscriptions();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            debug!(type_id = %info_type.id, ?event, subscribers = subscriptions.len(), "Notifying type subscribers");
            stream::iter(subscriptions)
                .map(|subscription| this.notify_subscriber(&info_type, subscription, event))
                .buffer_unordered(MAX_CONCURRENCY)
                .collect::<Vec<_>>()
                .await;
        })
    }

    /// Call one subscriber with retries; drop the subscription if it never
    /// answers
    async fn notify_subscriber(&self, info_type: &InfoType, subscription: Arc<SubscriptionInfo>, event: TypeEvent) {
        let handler = self.handler_for(&subscription.api_version);
        let policy = RetryPolicy::Backoff {
            retries: 3,
            base: self.retry_base_delay,
        };

        let result = retry("type subscription notification", &policy, || {
            let handler = Arc::clone(&handler);
            let subscription = Arc::clone(&subscription);
            async move {
                match event {
                    TypeEvent::Registered => handler.notify_type_registered(info_type, &subscription).await,
                    TypeEvent::Removed => handler.notify_type_removed(info_type, &subscription).await,
                }
            }
        })
        .await;

        match result {
            Ok(_) => debug!(subscription_id = %subscription.id, type_id = %info_type.id, "Consumer notified OK"),
            Err(e) => {
                if self.remove_if_current(&subscription) {
                    warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Consumer callback failed, removed subscription"
                    );
                } else {
                    debug!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Consumer callback failed for a replaced subscription"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(id: &str, owner: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            id: id.to_string(),
            callback_url: format!("http://{}/callback", owner),
            owner: owner.to_string(),
            api_version: "version_1".to_string(),
        }
    }

    fn registry(dir: &std::path::Path) -> Arc<InfoTypeSubscriptions> {
        let store = EntityStore::open(dir, STORE_KIND).unwrap();
        Arc::new(InfoTypeSubscriptions::new(store, Duration::from_millis(1)))
    }

    #[test]
    fn test_owner_index() {
        let dir = tempfile::tempdir().unwrap();
        let subs = registry(dir.path());
        subs.put(subscription("s1", "alice"));
        subs.put(subscription("s2", "alice"));
        subs.put(subscription("s3", "bob"));

        assert_eq!(subs.subscriptions_for_owner("alice").len(), 2);
        assert_eq!(subs.subscriptions_for_owner("bob").len(), 1);

        subs.put(subscription("s3", "alice"));
        assert_eq!(subs.subscriptions_for_owner("alice").len(), 3);
        assert!(subs.subscriptions_for_owner("bob").is_empty());
    }

    #[test]
    fn test_get_subscription_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let subs = registry(dir.path());
        assert!(matches!(subs.get_subscription("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_with_stale_snapshot_uses_stored_owner() {
        let dir = tempfile::tempdir().unwrap();
        let subs = registry(dir.path());
        let stale = subs.put(subscription("s1", "mallory"));
        subs.put(subscription("s1", "bob"));

        assert!(!subs.remove_if_current(&stale));
        assert_eq!(subs.get("s1").unwrap().owner, "bob");

        subs.remove(&stale);
        assert!(subs.get("s1").is_none());
        assert!(subs.subscriptions_for_owner("bob").is_empty());
        assert!(subs.subscriptions_for_owner("mallory").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_api_version_prunes_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let subs = registry(dir.path());
        let mut sub = subscription("s1", "alice");
        sub.api_version = "version_99".to_string();
        subs.put(sub);

        subs.notify_type_registered(Arc::new(InfoType::new("weather", None, None)))
            .await
            .unwrap();

        assert!(subs.get("s1").is_none());
        assert!(subs.all_subscriptions().is_empty());
    }
}
