//! Live audit feed
//!
//! Subscribers are per-client channels. Every subscriber receives the latest
//! window of audit records when it joins and again after each committed
//! check-in. Delivery is best effort.

use kiosk_api::Event;
use kiosk_store::{Store, StoreResult};
use kiosk_util::ClientId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct LiveFeed {
    store: Arc<dyn Store>,
    window: usize,
    subscribers: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Event>>>,
}

impl LiveFeed {
    /// `window` is how many recent records each snapshot carries
    pub fn new(store: Arc<dyn Store>, window: usize) -> Self {
        Self {
            store,
            window,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot(&self) -> StoreResult<Event> {
        Ok(Event::records_snapshot(
            self.store.recent_records(self.window)?,
        ))
    }

    /// Register `client_id` and send it the current snapshot straight away
    pub fn subscribe(
        &self,
        client_id: ClientId,
        sender: mpsc::UnboundedSender<Event>,
    ) -> StoreResult<()> {
        // Held across the snapshot so no broadcast can overtake it
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let snapshot = self.snapshot()?;
        if sender.send(snapshot).is_err() {
            warn!(client_id = %client_id, "Failed to deliver initial snapshot");
        }

        subscribers.insert(client_id.clone(), sender);
        debug!(client_id = %client_id, count = subscribers.len(), "Feed subscriber added");
        Ok(())
    }

    pub fn unsubscribe(&self, client_id: &ClientId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id)
            .is_some();
        if removed {
            debug!(client_id = %client_id, "Feed subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every subscriber; returns how many accepted it.
    ///
    /// A failed delivery is logged and the subscriber stays registered until
    /// it is unsubscribed.
    pub fn broadcast(&self, event: &Event) -> usize {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        for (client_id, sender) in subscribers.iter() {
            match sender.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(client_id = %client_id, "Failed to deliver feed update"),
            }
        }
        delivered
    }

    /// Fetch the latest window and broadcast it
    pub fn publish_latest(&self) -> StoreResult<usize> {
        let event = self.snapshot()?;
        Ok(self.broadcast(&event))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_api::{AuditRecord, EventPayload};
    use kiosk_store::{CheckInWrite, SqliteStore};

    fn append(store: &SqliteStore, student_id: i64) {
        let mut write = Some(CheckInWrite {
            status_update: None,
            record: AuditRecord::new(student_id, 0, 1, kiosk_util::now(), "gym"),
            before_commit: None,
        });
        store
            .run_check_in(student_id, &mut |_| Ok(write.take()))
            .unwrap();
    }

    fn records(event: Event) -> Vec<AuditRecord> {
        let EventPayload::RecordsSnapshot { records } = event.payload;
        records
    }

    #[test]
    fn subscribe_sends_snapshot() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for id in 1..=3 {
            append(&store, id);
        }
        let feed = LiveFeed::new(store, 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        feed.subscribe(ClientId::new(), tx).unwrap();

        let snapshot = records(rx.try_recv().unwrap());
        let ids: Vec<i64> = snapshot.iter().map(|r| r.student_id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn broadcast_survives_dead_subscriber() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let feed = LiveFeed::new(store.clone(), 20);

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let dead = ClientId::new();
        feed.subscribe(dead.clone(), dead_tx).unwrap();
        drop(dead_rx);

        let (tx, mut rx) = mpsc::unbounded_channel();
        feed.subscribe(ClientId::new(), tx).unwrap();
        let _initial = rx.try_recv().unwrap();

        append(&store, 9);
        assert_eq!(feed.publish_latest().unwrap(), 1);

        let update = records(rx.try_recv().unwrap());
        assert_eq!(update[0].student_id, 9);

        // Still registered until explicitly removed
        assert_eq!(feed.subscriber_count(), 2);
        assert!(feed.unsubscribe(&dead));
        assert!(!feed.unsubscribe(&dead));
        assert_eq!(feed.subscriber_count(), 1);
    }
}
