use std::{collections::HashMap, sync::Arc, time::SystemTime};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};

use crate::notification::{NotifyId, ScheduledNotification};

struct Armed {
    generation: u64,
    payload: ScheduledNotification,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct AlarmTable {
    entries: HashMap<NotifyId, Armed>,
    next_generation: u64,
}

/// A fired alarm on its way to the delivery handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub payload: ScheduledNotification,
    generation: u64,
}

/// Exact wall-clock alarms keyed by notify id.
///
/// At most one alarm exists per id. Arming an id again supersedes the old
/// alarm: its timer is aborted and, should it already be running, it finds a
/// newer generation in the table and fires nothing. Fired payloads are handed
/// over on the channel returned by [`AlarmClock::new`] and stay cancellable
/// until [`AlarmClock::complete`] claims them.
#[derive(Clone)]
pub struct AlarmClock {
    table: Arc<Mutex<AlarmTable>>,
    /// Fired but not yet shown, by generation. Lock order: `table` first.
    in_flight: Arc<Mutex<HashMap<NotifyId, u64>>>,
    fired: UnboundedSender<Fired>,
}

impl AlarmClock {
    pub fn new() -> (Self, UnboundedReceiver<Fired>) {
        let (fired, rx) = unbounded_channel();
        let clock = Self {
            table: Arc::new(Mutex::new(AlarmTable::default())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            fired,
        };
        (clock, rx)
    }

    pub fn set_exact(&self, payload: ScheduledNotification) {
        let notify_id = payload.notify_id;
        let due = payload.due_at();

        // the table stays locked until the entry is in place, otherwise an
        // already due timer could look it up first and drop itself
        let mut table = self.table.lock();
        table.next_generation += 1;
        let generation = table.next_generation;

        let shared = self.table.clone();
        let in_flight = self.in_flight.clone();
        let fired = self.fired.clone();
        let timer = tokio::spawn(async move {
            let delay = due.duration_since(SystemTime::now()).unwrap_or_default();
            tokio::time::sleep(delay).await;

            let payload = {
                let mut table = shared.lock();
                match table.entries.get(&notify_id) {
                    Some(armed) if armed.generation == generation => {
                        in_flight.lock().insert(notify_id, generation);
                        table.entries.remove(&notify_id).map(|armed| armed.payload)
                    }
                    _ => None,
                }
            };

            if let Some(payload) = payload {
                debug!("alarm {notify_id} fired");
                if fired.send(Fired { payload, generation }).is_err() {
                    warn!("alarm {notify_id} fired with no delivery handler");
                }
            }
        });

        let armed = Armed {
            generation,
            payload,
            timer,
        };
        if let Some(previous) = table.entries.insert(notify_id, armed) {
            previous.timer.abort();
            debug!("alarm {notify_id} re-armed");
        }
    }

    /// Disarms the alarm, or revokes it if it already fired and has not been
    /// shown yet. Returns whether there was anything to stop.
    pub fn cancel(&self, notify_id: NotifyId) -> bool {
        let armed = match self.table.lock().entries.remove(&notify_id) {
            Some(armed) => {
                armed.timer.abort();
                true
            }
            None => false,
        };
        let revoked = self.in_flight.lock().remove(&notify_id).is_some();
        armed || revoked
    }

    pub fn cancel_all(&self) -> usize {
        let mut count = {
            let mut table = self.table.lock();
            let count = table.entries.len();
            for (_, armed) in table.entries.drain() {
                armed.timer.abort();
            }
            count
        };

        let mut in_flight = self.in_flight.lock();
        count += in_flight.len();
        in_flight.clear();
        count
    }

    /// Armed, or fired and still waiting to be shown.
    pub fn is_armed(&self, notify_id: NotifyId) -> bool {
        self.table.lock().entries.contains_key(&notify_id)
            || self.in_flight.lock().contains_key(&notify_id)
    }

    pub fn is_live(&self, fired: &Fired) -> bool {
        self.in_flight.lock().get(&fired.payload.notify_id) == Some(&fired.generation)
    }

    /// Claims a fired alarm and runs `show` on it, unless it was cancelled or
    /// superseded by a later firing. `show` runs with the in-flight table
    /// locked, so a concurrent cancel waits and then sees the shown result.
    pub fn complete<R>(
        &self,
        fired: &Fired,
        show: impl FnOnce(&ScheduledNotification) -> R,
    ) -> Option<R> {
        let mut in_flight = self.in_flight.lock();
        let notify_id = fired.payload.notify_id;
        if in_flight.get(&notify_id) != Some(&fired.generation) {
            return None;
        }

        in_flight.remove(&notify_id);
        Some(show(&fired.payload))
    }
}
