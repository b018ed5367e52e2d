use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Receipt;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for mutation receipts.
///
/// Parties (instructors and students) subscribe by id; audit-style consumers
/// subscribe to every receipt. Publishing never blocks and never fails the
/// mutation: lagging or absent receivers just miss messages.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Receipt>>,
    all: broadcast::Sender<Receipt>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Receipts naming `party` as an affected instructor or student.
    pub fn subscribe(&self, party: Ulid) -> broadcast::Receiver<Receipt> {
        self.channels
            .entry(party)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Receipt> {
        self.all.subscribe()
    }

    /// Channels whose receivers have all been dropped are pruned here.
    pub fn publish(&self, receipt: &Receipt) {
        let _ = self.all.send(receipt.clone());
        for party in receipt.affected_instructors.iter().chain(&receipt.affected_students) {
            let abandoned = match self.channels.get(party) {
                Some(sender) => sender.send(receipt.clone()).is_err(),
                None => false,
            };
            if abandoned {
                self.channels.remove_if(party, |_, sender| sender.receiver_count() == 0);
            }
        }
    }
}
