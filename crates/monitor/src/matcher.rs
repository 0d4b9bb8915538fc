use std::collections::HashMap;

use whalewatch_domain::model::{Address, Direction, WatchedAddress};
use whalewatch_domain::storage::{StorageResult, WatchlistStore};

/// A registry entry that matched one side of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    pub entry: &'a WatchedAddress,
    pub direction: Direction,
}

/// Registry view taken once per block, indexed by address.
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    by_address: HashMap<Address, Vec<WatchedAddress>>,
}

impl RegistrySnapshot {
    pub async fn load<S>(storage: &S) -> StorageResult<Self>
    where
        S: WatchlistStore + ?Sized,
    {
        Ok(Self::from_entries(storage.watched_addresses().await?))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = WatchedAddress>) -> Self {
        let mut by_address: HashMap<Address, Vec<WatchedAddress>> = HashMap::new();
        for entry in entries.into_iter().filter(|entry| entry.alerts_enabled) {
            by_address
                .entry(entry.address.clone())
                .or_default()
                .push(entry);
        }
        Self { by_address }
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_address.values().map(Vec::len).sum()
    }

    pub fn is_watched(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    /// Entries watching either side. Sender matches come first. A
    /// self-transfer yields both directions for the same entry.
    pub fn matches(&self, from: &Address, to: Option<&Address>) -> Vec<Match<'_>> {
        let outgoing = self.entries_for(Some(from)).map(|entry| Match {
            entry,
            direction: Direction::Outgoing,
        });
        let incoming = self.entries_for(to).map(|entry| Match {
            entry,
            direction: Direction::Incoming,
        });
        outgoing.chain(incoming).collect()
    }

    fn entries_for(&self, address: Option<&Address>) -> impl Iterator<Item = &WatchedAddress> {
        address
            .and_then(|address| self.by_address.get(address))
            .into_iter()
            .flatten()
    }
}
