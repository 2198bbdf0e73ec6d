//! Player and village stockpiles plus gold.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which stockpile a resource lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    #[default]
    Player,
    Village,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub gold: u64,
    items: BTreeMap<String, u64>,
    village: BTreeMap<String, u64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, ns: Namespace) -> &BTreeMap<String, u64> {
        match ns {
            Namespace::Player => &self.items,
            Namespace::Village => &self.village,
        }
    }

    fn bucket_mut(&mut self, ns: Namespace) -> &mut BTreeMap<String, u64> {
        match ns {
            Namespace::Player => &mut self.items,
            Namespace::Village => &mut self.village,
        }
    }

    pub fn items(&self, ns: Namespace) -> &BTreeMap<String, u64> {
        self.bucket(ns)
    }

    pub fn count(&self, ns: Namespace, id: &str) -> u64 {
        self.bucket(ns).get(id).copied().unwrap_or(0)
    }

    pub fn add(&mut self, ns: Namespace, id: &str, qty: u64) {
        if qty == 0 {
            return;
        }
        let slot = self.bucket_mut(ns).entry(id.to_string()).or_insert(0);
        *slot = slot.saturating_add(qty);
    }

    /// Removes `qty` of `id`; returns false and changes nothing if short.
    pub fn remove(&mut self, ns: Namespace, id: &str, qty: u64) -> bool {
        let have = self.count(ns, id);
        if have < qty {
            return false;
        }
        let bucket = self.bucket_mut(ns);
        if have == qty {
            bucket.remove(id);
        } else {
            bucket.insert(id.to_string(), have - qty);
        }
        true
    }

    /// Whether every entry of `wanted` is in stock. `ns_of` picks the
    /// stockpile each item lives in.
    pub fn has_all<F>(&self, wanted: &BTreeMap<String, u64>, ns_of: F) -> bool
    where
        F: Fn(&str) -> Namespace,
    {
        wanted
            .iter()
            .all(|(id, &qty)| self.count(ns_of(id), id) >= qty)
    }

    /// All-or-nothing removal of several items, possibly across stockpiles.
    pub fn consume_all<F>(&mut self, wanted: &BTreeMap<String, u64>, ns_of: F) -> bool
    where
        F: Fn(&str) -> Namespace,
    {
        if !self.has_all(wanted, &ns_of) {
            return false;
        }
        wanted
            .iter()
            .all(|(id, &qty)| self.remove(ns_of(id), id, qty))
    }

    pub fn add_gold(&mut self, amount: u64) {
        self.gold = self.gold.saturating_add(amount);
    }

    pub fn spend_gold(&mut self, amount: u64) -> bool {
        if self.gold < amount {
            return false;
        }
        self.gold -= amount;
        true
    }
}
