//! Authoritative in-memory registry state.
//!
//! One mutex guards both the registrations map and the inverted
//! service-name index; they must move together so that every registered
//! peer appears under exactly its current service name, and the index
//! never points at a dead record. All operations here are pure in-memory
//! work — external I/O (Redis, Qdrant) happens after the lock is
//! released.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use lighthouse_core::protocol::{AddrInfo, ServiceCard, StakeProof};

/// Providers are pruned when no heartbeat arrived within this window.
/// Restore applies the same threshold so a rehydrated peer is never
/// immediately collected.
pub const LIVENESS_TTL_SECS: i64 = 90;

/// An active provider session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub last_seen: DateTime<Utc>,
    pub service_card: ServiceCard,
    pub stake_proof: Option<StakeProof>,
    pub addr_info: AddrInfo,
}

/// A service name with its card and every provider currently offering it.
/// The card is taken from the first provider encountered.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceGroup {
    pub card: ServiceCard,
    pub providers: Vec<AddrInfo>,
}

#[derive(Debug, Default)]
struct StateInner {
    /// Peer identity -> active session.
    registrations: HashMap<String, RegistrationRecord>,
    /// Service name -> peers offering it.
    service_index: HashMap<String, Vec<String>>,
}

/// Registry state shared between stream handlers, the eviction loop, the
/// HTTP surface, and startup restore.
#[derive(Debug, Default)]
pub struct RegistryState {
    inner: Mutex<StateInner>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current record for a peer, if any.
    pub fn get(&self, peer_id: &str) -> Option<RegistrationRecord> {
        self.lock().registrations.get(peer_id).cloned()
    }

    /// Install or replace a registration. When the peer was already
    /// registered under a different service name, the old index entry is
    /// removed first.
    pub fn upsert(&self, peer_id: &str, record: RegistrationRecord) {
        let mut inner = self.lock();
        if let Some(existing) = inner.registrations.get(peer_id) {
            if existing.service_card.name != record.service_card.name {
                let old_name = existing.service_card.name.clone();
                remove_from_index(&mut inner, peer_id, &old_name);
            }
        }
        let name = record.service_card.name.clone();
        inner.registrations.insert(peer_id.to_string(), record);
        add_to_index(&mut inner, peer_id, &name);
    }

    /// Advance `last_seen` for a live registration, optionally replacing
    /// its address info. Returns the refreshed record so callers can
    /// mirror it to the durable store.
    pub fn heartbeat(
        &self,
        peer_id: &str,
        now: DateTime<Utc>,
        new_addr: Option<AddrInfo>,
    ) -> Option<RegistrationRecord> {
        let mut inner = self.lock();
        let record = inner.registrations.get_mut(peer_id)?;
        record.last_seen = now;
        if let Some(addr) = new_addr {
            record.addr_info = addr;
        }
        Some(record.clone())
    }

    /// Remove a registration and its index entry.
    pub fn evict(&self, peer_id: &str) -> Option<RegistrationRecord> {
        let mut inner = self.lock();
        let record = inner.registrations.remove(peer_id)?;
        remove_from_index(&mut inner, peer_id, &record.service_card.name);
        Some(record)
    }

    /// Remove every registration whose `last_seen` is older than `ttl`.
    /// Returns the removed sessions so the caller can mirror the
    /// deletions externally after the lock is gone.
    pub fn evict_stale(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Vec<(String, RegistrationRecord)> {
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .registrations
            .iter()
            .filter(|(_, record)| now - record.last_seen > ttl)
            .map(|(pid, _)| pid.clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for pid in stale {
            if let Some(record) = inner.registrations.remove(&pid) {
                remove_from_index(&mut inner, &pid, &record.service_card.name);
                evicted.push((pid, record));
            }
        }
        evicted
    }

    /// Flat provider list for the `find` RPC: every record whose service
    /// name contains `query` case-insensitively. An empty query matches
    /// everything.
    pub fn find_providers(&self, query: &str) -> Vec<AddrInfo> {
        let query = query.to_lowercase();
        let inner = self.lock();
        let mut results = Vec::new();
        for (name, peers) in &inner.service_index {
            if !name.to_lowercase().contains(&query) {
                continue;
            }
            for pid in peers {
                if let Some(record) = inner.registrations.get(pid) {
                    results.push(record.addr_info.clone());
                }
            }
        }
        results
    }

    /// Substring search grouped by service name, for the HTTP surface.
    pub fn search_by_name(&self, query: &str) -> HashMap<String, Vec<AddrInfo>> {
        let query = query.to_lowercase();
        let inner = self.lock();
        let mut results: HashMap<String, Vec<AddrInfo>> = HashMap::new();
        for (name, peers) in &inner.service_index {
            if !name.to_lowercase().contains(&query) {
                continue;
            }
            for pid in peers {
                if let Some(record) = inner.registrations.get(pid) {
                    results
                        .entry(name.clone())
                        .or_default()
                        .push(record.addr_info.clone());
                }
            }
        }
        results
    }

    /// Providers registered under an exact service name.
    pub fn get_by_name(&self, name: &str) -> Vec<AddrInfo> {
        let inner = self.lock();
        let Some(peers) = inner.service_index.get(name) else {
            return Vec::new();
        };
        peers
            .iter()
            .filter_map(|pid| inner.registrations.get(pid))
            .map(|record| record.addr_info.clone())
            .collect()
    }

    /// All services grouped by name -> provider addresses.
    pub fn snapshot_services(&self) -> HashMap<String, Vec<AddrInfo>> {
        let inner = self.lock();
        let mut view: HashMap<String, Vec<AddrInfo>> = HashMap::new();
        for record in inner.registrations.values() {
            view.entry(record.service_card.name.clone())
                .or_default()
                .push(record.addr_info.clone());
        }
        view
    }

    /// All services with full card metadata alongside provider lists.
    pub fn snapshot_full(&self) -> HashMap<String, ServiceGroup> {
        let inner = self.lock();
        let mut view: HashMap<String, ServiceGroup> = HashMap::new();
        for record in inner.registrations.values() {
            view.entry(record.service_card.name.clone())
                .or_insert_with(|| ServiceGroup {
                    card: record.service_card.clone(),
                    providers: Vec::new(),
                })
                .providers
                .push(record.addr_info.clone());
        }
        view
    }

    /// Rehydrate state from a durable-store snapshot, skipping records
    /// already past `max_age`. Returns `(restored, skipped)`.
    pub fn restore(
        &self,
        records: HashMap<String, RegistrationRecord>,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> (usize, usize) {
        let mut restored = 0;
        let mut skipped = 0;
        let mut inner = self.lock();
        for (pid, record) in records {
            if now - record.last_seen > max_age {
                skipped += 1;
                continue;
            }
            let name = record.service_card.name.clone();
            if let Some(existing) = inner.registrations.get(&pid) {
                if existing.service_card.name != name {
                    let old_name = existing.service_card.name.clone();
                    remove_from_index(&mut inner, &pid, &old_name);
                }
            }
            inner.registrations.insert(pid.clone(), record);
            add_to_index(&mut inner, &pid, &name);
            restored += 1;
        }
        (restored, skipped)
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.lock().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct service names.
    pub fn service_count(&self) -> usize {
        self.lock()
            .service_index
            .values()
            .filter(|peers| !peers.is_empty())
            .count()
    }
}

fn add_to_index(inner: &mut StateInner, peer_id: &str, name: &str) {
    let peers = inner.service_index.entry(name.to_string()).or_default();
    if !peers.iter().any(|p| p == peer_id) {
        peers.push(peer_id.to_string());
    }
}

fn remove_from_index(inner: &mut StateInner, peer_id: &str, name: &str) {
    if let Some(peers) = inner.service_index.get_mut(name) {
        peers.retain(|p| p != peer_id);
        if peers.is_empty() {
            inner.service_index.remove(name);
        }
    }
}
