//! External name lookups used for enrichment.
//!
//! The HTTP client behind [`EsiLookup`] lives outside this crate; only the
//! request/response contract matters here.

use crate::error::LookupError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporationInfo {
    pub name: String,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceInfo {
    pub name: String,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipInfo {
    pub name: String,
}

/// Resolves game identifiers to display names.
#[async_trait]
pub trait EsiLookup: Send + Sync + std::fmt::Debug {
    async fn character(&self, character_id: i64) -> Result<CharacterInfo, LookupError>;
    async fn corporation(&self, corporation_id: i64) -> Result<CorporationInfo, LookupError>;
    async fn alliance(&self, alliance_id: i64) -> Result<AllianceInfo, LookupError>;
    async fn ship_type(&self, ship_type_id: i64) -> Result<ShipInfo, LookupError>;
}

/// Lookup used when no lookup service is configured: everything is
/// reported as not found, so killmails are stored without names.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLookup;

#[async_trait]
impl EsiLookup for OfflineLookup {
    async fn character(&self, _: i64) -> Result<CharacterInfo, LookupError> {
        Err(LookupError::NotFound)
    }

    async fn corporation(&self, _: i64) -> Result<CorporationInfo, LookupError> {
        Err(LookupError::NotFound)
    }

    async fn alliance(&self, _: i64) -> Result<AllianceInfo, LookupError> {
        Err(LookupError::NotFound)
    }

    async fn ship_type(&self, _: i64) -> Result<ShipInfo, LookupError> {
        Err(LookupError::NotFound)
    }
}

/// Memoizes successful lookups of the wrapped service. Failures are never
/// cached so a later kill can try again.
#[derive(Debug)]
pub struct CachedLookup<L> {
    inner: L,
    characters: DashMap<i64, CharacterInfo>,
    corporations: DashMap<i64, CorporationInfo>,
    alliances: DashMap<i64, AllianceInfo>,
    ships: DashMap<i64, ShipInfo>,
}

impl<L: EsiLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            characters: DashMap::new(),
            corporations: DashMap::new(),
            alliances: DashMap::new(),
            ships: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Number of cached entries across all kinds.
    pub fn len(&self) -> usize {
        self.characters.len() + self.corporations.len() + self.alliances.len() + self.ships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn cached<K, V, F>(cache: &DashMap<K, V>, key: K, fetch: F) -> Result<V, LookupError>
where
    K: Eq + Hash + Copy,
    V: Clone,
    F: std::future::Future<Output = Result<V, LookupError>>,
{
    if let Some(hit) = cache.get(&key) {
        return Ok(hit.clone());
    }
    let value = fetch.await?;
    cache.insert(key, value.clone());
    Ok(value)
}

#[async_trait]
impl<L: EsiLookup> EsiLookup for CachedLookup<L> {
    async fn character(&self, character_id: i64) -> Result<CharacterInfo, LookupError> {
        cached(&self.characters, character_id, self.inner.character(character_id)).await
    }

    async fn corporation(&self, corporation_id: i64) -> Result<CorporationInfo, LookupError> {
        cached(&self.corporations, corporation_id, self.inner.corporation(corporation_id)).await
    }

    async fn alliance(&self, alliance_id: i64) -> Result<AllianceInfo, LookupError> {
        cached(&self.alliances, alliance_id, self.inner.alliance(alliance_id)).await
    }

    async fn ship_type(&self, ship_type_id: i64) -> Result<ShipInfo, LookupError> {
        cached(&self.ships, ship_type_id, self.inner.ship_type(ship_type_id)).await
    }
}
