//! Channel descriptors and the read-through channel registry.
//!
//! A channel is a named, typed, rate-tagged time series identified by a
//! stable [`ChannelKey`]. The iterator and writer need each channel's rate and
//! density for all positional arithmetic, so they resolve keys through a
//! [`ChannelRegistry`].
//!
//! # Registry Flow
//!
//! 1. Caller asks for one or more keys
//! 2. Cached descriptors are returned directly
//! 3. All uncached keys are fetched in one batched call to the
//!    [`ChannelRetriever`]
//! 4. Fetched descriptors are cached forever and returned
//!
//! Descriptors are immutable for the lifetime of a registry. If channel
//! metadata changes on the server, discard the registry and build a new one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::telem::{DataType, Density, Rate};

/// Stable identifier of a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelKey(u32);

impl ChannelKey {
    /// Creates a channel key.
    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    /// Returns the raw key.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelKey {
    fn from(key: u32) -> Self {
        Self(key)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable metadata describing a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// The channel's key.
    pub key: ChannelKey,
    /// Human-readable name.
    pub name: String,
    /// The cluster node that leases the channel.
    pub node_id: u32,
    /// Sample rate.
    pub rate: Rate,
    /// Scalar type of each sample.
    pub data_type: DataType,
    /// Bytes per sample. May be [`Density::UNKNOWN`] if the server did not report it.
    pub density: Density,
}

impl ChannelDescriptor {
    /// Creates a descriptor whose density is derived from the data type.
    pub fn new(
        key: ChannelKey,
        name: impl Into<String>,
        node_id: u32,
        rate: Rate,
        data_type: DataType,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            node_id,
            rate,
            data_type,
            density: data_type.density(),
        }
    }
}

/// External collaborator that fetches channel metadata from the cluster.
///
/// The registry is the only caller. Implementations should return one
/// descriptor per key they know about; keys they omit are reported to the
/// registry's caller as [`QueryError::ChannelsNotFound`].
pub trait ChannelRetriever: Send + Sync {
    /// Retrieves the descriptors for the given keys in a single round trip.
    fn retrieve(
        &self,
        keys: &[ChannelKey],
    ) -> impl Future<Output = Result<Vec<ChannelDescriptor>>> + Send;
}

/// Read-through cache of channel descriptors.
///
/// Safe to share between concurrent iterators and writers behind an `Arc`.
/// Concurrent lookups for the same uncached key may both hit the retriever;
/// the last fill wins, which is harmless because descriptors are immutable.
#[derive(Debug)]
pub struct ChannelRegistry<R> {
    retriever: R,
    cache: RwLock<HashMap<ChannelKey, Arc<ChannelDescriptor>>>,
}

impl<R: ChannelRetriever> ChannelRegistry<R> {
    /// Creates an empty registry backed by the given retriever.
    pub fn new(retriever: R) -> Self {
        Self {
            retriever,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the descriptor for a single channel.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ChannelsNotFound`] if the channel does not exist,
    /// or whatever error the retriever raised.
    pub async fn get(&self, key: ChannelKey) -> Result<Arc<ChannelDescriptor>> {
        self.get_many(&[key])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::ChannelsNotFound(vec![key]).into())
    }

    /// Returns descriptors for `keys`, in the same order and with the same
    /// duplicates as the request.
    ///
    /// Issues at most one call to the retriever, covering exactly the keys
    /// not already cached.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ChannelsNotFound`] listing every key the
    /// retriever did not return, or whatever error the retriever raised.
    pub async fn get_many(&self, keys: &[ChannelKey]) -> Result<Vec<Arc<ChannelDescriptor>>> {
        let missing = {
            let cache = self.cache.read().await;
            let mut seen = HashSet::new();
            keys.iter()
                .copied()
                .filter(|key| !cache.contains_key(key) && seen.insert(*key))
                .collect::<Vec<_>>()
        };

        if !missing.is_empty() {
            debug!(count = missing.len(), "fetching uncached channel descriptors");
            let fetched = self.retriever.retrieve(&missing).await?;
            let mut cache = self.cache.write().await;
            for descriptor in fetched {
                cache.insert(descriptor.key, Arc::new(descriptor));
            }
        }

        let cache = self.cache.read().await;
        let mut found = Vec::with_capacity(keys.len());
        let mut not_found = Vec::new();
        for key in keys {
            match cache.get(key) {
                Some(descriptor) => found.push(Arc::clone(descriptor)),
                None => not_found.push(*key),
            }
        }

        if not_found.is_empty() {
            Ok(found)
        } else {
            Err(QueryError::ChannelsNotFound(not_found).into())
        }
    }

    /// Returns a cached descriptor without contacting the retriever.
    pub async fn cached(&self, key: ChannelKey) -> Option<Arc<ChannelDescriptor>> {
        self.cache.read().await.get(&key).cloned()
    }

    /// Returns the number of cached descriptors.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Returns true if nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}
