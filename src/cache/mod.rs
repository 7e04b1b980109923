//! Query cache: keyed results, freshness tracking and change notification.
//!
//! This module knows nothing about HTTP or entity shapes. It:
//! - Addresses entries by [`QueryKey`] (resource + params)
//! - Tracks each entry through `Fetching → Fresh → Stale` (and `Error`)
//! - Notifies subscribers on every write, patch and invalidation
//! - Guards against late fetch results overwriting newer data
//! - Evicts entries nobody has watched for a while

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, CacheEvent, CacheStatus};
pub use key::{KeyFilter, KeyParam, Params, QueryKey, DETAIL_PARAM};
pub use store::{CacheOptions, Callback, FetchTicket, QueryCache, Subscription};
