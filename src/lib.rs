//! airstatus library
//!
//! A read-through cache for FAA airport status. The [`resolver::Resolver`]
//! serves lookups from a [`store::CacheStore`] and falls back to a
//! [`fetch::StatusSource`] on a miss, refreshing record TTLs on every hit.

pub mod cli;
pub mod fetch;
pub mod record;
pub mod resolver;
pub mod store;
