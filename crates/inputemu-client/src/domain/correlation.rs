//! Request identifiers and session queue suffixes.
//!
//! Identifier zero is reserved for "do not reply" and is never produced.

use crate::domain::config::RequestIdStrategy;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of request identifiers for one session.
#[derive(Debug)]
pub enum RequestIdGenerator {
    /// Uniformly random non-zero identifiers. Collisions are possible but
    /// only matter while both calls are in flight.
    Random,
    /// Counter scoped to the session, wrapping past zero.
    Sequential(AtomicU32),
}

impl RequestIdGenerator {
    pub fn new(strategy: RequestIdStrategy) -> Self {
        match strategy {
            RequestIdStrategy::Random => RequestIdGenerator::Random,
            RequestIdStrategy::Sequential => RequestIdGenerator::Sequential(AtomicU32::new(1)),
        }
    }

    /// Next non-zero identifier.
    pub fn next_id(&self) -> u32 {
        match self {
            RequestIdGenerator::Random => rand::thread_rng().gen_range(1..=u32::MAX),
            RequestIdGenerator::Sequential(counter) => loop {
                let id = counter.fetch_add(1, Ordering::Relaxed);
                if id != 0 {
                    break id;
                }
            },
        }
    }
}

/// Random numeric suffix that makes a session's reply queue name unique.
pub fn queue_suffix() -> String {
    rand::thread_rng().gen::<u32>().to_string()
}

/// Random nonce for ping requests.
pub fn nonce() -> u64 {
    rand::thread_rng().gen()
}
