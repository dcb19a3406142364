//! Presence members and subscription ids.
//!
//! A member is the caller's user object with a `subscriptionId` field added
//! by the channel. Handlers only ever see the broadcast projection, a copy
//! with that field removed.

use crate::config::{IdStrategy, SubscriptionIdConfig, DEFAULT_ID_UPPER_BOUND};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier assigned to a member when it joins.
pub type SubscriptionId = u32;

/// Name of the field carrying the subscription id on a member record.
pub const SUBSCRIPTION_ID_FIELD: &str = "subscriptionId";

/// A member of a presence channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    subscription_id: SubscriptionId,
    record: Map<String, Value>,
}

impl Member {
    /// Create a member from a user object.
    ///
    /// Any `subscriptionId` already present on the object is overwritten.
    #[must_use]
    pub fn new(mut record: Map<String, Value>, subscription_id: SubscriptionId) -> Self {
        record.insert(
            SUBSCRIPTION_ID_FIELD.to_string(),
            Value::from(subscription_id),
        );
        Self {
            subscription_id,
            record,
        }
    }

    /// Get the subscription id.
    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Get the stored record, including the subscription id.
    #[must_use]
    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    /// Get the stored record as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.record.clone())
    }

    /// Get the broadcast projection: a deep copy without the subscription id.
    #[must_use]
    pub fn broadcast_user(&self) -> Value {
        let mut user = self.record.clone();
        user.remove(SUBSCRIPTION_ID_FIELD);
        Value::Object(user)
    }
}

enum Allocator {
    Random { rng: StdRng, upper_bound: u32 },
    Sequential { next: SubscriptionId },
}

/// Allocates subscription ids for one presence channel.
///
/// The random strategy draws uniformly from `0..upper_bound` without a
/// collision check, so two members may share an id. The sequential strategy
/// never repeats an id until it wraps around `u32::MAX`.
pub struct SubscriptionIds {
    allocator: Allocator,
}

impl SubscriptionIds {
    /// Random ids in `0..upper_bound` from an entropy-seeded generator.
    #[must_use]
    pub fn random(upper_bound: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), upper_bound)
    }

    /// Random ids in `0..upper_bound` from a fixed seed.
    #[must_use]
    pub fn seeded(upper_bound: u32, seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), upper_bound)
    }

    /// Sequential ids starting at zero.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            allocator: Allocator::Sequential { next: 0 },
        }
    }

    /// Build an allocator from configuration.
    #[must_use]
    pub fn from_config(config: &SubscriptionIdConfig) -> Self {
        match (config.strategy, config.seed) {
            (IdStrategy::Sequential, _) => Self::sequential(),
            (IdStrategy::Random, Some(seed)) => Self::seeded(config.upper_bound, seed),
            (IdStrategy::Random, None) => Self::random(config.upper_bound),
        }
    }

    fn with_rng(rng: StdRng, upper_bound: u32) -> Self {
        Self {
            allocator: Allocator::Random {
                rng,
                // An empty range cannot be sampled
                upper_bound: upper_bound.max(1),
            },
        }
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> SubscriptionId {
        match &mut self.allocator {
            Allocator::Random { rng, upper_bound } => rng.gen_range(0..*upper_bound),
            Allocator::Sequential { next } => {
                let id = *next;
                *next = next.wrapping_add(1);
                id
            }
        }
    }
}

impl Default for SubscriptionIds {
    fn default() -> Self {
        Self::random(DEFAULT_ID_UPPER_BOUND)
    }
}

impl fmt::Debug for SubscriptionIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.allocator {
            Allocator::Random { upper_bound, .. } => f
                .debug_struct("SubscriptionIds")
                .field("strategy", &IdStrategy::Random)
                .field("upper_bound", upper_bound)
                .finish(),
            Allocator::Sequential { next } => f
                .debug_struct("SubscriptionIds")
                .field("strategy", &IdStrategy::Sequential)
                .field("next", next)
                .finish(),
        }
    }
}
