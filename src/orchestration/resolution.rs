//! Automated resolution strategies for auto-resolvable exceptions.
//!
//! The tracker only sees the [`ResolutionStrategy`] seam. Real integrations
//! (payment retry, address lookup, stock check) plug in behind it; the
//! [`SimulatedResolutionStrategy`] succeeds with a configured probability per
//! exception type.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::SuccessRates;
use crate::models::{Order, OrderException};

/// Outcome of a single automated attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionAttempt {
    pub success: bool,
    pub notes: String,
}

#[async_trait]
pub trait ResolutionStrategy: Send + Sync + 'static {
    async fn attempt(&self, exception: &OrderException, order: &Order) -> ResolutionAttempt;
}

#[derive(Debug)]
pub struct SimulatedResolutionStrategy {
    rates: SuccessRates,
    rng: Mutex<StdRng>,
}

impl SimulatedResolutionStrategy {
    pub fn new(rates: SuccessRates) -> Self {
        Self {
            rates,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests and replays.
    pub fn with_seed(rates: SuccessRates, seed: u64) -> Self {
        Self {
            rates,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ResolutionStrategy for SimulatedResolutionStrategy {
    async fn attempt(&self, exception: &OrderException, _order: &Order) -> ResolutionAttempt {
        let probability = self.rates.for_type(exception.exception_type);
        let roll: f64 = self.rng.lock().gen();
        let success = roll < probability;

        let notes = if success {
            format!("Automated {} succeeded", exception.exception_type)
        } else {
            format!(
                "Automated {} failed (attempt {})",
                exception.exception_type,
                exception.auto_resolution_attempts + 1
            )
        };
        ResolutionAttempt { success, notes }
    }
}
