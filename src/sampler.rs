use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{error::QuoteError, schema::MessageRecord};

/// Engagement weight of a message. The `+ 1` keeps unreacted messages in play.
pub fn weight(record: &MessageRecord) -> u64 {
    record.reaction_count.saturating_add(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub weight: u64,
    pub total_weight: u64,
}

/// Roulette-wheel sampler over message records.
pub struct WeightedSampler<R = StdRng> {
    rng: R,
}

impl WeightedSampler<StdRng> {
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> WeightedSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Draws one index with probability `weight(i) / total`.
    pub fn sample(&mut self, records: &[MessageRecord]) -> Result<Selection, QuoteError> {
        self.sample_by(records, weight)
    }

    pub fn sample_by<T>(
        &mut self,
        items: &[T],
        weight_of: impl Fn(&T) -> u64,
    ) -> Result<Selection, QuoteError> {
        if items.is_empty() {
            return Err(QuoteError::EmptyPool);
        }

        let weights: Vec<u64> = items.iter().map(|item| weight_of(item).max(1)).collect();
        let total_weight = weights.iter().fold(0u64, |acc, w| acc.saturating_add(*w));

        let mut remainder = self.rng.random_range(0..total_weight);
        for (index, w) in weights.iter().copied().enumerate() {
            if remainder < w {
                return Ok(Selection {
                    index,
                    weight: w,
                    total_weight,
                });
            }
            remainder -= w;
        }

        // Only reachable if the total saturated; the tail absorbs the overflow.
        let index = weights.len() - 1;
        Ok(Selection {
            index,
            weight: weights[index],
            total_weight,
        })
    }

    /// Uniform index in `0..len`, `None` when `len == 0`.
    pub fn choose_uniform(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.random_range(0..len))
    }
}
