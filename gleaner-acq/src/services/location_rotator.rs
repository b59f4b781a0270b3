//! Location rotation bookkeeping
//!
//! Holds the ordered location list, per-location counters and the pointer to
//! the active location. Counters only grow for the lifetime of the rotator;
//! moving the pointer never touches them.

use crate::error::{AcqError, AcqResult};
use crate::models::{LocationSummary, RotationStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Per-location tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStats {
    pub accepted: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug)]
pub struct LocationRotator {
    locations: Vec<String>,
    stats: Vec<LocationStats>,
    exhausted: Vec<bool>,
    current: usize,
    items_per_location: u64,
    rng: StdRng,
}

impl LocationRotator {
    /// Create a rotator over `locations` (non-empty, no duplicates)
    ///
    /// `seed` makes [`pick_random`](Self::pick_random) reproducible.
    pub fn new(
        locations: Vec<String>,
        items_per_location: u64,
        seed: Option<u64>,
    ) -> AcqResult<Self> {
        if locations.is_empty() {
            return Err(AcqError::InvalidInput(
                "at least one location is required".to_string(),
            ));
        }
        for (i, location) in locations.iter().enumerate() {
            if location.trim().is_empty() {
                return Err(AcqError::InvalidInput("location tags must not be blank".to_string()));
            }
            if locations[..i].contains(location) {
                return Err(AcqError::InvalidInput(format!(
                    "duplicate location: {}",
                    location
                )));
            }
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            stats: vec![LocationStats::default(); locations.len()],
            exhausted: vec![false; locations.len()],
            locations,
            current: 0,
            items_per_location,
            rng,
        })
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn current(&self) -> &str {
        &self.locations[self.current]
    }

    pub fn items_per_location(&self) -> u64 {
        self.items_per_location
    }

    /// Next location in cyclic order
    pub fn advance(&mut self) -> &str {
        self.current = (self.current + 1) % self.locations.len();
        self.current()
    }

    /// Location with the fewest accepted items; earliest in list order on ties
    pub fn pick_least_used(&mut self) -> &str {
        self.current = least_used(&self.stats, 0..self.locations.len()).unwrap_or(0);
        self.current()
    }

    /// Uniformly random location
    pub fn pick_random(&mut self) -> &str {
        self.current = self.rng.gen_range(0..self.locations.len());
        self.current()
    }

    /// Accumulate counters for `location`
    pub fn record(
        &mut self,
        location: &str,
        accepted: u64,
        skipped: u64,
        errors: u64,
    ) -> AcqResult<()> {
        let index = self.index_of(location)?;
        let stats = &mut self.stats[index];
        stats.accepted += accepted;
        stats.skipped += skipped;
        stats.errors += errors;
        Ok(())
    }

    /// True once `location` has accepted its quota
    ///
    /// Unknown locations always rotate: the loop must never stay on a tag the
    /// rotator does not track.
    pub fn should_rotate(&self, location: &str) -> bool {
        self.position(location)
            .map(|i| self.quota_reached(i))
            .unwrap_or(true)
    }

    /// Mark `location` as having no more items to offer
    pub fn mark_exhausted(&mut self, location: &str) -> AcqResult<()> {
        let index = self.index_of(location)?;
        self.exhausted[index] = true;
        Ok(())
    }

    /// Marked by [`mark_exhausted`](Self::mark_exhausted) (true for unknown locations)
    pub fn is_exhausted(&self, location: &str) -> bool {
        self.position(location)
            .map(|i| self.exhausted[i])
            .unwrap_or(true)
    }

    pub fn all_unavailable(&self) -> bool {
        !(0..self.locations.len()).any(|i| self.available(i))
    }

    /// Move to the next available location according to `strategy`
    ///
    /// Returns `None` (pointer unchanged) when every location is exhausted
    /// or capped.
    pub fn select(&mut self, strategy: RotationStrategy) -> Option<&str> {
        let len = self.locations.len();
        let candidates: Vec<usize> = (0..len).filter(|&i| self.available(i)).collect();
        if candidates.is_empty() {
            return None;
        }

        self.current = match strategy {
            RotationStrategy::RoundRobin => (1..=len)
                .map(|step| (self.current + step) % len)
                .find(|&i| self.available(i))?,
            RotationStrategy::LeastUsed => least_used(&self.stats, candidates.iter().copied())?,
            RotationStrategy::Random => candidates[self.rng.gen_range(0..candidates.len())],
        };
        Some(self.current())
    }

    pub fn stats(&self, location: &str) -> Option<LocationStats> {
        self.position(location).map(|i| self.stats[i])
    }

    /// Counters for every location in list order
    pub fn all_stats(&self) -> Vec<(String, LocationStats)> {
        self.locations
            .iter()
            .cloned()
            .zip(self.stats.iter().copied())
            .collect()
    }

    /// Up to `count` locations by accepted count, descending; list order on ties
    pub fn top_locations(&self, count: usize) -> Vec<(String, LocationStats)> {
        let mut all = self.all_stats();
        // stable sort keeps list order for equal counts
        all.sort_by(|a, b| b.1.accepted.cmp(&a.1.accepted));
        all.truncate(count);
        all
    }

    pub fn summaries(&self) -> Vec<LocationSummary> {
        self.all_stats()
            .into_iter()
            .map(|(location, s)| LocationSummary {
                location,
                accepted: s.accepted,
                skipped: s.skipped,
                errors: s.errors,
            })
            .collect()
    }

    fn position(&self, location: &str) -> Option<usize> {
        self.locations.iter().position(|l| l == location)
    }

    fn index_of(&self, location: &str) -> AcqResult<usize> {
        self.position(location)
            .ok_or_else(|| AcqError::UnknownLocation(location.to_string()))
    }

    fn quota_reached(&self, index: usize) -> bool {
        self.stats[index].accepted >= self.items_per_location
    }

    fn available(&self, index: usize) -> bool {
        !self.exhausted[index] && !self.quota_reached(index)
    }
}

fn least_used(stats: &[LocationStats], indices: impl Iterator<Item = usize>) -> Option<usize> {
    // min_by_key returns the first minimum
    indices.min_by_key(|&i| stats[i].accepted)
}
