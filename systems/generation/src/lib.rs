#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Particle generation system that routes new particles through empirical distributions.
//!
//! Every particle samples a category uniformly from the selection supplied on
//! that call, a start-state uniformly from the declared starts, and an
//! end-state by inverse-CDF lookup in the `(category, start)` distribution.
//! All randomness flows through the caller's generator so runs replay exactly
//! under a fixed seed.

use std::time::Duration;

use rand::Rng;
use sankey_flow_core::{
    Category, CategoryIndex, DistributionTable, EngineConfig, FlowError, Particle, ParticleId,
    SpeedRange, StartIndex,
};

/// Configuration parameters required to construct the generation system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    flight_duration: Duration,
    spawn_jitter: f64,
    lane_half_width: f32,
    speed: SpeedRange,
}

impl Config {
    /// Creates a configuration from explicit timing and jitter parameters.
    #[must_use]
    pub const fn new(
        flight_duration: Duration,
        spawn_jitter: f64,
        lane_half_width: f32,
        speed: SpeedRange,
    ) -> Self {
        Self {
            flight_duration,
            spawn_jitter,
            lane_half_width,
            speed,
        }
    }

    /// Extracts the generation parameters from the engine tuning.
    #[must_use]
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self::new(
            engine.flight_duration,
            engine.spawn_jitter,
            engine.lane_half_width,
            engine.speed,
        )
    }
}

/// Pure system that creates particles with strictly increasing identifiers.
#[derive(Debug)]
pub struct ParticleGenerator {
    config: Config,
    next_id: ParticleId,
}

impl ParticleGenerator {
    /// Creates a generator whose first particle receives identifier zero.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            next_id: ParticleId::default(),
        }
    }

    /// Identifier the next generated particle will receive.
    #[must_use]
    pub const fn next_id(&self) -> ParticleId {
        self.next_id
    }

    /// Generates a single particle spawned around `current_time`.
    ///
    /// Always samples from `active_categories` as passed on this call. Fails with
    /// [`FlowError::MissingDistribution`] when the sampled pair has no table entry.
    pub fn generate<R>(
        &mut self,
        current_time: Duration,
        active_categories: &[Category],
        table: &DistributionTable,
        rng: &mut R,
    ) -> Result<Particle, FlowError>
    where
        R: Rng + ?Sized,
    {
        if active_categories.is_empty() {
            return Err(FlowError::EmptySelection);
        }
        let start_count = table.starts().len();
        if start_count == 0 {
            return Err(FlowError::InvalidConfig(
                "distribution table declares no start-states".to_owned(),
            ));
        }

        let category_index = rng.gen_range(0..active_categories.len());
        let category = &active_categories[category_index];
        let start = StartIndex::new(rng.gen_range(0..start_count));
        let distribution = table.lookup(category.as_str(), start)?;
        let end = distribution.sample_index(rng.gen::<f64>());

        let flight = self.config.flight_duration.as_secs_f64();
        let jitter = symmetric(rng, self.config.spawn_jitter);
        let lateral_jitter = symmetric(rng, f64::from(self.config.lane_half_width)) as f32;
        let speed_factor = self.sample_speed(rng);

        let id = self.next_id;
        self.next_id = id.next();

        Ok(Particle {
            id,
            category_index: CategoryIndex::new(category_index),
            category: category.clone(),
            start,
            end,
            spawned_at: current_time.as_secs_f64() + jitter * flight,
            lateral_jitter,
            speed_factor,
        })
    }

    /// Generates `count` particles, appending them to `out`.
    ///
    /// Stops at the first failure; particles generated before it stay in `out`.
    pub fn generate_batch<R>(
        &mut self,
        count: usize,
        current_time: Duration,
        active_categories: &[Category],
        table: &DistributionTable,
        rng: &mut R,
        out: &mut Vec<Particle>,
    ) -> Result<(), FlowError>
    where
        R: Rng + ?Sized,
    {
        out.reserve(count);
        for _ in 0..count {
            out.push(self.generate(current_time, active_categories, table, rng)?);
        }
        Ok(())
    }

    fn sample_speed<R>(&self, rng: &mut R) -> f64
    where
        R: Rng + ?Sized,
    {
        let SpeedRange { min, max } = self.config.speed;
        if min >= max {
            return min;
        }
        rng.gen_range(min..=max)
    }
}

fn symmetric<R>(rng: &mut R, half_width: f64) -> f64
where
    R: Rng + ?Sized,
{
    if half_width <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-half_width..=half_width)
}
