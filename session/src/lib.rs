#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative simulation session for the Sankey flow engine.
//!
//! A [`Session`] owns everything a run needs: the distribution table, the
//! particle population, the seeded random source, and the clock. It only
//! changes through [`apply`], and exposes read-only views through [`query`].

mod population;

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sankey_flow_core::{
    Category, Command, DistributionTable, EngineConfig, Event, FlowError, FlowSnapshot,
    LaneGeometry, LaneLayout, RunId, RunPhase, StopReason,
};
use sankey_flow_system_aggregation::Aggregator;
use sankey_flow_system_generation::{Config as GenerationConfig, ParticleGenerator};
use tracing::{debug, error, info};

use crate::population::Population;

const RUN_SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Represents the authoritative state of the animated flow.
#[derive(Debug)]
pub struct Session {
    table: DistributionTable,
    config: EngineConfig,
    layout: LaneLayout,
    base_seed: u64,
    phase: RunPhase,
    run: RunId,
    categories: Vec<Category>,
    generator: ParticleGenerator,
    rng: ChaCha8Rng,
    aggregator: Aggregator,
    population: Population,
    clock: Duration,
    stop_at: Option<Duration>,
    failure: Option<FlowError>,
    snapshot: FlowSnapshot,
}

impl Session {
    /// Creates an idle session over the provided table, tuning, and lane layout.
    ///
    /// Every run derives its random stream from `seed` and the run identifier, so
    /// a session replays identically for the same command sequence.
    pub fn new(
        table: DistributionTable,
        config: EngineConfig,
        layout: LaneLayout,
        seed: u64,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        if layout.start_count() < table.starts().len() || layout.end_count() < table.ends().len()
        {
            return Err(FlowError::InvalidConfig(format!(
                "layout provides {} start and {} end lanes, table declares {} and {}",
                layout.start_count(),
                layout.end_count(),
                table.starts().len(),
                table.ends().len()
            )));
        }

        Ok(Self {
            generator: ParticleGenerator::new(GenerationConfig::from_engine(&config)),
            rng: ChaCha8Rng::seed_from_u64(seed),
            table,
            config,
            layout,
            base_seed: seed,
            phase: RunPhase::Idle,
            run: RunId::default(),
            categories: Vec::new(),
            aggregator: Aggregator::new(),
            population: Population::default(),
            clock: Duration::ZERO,
            stop_at: None,
            failure: None,
            snapshot: FlowSnapshot::default(),
        })
    }

    /// Creates an idle session whose lanes follow the default chart geometry.
    pub fn with_default_layout(
        table: DistributionTable,
        config: EngineConfig,
        seed: u64,
    ) -> Result<Self, FlowError> {
        let layout = LaneLayout::from_geometry(
            &LaneGeometry::default(),
            table.starts().len(),
            table.ends().len(),
        );
        Self::new(table, config, layout, seed)
    }

    fn simulate(&mut self, categories: Vec<Category>, out_events: &mut Vec<Event>) {
        if categories.is_empty() {
            debug!("simulation request without categories rejected");
            out_events.push(Event::SimulationRejected {
                reason: FlowError::EmptySelection,
            });
            return;
        }

        self.stop(StopReason::Superseded, out_events);

        self.run = self.run.next();
        self.phase = RunPhase::Running;
        self.categories = categories;
        self.generator = ParticleGenerator::new(GenerationConfig::from_engine(&self.config));
        self.rng = ChaCha8Rng::seed_from_u64(derive_run_seed(self.base_seed, self.run));
        self.population.clear();
        self.clock = Duration::ZERO;
        self.stop_at = None;
        self.failure = None;
        self.publish_snapshot();

        info!(
            run = self.run.get(),
            categories = ?self.categories,
            "flow simulation started"
        );
        out_events.push(Event::RunStarted {
            run: self.run,
            categories: self.categories.clone(),
        });
    }

    fn tick(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        if self.phase != RunPhase::Running {
            return;
        }

        self.clock = self.clock.saturating_add(dt);
        out_events.push(Event::TimeAdvanced { dt });

        if self.population.len() <= self.config.population_cap {
            let first = self.generator.next_id();
            let mut batch = Vec::with_capacity(self.config.spawn_increment);
            let generated = self.generator.generate_batch(
                self.config.spawn_increment,
                self.clock,
                &self.categories,
                &self.table,
                &mut self.rng,
                &mut batch,
            );
            if let Err(error) = generated {
                self.fail(error, out_events);
                return;
            }
            let count = batch.len();
            self.population.extend(batch);
            out_events.push(Event::ParticlesSpawned { first, count });
        }

        let arrived = self
            .population
            .retire_arrived(self.clock, self.config.flight_duration);
        if arrived > 0 {
            out_events.push(Event::ParticlesArrived {
                count: arrived,
                total_arrived: self.population.arrived().len(),
            });
        }

        self.publish_snapshot();
        self.check_saturation(out_events);
    }

    fn check_saturation(&mut self, out_events: &mut Vec<Event>) {
        if self.population.arrived().len() < self.config.population_cap {
            return;
        }

        let stop_at = match self.stop_at {
            Some(stop_at) => stop_at,
            None => {
                let stop_at = self.clock.saturating_add(self.config.grace_period);
                self.stop_at = Some(stop_at);
                debug!(
                    run = self.run.get(),
                    arrived = self.population.arrived().len(),
                    "arrival target met, draining"
                );
                out_events.push(Event::RunDraining { stop_at });
                stop_at
            }
        };

        if self.clock >= stop_at {
            self.stop(StopReason::Saturated, out_events);
        }
    }

    fn stop(&mut self, reason: StopReason, out_events: &mut Vec<Event>) {
        if self.phase != RunPhase::Running {
            return;
        }

        self.phase = RunPhase::Stopped;
        self.stop_at = None;
        info!(
            run = self.run.get(),
            ?reason,
            population = self.population.len(),
            arrived = self.population.arrived().len(),
            "flow simulation stopped"
        );
        out_events.push(Event::RunStopped {
            run: self.run,
            reason,
        });
    }

    fn fail(&mut self, error: FlowError, out_events: &mut Vec<Event>) {
        error!(run = self.run.get(), %error, "flow simulation failed");
        self.phase = RunPhase::Failed;
        self.stop_at = None;
        self.failure = Some(error.clone());
        out_events.push(Event::RunFailed {
            run: self.run,
            error,
        });
    }

    fn publish_snapshot(&mut self) {
        let report = self.aggregator.aggregate(
            self.population.arrived(),
            self.table.ends().len(),
            &self.categories,
        );
        self.snapshot = FlowSnapshot {
            run: self.run,
            clock: self.clock,
            visible: self.population.visible(
                self.clock,
                self.config.flight_duration,
                &self.layout,
            ),
            report,
            population: self.population.len(),
            arrived: self.population.arrived().len(),
        };
    }
}

fn derive_run_seed(base_seed: u64, run: RunId) -> u64 {
    base_seed ^ u64::from(run.get()).wrapping_mul(RUN_SEED_MIX)
}

/// Applies the provided command to the session, emitting resulting events.
pub fn apply(session: &mut Session, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Simulate { categories } => session.simulate(categories, out_events),
        Command::Tick { dt } => session.tick(dt, out_events),
        Command::Stop => session.stop(StopReason::Cancelled, out_events),
    }
}

/// Read-only queries exposing the session state.
pub mod query {
    use std::time::Duration;

    use sankey_flow_core::{
        Category, DistributionTable, EngineConfig, FlowError, FlowSnapshot, LaneLayout, Particle,
        RunId, RunPhase,
    };

    use super::Session;

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(session: &Session) -> RunPhase {
        session.phase
    }

    /// Identifier of the most recently started run.
    #[must_use]
    pub fn run(session: &Session) -> RunId {
        session.run
    }

    /// Clock value of the current run.
    #[must_use]
    pub fn clock(session: &Session) -> Duration {
        session.clock
    }

    /// Selection the current run samples from.
    #[must_use]
    pub fn categories(session: &Session) -> &[Category] {
        &session.categories
    }

    /// Snapshot produced by the latest tick, frozen once the run halts.
    #[must_use]
    pub fn snapshot(session: &Session) -> &FlowSnapshot {
        &session.snapshot
    }

    /// Particles still travelling.
    #[must_use]
    pub fn in_flight(session: &Session) -> &[Particle] {
        session.population.in_flight()
    }

    /// Particles that reached their end-state, in arrival order.
    #[must_use]
    pub fn arrived(session: &Session) -> &[Particle] {
        session.population.arrived()
    }

    /// Number of particles created in the current run.
    #[must_use]
    pub fn population(session: &Session) -> usize {
        session.population.len()
    }

    /// Error that halted the current run, if it failed.
    #[must_use]
    pub fn failure(session: &Session) -> Option<&FlowError> {
        session.failure.as_ref()
    }

    /// Distribution table shared by every run.
    #[must_use]
    pub fn table(session: &Session) -> &DistributionTable {
        &session.table
    }

    /// Lane layout used to position particles.
    #[must_use]
    pub fn layout(session: &Session) -> &LaneLayout {
        &session.layout
    }

    /// Engine tuning shared by every run.
    #[must_use]
    pub fn config(session: &Session) -> &EngineConfig {
        &session.config
    }
}
