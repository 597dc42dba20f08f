#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Sankey flow engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative simulation session, and pure systems. Adapters submit
//! [`Command`] values describing desired transitions, the session executes
//! them via its `apply` entry point, and then broadcasts [`Event`] values
//! describing what happened. Each tick while a run is live produces an
//! immutable [`FlowSnapshot`] that render adapters consume read-only.

mod distribution;
mod error;
mod layout;

use std::{borrow::Borrow, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

pub use distribution::{
    CumulativeDistribution, DistributionProblem, DistributionTable, DistributionTableBuilder,
    CUMULATIVE_TOLERANCE,
};
pub use error::FlowError;
pub use layout::{LaneGeometry, LaneLayout, TRANSITION_WINDOW};

/// Label identifying a population group such as a gender or an age band.
///
/// Labels are cheap to clone so every particle can carry the category it was
/// sampled for without copying string data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(Arc<str>);

impl Category {
    /// Creates a new category label.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Category {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Unique identifier assigned to a particle at creation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ParticleId(u64);

impl ParticleId {
    /// Creates a new particle identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the identifier that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Identifier of a simulation run, incremented by every accepted `Simulate`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct RunId(u32);

impl RunId {
    /// Creates a new run identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the identifier that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Position of a category within the active selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryIndex(usize);

impl CategoryIndex {
    /// Creates a new selection index.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Zero-based index into the active selection.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

/// Position of a start-state within the declared start list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StartIndex(usize);

impl StartIndex {
    /// Creates a new start-state index.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Zero-based index into the declared start list.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

/// Position of an end-state within the declared end list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndIndex(usize);

impl EndIndex {
    /// Creates a new end-state index.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Zero-based index into the declared end list.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

/// One simulated individual travelling from a start-state to an end-state.
///
/// Particles carry no lifecycle flag. Whether a particle is still in flight
/// is always derived from the clock through [`Particle::progress`].
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    /// Identifier assigned by the generator, strictly increasing within a run.
    pub id: ParticleId,
    /// Index of the sampled category within the selection active at creation.
    pub category_index: CategoryIndex,
    /// Label of the sampled category.
    pub category: Category,
    /// Start-state the particle departs from.
    pub start: StartIndex,
    /// End-state the particle was routed to.
    pub end: EndIndex,
    /// Clock value at creation, in seconds, including the symmetric spawn jitter.
    pub spawned_at: f64,
    /// Fixed vertical offset within the lane, used only for presentation.
    pub lateral_jitter: f32,
    /// Multiplier applied to the progress rate so particles do not move in lock-step.
    pub speed_factor: f64,
}

impl Particle {
    /// Computes the flight progress at the provided clock value.
    ///
    /// Values below `1.0` mean the particle is still in flight. The result may
    /// be slightly negative right after creation because of the spawn jitter.
    #[must_use]
    pub fn progress(&self, clock: Duration, flight_duration: Duration) -> f64 {
        let flight = flight_duration.as_secs_f64();
        if flight <= 0.0 {
            return f64::INFINITY;
        }
        (clock.as_secs_f64() - self.spawned_at) / flight * self.speed_factor
    }

    /// Reports whether the particle reached its end-state at the provided clock value.
    #[must_use]
    pub fn has_arrived(&self, clock: Duration, flight_duration: Duration) -> bool {
        self.progress(clock, flight_duration) >= 1.0
    }
}

/// Presentation coordinates of an in-flight particle.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ParticlePosition {
    /// Horizontal coordinate, proportional to flight progress.
    pub x: f32,
    /// Vertical coordinate interpolated between the start and end lanes.
    pub y: f32,
}

impl ParticlePosition {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// In-flight particle together with the values derived for the current tick.
#[derive(Clone, Debug, PartialEq)]
pub struct VisibleParticle {
    /// Particle being presented.
    pub particle: Particle,
    /// Progress derived from the tick's clock value.
    pub progress: f64,
    /// Position derived from the progress and the lane layout.
    pub position: ParticlePosition,
}

/// Half-open cumulative count range used to stack categories at an end-state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CountRange {
    /// Arrivals of all earlier categories at the end-state.
    pub from: u64,
    /// `from` plus the arrivals of this category.
    pub to: u64,
}

/// Stacked share range `[from, to]` within an end-state.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentRange {
    /// Lower bound of the stacked share, in `0.0..=1.0`.
    pub from: f64,
    /// Upper bound of the stacked share, in `0.0..=1.0`.
    pub to: f64,
}

/// Arrival statistics of one category at one end-state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrivalStat {
    /// End-state the statistic describes.
    pub end: EndIndex,
    /// Position of the category within the active selection.
    pub category_index: CategoryIndex,
    /// Label of the category.
    pub category: Category,
    /// Arrivals of this category at the end-state since the run started.
    pub count: u64,
    /// Cumulative count range used for visual stacking.
    pub stacked_count: CountRange,
    /// Share of the end-state's arrivals, or `0.0` while the end-state has none.
    pub percentage: f64,
    /// Cumulative share range used for visual stacking.
    pub stacked_percentage: PercentRange,
    /// Arrivals at the end-state summed across categories.
    pub total_at_end: u64,
}

/// Statistics of every selected category at a single end-state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndStateStats {
    /// End-state described by the entry.
    pub end: EndIndex,
    /// Arrivals at the end-state summed across categories.
    pub total: u64,
    /// Per-category statistics in selection order.
    pub categories: Vec<ArrivalStat>,
}

impl EndStateStats {
    /// Reports whether any particle arrived at the end-state yet.
    ///
    /// Percentages are reported as zero while this returns `false`; adapters
    /// use the flag to tell "no data yet" apart from a genuine zero share.
    #[must_use]
    pub const fn has_arrivals(&self) -> bool {
        self.total > 0
    }
}

/// Aggregated arrival statistics for every end-state, in declared order.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrivalReport {
    ends: Vec<EndStateStats>,
}

impl ArrivalReport {
    /// Creates a report from per-end-state entries.
    #[must_use]
    pub fn new(ends: Vec<EndStateStats>) -> Self {
        Self { ends }
    }

    /// Per-end-state entries in declared end order.
    #[must_use]
    pub fn ends(&self) -> &[EndStateStats] {
        &self.ends
    }

    /// Flattened statistics: end-states in declared order, categories in selection order.
    pub fn stats(&self) -> impl Iterator<Item = &ArrivalStat> {
        self.ends.iter().flat_map(|entry| entry.categories.iter())
    }

    /// Total number of arrivals across every end-state.
    #[must_use]
    pub fn total_arrivals(&self) -> u64 {
        self.ends.iter().map(|entry| entry.total).sum()
    }
}

/// Immutable view of one tick, handed to render adapters.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FlowSnapshot {
    /// Run that produced the snapshot.
    pub run: RunId,
    /// Clock value of the tick.
    pub clock: Duration,
    /// Particles still in flight, with derived progress and position.
    pub visible: Vec<VisibleParticle>,
    /// Arrival statistics recomputed from every arrived particle.
    pub report: ArrivalReport,
    /// Number of particles created in the run so far.
    pub population: usize,
    /// Number of particles that reached their end-state.
    pub arrived: usize,
}

/// Lifecycle of the simulation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RunPhase {
    /// No run has been requested yet.
    #[default]
    Idle,
    /// A run is live and advances on every tick.
    Running,
    /// The run halted; population and statistics stay frozen.
    Stopped,
    /// The run halted because a particle could not be sampled.
    Failed,
}

/// Reasons a live run stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Enough particles arrived and the grace delay elapsed.
    Saturated,
    /// A new selection replaced the run.
    Superseded,
    /// The caller requested the run to stop.
    Cancelled,
}

/// Commands that express all permissible session transitions.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Starts a new run for the provided category selection, replacing any live run.
    Simulate {
        /// Active categories in display order.
        categories: Vec<Category>,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Halts the live run, if any.
    Stop,
}

/// Events broadcast by the session after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Announces that a new run started from an empty population.
    RunStarted {
        /// Identifier of the new run.
        run: RunId,
        /// Selection the run samples from.
        categories: Vec<Category>,
    },
    /// Reports that a `Simulate` request was refused and nothing changed.
    SimulationRejected {
        /// Specific reason the request failed.
        reason: FlowError,
    },
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that new particles joined the population.
    ParticlesSpawned {
        /// Identifier of the first particle in the batch.
        first: ParticleId,
        /// Number of particles in the batch.
        count: usize,
    },
    /// Reports particles that reached their end-state during the tick.
    ParticlesArrived {
        /// Number of particles that arrived during the tick.
        count: usize,
        /// Number of particles arrived since the run started.
        total_arrived: usize,
    },
    /// Announces that the arrival target was met and the grace delay began.
    RunDraining {
        /// Clock value at which the run halts.
        stop_at: Duration,
    },
    /// Confirms that a run halted.
    RunStopped {
        /// Identifier of the run that halted.
        run: RunId,
        /// Why the run halted.
        reason: StopReason,
    },
    /// Reports that a run halted because sampling failed.
    RunFailed {
        /// Identifier of the run that failed.
        run: RunId,
        /// Configuration defect that stopped the run.
        error: FlowError,
    },
}

/// Inclusive range the per-particle speed factor is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    /// Slowest speed factor.
    pub min: f64,
    /// Fastest speed factor.
    pub max: f64,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self { min: 0.8, max: 1.2 }
    }
}

/// Tuning knobs controlling population growth, timing, and jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Population size at which generation stops; also the arrival count that ends the run.
    pub population_cap: usize,
    /// Number of particles generated per tick while the population is at or below the cap.
    pub spawn_increment: usize,
    /// Time a particle with speed factor `1.0` needs to travel from start to end.
    pub flight_duration: Duration,
    /// Spawn-time jitter as a fraction of the flight duration in `0.0..=1.0`, applied symmetrically.
    pub spawn_jitter: f64,
    /// Range of the per-particle speed factor.
    pub speed: SpeedRange,
    /// Half the lane width available for lateral jitter.
    pub lane_half_width: f32,
    /// Delay between meeting the arrival target and halting the clock.
    pub grace_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            population_cap: 10_000,
            spawn_increment: 2,
            flight_duration: Duration::from_secs(10),
            spawn_jitter: 0.1,
            speed: SpeedRange::default(),
            lane_half_width: LaneGeometry::default().lane_half_width(),
            grace_period: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Checks that every knob holds a usable value.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.population_cap == 0 {
            return Err(FlowError::InvalidConfig(
                "population cap must be at least one".to_owned(),
            ));
        }
        if self.flight_duration.is_zero() {
            return Err(FlowError::InvalidConfig(
                "flight duration must be non-zero".to_owned(),
            ));
        }
        if self.spawn_increment == 0 {
            return Err(FlowError::InvalidConfig(
                "spawn increment must be at least one".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.spawn_jitter) {
            return Err(FlowError::InvalidConfig(format!(
                "spawn jitter {} must be a fraction of the flight duration in [0, 1]",
                self.spawn_jitter
            )));
        }
        let SpeedRange { min, max } = self.speed;
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            return Err(FlowError::InvalidConfig(format!(
                "speed range [{min}, {max}] must be positive and ordered"
            )));
        }
        if !self.lane_half_width.is_finite() || self.lane_half_width < 0.0 {
            return Err(FlowError::InvalidConfig(format!(
                "lane half-width {} must be non-negative",
                self.lane_half_width
            )));
        }
        Ok(())
    }
}
