use std::time::Duration;

use sankey_flow_core::{LaneLayout, Particle, ParticlePosition, VisibleParticle};

/// Particles of the live run, split by their derived lifecycle.
///
/// Arrived particles are never moved back or re-classified.
#[derive(Debug, Default)]
pub(crate) struct Population {
    in_flight: Vec<Particle>,
    arrived: Vec<Particle>,
}

impl Population {
    pub(crate) fn clear(&mut self) {
        self.in_flight.clear();
        self.arrived.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.in_flight.len() + self.arrived.len()
    }

    pub(crate) fn in_flight(&self) -> &[Particle] {
        &self.in_flight
    }

    pub(crate) fn arrived(&self) -> &[Particle] {
        &self.arrived
    }

    pub(crate) fn extend(&mut self, batch: Vec<Particle>) {
        self.in_flight.extend(batch);
    }

    /// Moves every in-flight particle whose progress reached one into the arrived set.
    pub(crate) fn retire_arrived(&mut self, clock: Duration, flight: Duration) -> usize {
        let (finished, live): (Vec<Particle>, Vec<Particle>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|particle| particle.has_arrived(clock, flight));
        self.in_flight = live;
        let count = finished.len();
        self.arrived.extend(finished);
        count
    }

    pub(crate) fn visible(
        &self,
        clock: Duration,
        flight: Duration,
        layout: &LaneLayout,
    ) -> Vec<VisibleParticle> {
        self.in_flight
            .iter()
            .map(|particle| {
                let progress = particle.progress(clock, flight);
                let position = layout
                    .position(particle, progress)
                    .unwrap_or_else(|| ParticlePosition::new(layout.x_range().0, 0.0));
                VisibleParticle {
                    particle: particle.clone(),
                    progress,
                    position,
                }
            })
            .collect()
    }
}
