#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Arrival aggregation system that summarises finished particles per end-state.
//!
//! Statistics are recomputed in full from the arrived set on every call. The
//! output depends only on the inputs: end-states come out in declared order,
//! and categories within each end-state follow the selection order so that
//! stacked segments stay stable between ticks.

use sankey_flow_core::{
    ArrivalReport, ArrivalStat, Category, CategoryIndex, CountRange, EndIndex, EndStateStats,
    Particle, PercentRange,
};

/// Aggregates `arrived` into per-end-state, per-category statistics.
#[must_use]
pub fn aggregate(
    arrived: &[Particle],
    end_count: usize,
    active_categories: &[Category],
) -> ArrivalReport {
    Aggregator::new().aggregate(arrived, end_count, active_categories)
}

/// Aggregation system that reuses its counting buffer across ticks.
#[derive(Debug, Default)]
pub struct Aggregator {
    counts: Vec<u64>,
}

impl Aggregator {
    /// Creates an aggregator with an empty counting buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates `arrived` into per-end-state, per-category statistics.
    ///
    /// Particles that refer to an end-state or category outside the provided
    /// ranges are not counted.
    pub fn aggregate(
        &mut self,
        arrived: &[Particle],
        end_count: usize,
        active_categories: &[Category],
    ) -> ArrivalReport {
        let category_count = active_categories.len();
        self.counts.clear();
        self.counts.resize(end_count * category_count, 0);

        for particle in arrived {
            let end = particle.end.get();
            let category = particle.category_index.get();
            if end < end_count && category < category_count {
                self.counts[end * category_count + category] += 1;
            }
        }

        let ends = (0..end_count)
            .map(|end| {
                let row = &self.counts[end * category_count..(end + 1) * category_count];
                end_state_stats(EndIndex::new(end), row, active_categories)
            })
            .collect();
        ArrivalReport::new(ends)
    }
}

fn end_state_stats(end: EndIndex, counts: &[u64], categories: &[Category]) -> EndStateStats {
    let total: u64 = counts.iter().sum();
    let mut running = 0;

    let stats = counts
        .iter()
        .zip(categories)
        .enumerate()
        .map(|(index, (&count, category))| {
            let stacked_count = CountRange {
                from: running,
                to: running + count,
            };
            running += count;

            ArrivalStat {
                end,
                category_index: CategoryIndex::new(index),
                category: category.clone(),
                count,
                stacked_count,
                percentage: share(count, total),
                stacked_percentage: PercentRange {
                    from: share(stacked_count.from, total),
                    to: share(stacked_count.to, total),
                },
                total_at_end: total,
            }
        })
        .collect();

    EndStateStats {
        end,
        total,
        categories: stats,
    }
}

/// Share of `part` in `total`; an end-state without arrivals reports zero.
fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
