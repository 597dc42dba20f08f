use crate::{EndIndex, Particle, ParticlePosition, StartIndex};

/// Share of the flight during which the vertical move between lanes happens.
///
/// Progress below the window keeps a particle on its start lane, progress
/// above it keeps the particle on its end lane.
pub const TRANSITION_WINDOW: (f64, f64) = (0.42, 0.58);

/// Chart dimensions used to place lanes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneGeometry {
    /// Total chart width.
    pub width: f32,
    /// Space above the first lane.
    pub margin_top: f32,
    /// Space right of the end bars, reserved for statistics labels.
    pub margin_right: f32,
    /// Space below the last lane.
    pub margin_bottom: f32,
    /// Space left of the start lanes.
    pub margin_left: f32,
    /// Thickness of a lane.
    pub path_width: f32,
    /// Gap between neighbouring lanes.
    pub path_padding: f32,
    /// Diameter reserved for a particle.
    pub item_size: f32,
}

impl Default for LaneGeometry {
    fn default() -> Self {
        Self {
            width: 800.0,
            margin_top: 80.0,
            margin_right: 250.0,
            margin_bottom: 40.0,
            margin_left: 40.0,
            path_width: 80.0,
            path_padding: 48.0,
            item_size: 12.0,
        }
    }
}

impl LaneGeometry {
    /// Half the lane width a particle may drift away from the lane centre.
    #[must_use]
    pub fn lane_half_width(&self) -> f32 {
        ((self.path_width - self.item_size - 4.0) / 2.0).max(0.0)
    }

    /// Chart height needed to stack `lanes` lanes.
    #[must_use]
    pub fn height(&self, lanes: usize) -> f32 {
        let lanes = lanes.max(1) as f32;
        lanes * (self.path_width + self.path_padding) - self.path_padding
            + self.margin_top
            + self.margin_bottom
    }
}

/// Resolved lane positions used to place in-flight particles.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneLayout {
    x_start: f32,
    x_end: f32,
    height: f32,
    path_width: f32,
    start_lanes: Vec<f32>,
    end_lanes: Vec<f32>,
}

impl LaneLayout {
    /// Derives lanes for `starts` start-states and `ends` end-states.
    ///
    /// End lanes are spaced evenly from the top lane to the bottom lane. A single
    /// start-state sits on the bottom lane, several share the same spacing.
    #[must_use]
    pub fn from_geometry(geometry: &LaneGeometry, starts: usize, ends: usize) -> Self {
        let height = geometry.height(starts.max(ends));
        let top = geometry.margin_top + geometry.path_width / 2.0;
        let bottom = height - geometry.margin_bottom - geometry.path_width / 2.0;

        let start_lanes = if starts == 1 {
            vec![bottom]
        } else {
            point_scale(starts, top, bottom)
        };

        Self {
            x_start: geometry.margin_left,
            x_end: geometry.width - geometry.margin_right,
            height,
            path_width: geometry.path_width,
            start_lanes,
            end_lanes: point_scale(ends, top, bottom),
        }
    }

    /// Horizontal extent `(start, end)` travelled by particles.
    #[must_use]
    pub const fn x_range(&self) -> (f32, f32) {
        (self.x_start, self.x_end)
    }

    /// Total chart height.
    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// Thickness of a lane.
    #[must_use]
    pub const fn path_width(&self) -> f32 {
        self.path_width
    }

    /// Vertical centre of a start lane.
    #[must_use]
    pub fn start_lane(&self, start: StartIndex) -> Option<f32> {
        self.start_lanes.get(start.get()).copied()
    }

    /// Vertical centre of an end lane.
    #[must_use]
    pub fn end_lane(&self, end: EndIndex) -> Option<f32> {
        self.end_lanes.get(end.get()).copied()
    }

    /// Number of start lanes.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.start_lanes.len()
    }

    /// Number of end lanes.
    #[must_use]
    pub fn end_count(&self) -> usize {
        self.end_lanes.len()
    }

    /// Maps flight progress onto the vertical move, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn vertical_progress(progress: f64) -> f64 {
        let (from, to) = TRANSITION_WINDOW;
        ((progress - from) / (to - from)).clamp(0.0, 1.0)
    }

    /// Positions a particle at the provided progress.
    ///
    /// Returns `None` when the particle refers to a lane the layout does not have.
    #[must_use]
    pub fn position(&self, particle: &Particle, progress: f64) -> Option<ParticlePosition> {
        let y_start = self.start_lane(particle.start)?;
        let y_end = self.end_lane(particle.end)?;

        let horizontal = progress.clamp(0.0, 1.0) as f32;
        let vertical = Self::vertical_progress(progress) as f32;
        let x = self.x_start + (self.x_end - self.x_start) * horizontal;
        let y = y_start + (y_end - y_start) * vertical + particle.lateral_jitter;
        Some(ParticlePosition::new(x, y))
    }
}

fn point_scale(count: usize, from: f32, to: f32) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![(from + to) / 2.0],
        _ => {
            let step = (to - from) / (count - 1) as f32;
            (0..count).map(|index| from + step * index as f32).collect()
        }
    }
}
