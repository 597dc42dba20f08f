#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared rendering contracts for Sankey flow adapters.
//!
//! Adapters never touch the session directly. They receive a read-only
//! [`FlowSnapshot`], turn it into a [`Scene`] with [`Scene::from_snapshot`],
//! and hand the scene to a [`RenderAdapter`].

use std::{error::Error, fmt};

use anyhow::Result as AnyResult;
use glam::Vec2;
use sankey_flow_core::{
    CategoryIndex, EndIndex, EndStateStats, FlowSnapshot, LaneLayout, ParticleId,
};

/// RGBA color used when presenting frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self::from_rgba_u8(red, green, blue, 1.0)
    }

    /// Creates a color from byte RGB values and a floating point alpha.
    #[must_use]
    pub const fn from_rgba_u8(red: u8, green: u8, blue: u8, alpha: f32) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha,
        }
    }
}

/// Colors used for particles, end bars, and statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    categories: Vec<Color>,
    empty_bar: Color,
}

impl Palette {
    /// Creates a palette; category colors cycle when the selection is larger.
    pub fn new(categories: Vec<Color>, empty_bar: Color) -> Result<Self, RenderingError> {
        if categories.is_empty() {
            return Err(RenderingError::EmptyPalette);
        }
        Ok(Self {
            categories,
            empty_bar,
        })
    }

    /// Color of the category at `index` within the active selection.
    #[must_use]
    pub fn category_color(&self, index: CategoryIndex) -> Color {
        self.categories[index.get() % self.categories.len()]
    }

    /// Neutral color of an end bar that has no arrivals yet.
    #[must_use]
    pub const fn empty_bar(&self) -> Color {
        self.empty_bar
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            categories: vec![
                Color::from_rgb_u8(0xFF, 0x9F, 0x1C),
                Color::from_rgb_u8(0x1E, 0x90, 0xFF),
            ],
            empty_bar: Color::from_rgba_u8(221, 221, 221, 0.9),
        }
    }
}

/// Presentation tuning applied while building scenes.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneStyle {
    /// Colors used across the scene.
    pub palette: Palette,
    /// Width of the stacked bar drawn at every end-state.
    pub bar_width: f32,
    /// Radius of a moving particle.
    pub particle_radius: f32,
    /// Gap between the end bars and the first statistics column.
    pub label_gap: f32,
    /// Horizontal distance between consecutive statistics columns.
    pub label_spacing: f32,
}

impl Default for SceneStyle {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            bar_width: 20.0,
            particle_radius: 3.0,
            label_gap: 10.0,
            label_spacing: 90.0,
        }
    }
}

/// Moving particle ready for presentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneParticle {
    /// Identifier of the particle.
    pub id: ParticleId,
    /// Position of the particle's category within the selection.
    pub category: CategoryIndex,
    /// Center of the particle in chart coordinates.
    pub position: Vec2,
    /// Fill color derived from the category.
    pub color: Color,
}

/// Slice of an end bar owned by one category.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarSegment {
    /// Category the segment represents.
    pub category: CategoryIndex,
    /// Distance from the top of the bar to the segment.
    pub offset: f32,
    /// Height of the segment.
    pub height: f32,
    /// Fill color derived from the category.
    pub color: Color,
}

/// Stacked bar drawn at the right edge of an end lane.
#[derive(Clone, Debug, PartialEq)]
pub struct EndBar {
    /// End-state the bar describes.
    pub end: EndIndex,
    /// Label of the end-state.
    pub label: String,
    /// Top-left corner of the bar.
    pub origin: Vec2,
    /// Bar dimensions.
    pub size: Vec2,
    /// Category segments stacked from the top, in selection order.
    pub segments: Vec<BarSegment>,
    /// Set while no particle arrived at the end-state; `segments` is then empty.
    pub empty: bool,
    /// Fill drawn behind the segments, the palette's empty color.
    pub background: Color,
}

/// Count and share of one category at one end-state.
#[derive(Clone, Debug, PartialEq)]
pub struct StatLabel {
    /// End-state the label describes.
    pub end: EndIndex,
    /// Category the label describes.
    pub category: CategoryIndex,
    /// Anchor of the label, right-aligned.
    pub anchor: Vec2,
    /// Arrival count with thousands separators.
    pub count: String,
    /// Share of the end-state rounded to whole percent.
    pub percentage: String,
    /// Text color of the percentage.
    pub color: Color,
}

/// Population and arrival counters of the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Counters {
    /// Particles created so far.
    pub population: usize,
    /// Particles that reached their end-state.
    pub arrived: usize,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} particles, {} arrived",
            format_count(self.population as u64),
            format_count(self.arrived as u64)
        )
    }
}

/// Declarative description of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    /// Moving particles.
    pub particles: Vec<SceneParticle>,
    /// One bar per end-state in declared order.
    pub bars: Vec<EndBar>,
    /// Statistics labels, end-states in declared order and categories in selection order.
    pub labels: Vec<StatLabel>,
    /// Live counters.
    pub counters: Counters,
    /// Chart height the scene was laid out for.
    pub height: f32,
}

impl Scene {
    /// Builds the scene for `snapshot`.
    ///
    /// `ends` provides the end-state labels in declared order; entries without
    /// a lane in `layout` are skipped.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &FlowSnapshot,
        layout: &LaneLayout,
        ends: &[String],
        style: &SceneStyle,
    ) -> Self {
        let palette = &style.palette;
        let particles = snapshot
            .visible
            .iter()
            .map(|visible| SceneParticle {
                id: visible.particle.id,
                category: visible.particle.category_index,
                position: Vec2::new(visible.position.x, visible.position.y),
                color: palette.category_color(visible.particle.category_index),
            })
            .collect();

        let mut bars = Vec::with_capacity(snapshot.report.ends().len());
        let mut labels = Vec::new();
        for entry in snapshot.report.ends() {
            let Some(lane) = layout.end_lane(entry.end) else {
                continue;
            };
            let label = ends
                .get(entry.end.get())
                .cloned()
                .unwrap_or_else(|| format!("#{}", entry.end.get()));
            bars.push(end_bar(entry, label, lane, layout, style));
            labels.extend(stat_labels(entry, lane, layout, style));
        }

        Self {
            particles,
            bars,
            labels,
            counters: Counters {
                population: snapshot.population,
                arrived: snapshot.arrived,
            },
            height: layout.height(),
        }
    }
}

fn end_bar(
    entry: &EndStateStats,
    label: String,
    lane: f32,
    layout: &LaneLayout,
    style: &SceneStyle,
) -> EndBar {
    let path_width = layout.path_width();
    let segments = if entry.has_arrivals() {
        entry
            .categories
            .iter()
            .map(|stat| BarSegment {
                category: stat.category_index,
                offset: path_width * stat.stacked_percentage.from as f32,
                height: path_width
                    * (stat.stacked_percentage.to - stat.stacked_percentage.from) as f32,
                color: style.palette.category_color(stat.category_index),
            })
            .collect()
    } else {
        Vec::new()
    };

    EndBar {
        end: entry.end,
        label,
        origin: Vec2::new(layout.x_range().1, lane - path_width / 2.0),
        size: Vec2::new(style.bar_width, path_width),
        segments,
        empty: !entry.has_arrivals(),
        background: style.palette.empty_bar(),
    }
}

fn stat_labels<'a>(
    entry: &'a EndStateStats,
    lane: f32,
    layout: &LaneLayout,
    style: &'a SceneStyle,
) -> impl Iterator<Item = StatLabel> + 'a {
    let column_origin = layout.x_range().1 + style.bar_width + style.label_gap;
    entry.categories.iter().map(move |stat| StatLabel {
        end: stat.end,
        category: stat.category_index,
        anchor: Vec2::new(
            column_origin + style.label_spacing * (stat.category_index.get() + 1) as f32,
            lane,
        ),
        count: format_count(stat.count),
        percentage: format_percentage(stat.percentage),
        color: style.palette.category_color(stat.category_index),
    })
}

/// Formats `count` with comma thousands separators, e.g. `12,345`.
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}

/// Formats a share in `0.0..=1.0` as a whole percentage, e.g. `42%`.
#[must_use]
pub fn format_percentage(share: f64) -> String {
    format!("{}%", (share * 100.0).round())
}

/// Consumes read-only scenes, one per tick.
pub trait RenderAdapter {
    /// Presents the provided scene.
    fn present(&mut self, scene: &Scene) -> AnyResult<()>;
}

/// Errors that can occur while configuring presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingError {
    /// A palette was created without any category color.
    EmptyPalette,
}

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPalette => write!(f, "palette must provide at least one category color"),
        }
    }
}

impl Error for RenderingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_use_thousands_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn percentages_round_to_whole_numbers() {
        assert_eq!(format_percentage(0.0), "0%");
        assert_eq!(format_percentage(0.423), "42%");
        assert_eq!(format_percentage(1.0), "100%");
    }

    #[test]
    fn percentage_ties_round_up() {
        assert_eq!(format_percentage(0.125), "13%");
        assert_eq!(format_percentage(0.625), "63%");
        assert_eq!(format_percentage(0.005), "1%");
    }

    #[test]
    fn palette_cycles_category_colors() {
        let palette = Palette::default();
        assert_eq!(
            palette.category_color(CategoryIndex::new(2)),
            palette.category_color(CategoryIndex::new(0))
        );
        assert_ne!(
            palette.category_color(CategoryIndex::new(0)),
            palette.category_color(CategoryIndex::new(1))
        );
        assert!((palette.empty_bar().alpha - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn palette_requires_a_category_color() {
        let error = Palette::new(Vec::new(), Color::new(0.0, 0.0, 0.0, 1.0))
            .expect_err("empty palette must be rejected");
        assert_eq!(error, RenderingError::EmptyPalette);
    }
}
