use std::time::Duration;

use glam::Vec2;
use sankey_flow_core::{
    Category, CategoryIndex, EndIndex, FlowSnapshot, LaneGeometry, LaneLayout, Particle,
    ParticleId, RunId, StartIndex, VisibleParticle,
};
use sankey_flow_rendering::{Palette, RenderAdapter, Scene, SceneStyle};
use sankey_flow_system_aggregation::aggregate;

fn particle(id: u64, category: usize, end: usize) -> Particle {
    let labels = ["Female", "Male"];
    Particle {
        id: ParticleId::new(id),
        category_index: CategoryIndex::new(category),
        category: Category::from(labels[category]),
        start: StartIndex::new(0),
        end: EndIndex::new(end),
        spawned_at: 0.0,
        lateral_jitter: 0.0,
        speed_factor: 1.0,
    }
}

fn ends() -> Vec<String> {
    ["Mild", "Moderate", "Severe", "None"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn snapshot(layout: &LaneLayout) -> FlowSnapshot {
    let categories = vec![Category::from("Female"), Category::from("Male")];
    let arrived = vec![
        particle(0, 0, 0),
        particle(1, 1, 0),
        particle(2, 1, 0),
        particle(3, 1, 0),
        particle(4, 0, 2),
    ];
    let moving = particle(5, 1, 3);
    let position = layout
        .position(&moving, 0.5)
        .expect("particle lanes exist");

    FlowSnapshot {
        run: RunId::new(1),
        clock: Duration::from_secs(5),
        visible: vec![VisibleParticle {
            particle: moving,
            progress: 0.5,
            position,
        }],
        report: aggregate(&arrived, 4, &categories),
        population: 1_234,
        arrived: arrived.len(),
    }
}

#[test]
fn bars_stack_categories_and_mark_empty_end_states() {
    let layout = LaneLayout::from_geometry(&LaneGeometry::default(), 1, 4);
    let style = SceneStyle::default();

    let scene = Scene::from_snapshot(&snapshot(&layout), &layout, &ends(), &style);

    assert_eq!(scene.bars.len(), 4);
    let mild = &scene.bars[0];
    assert_eq!(mild.label, "Mild");
    assert!(!mild.empty);
    assert_eq!(mild.size, Vec2::new(20.0, 80.0));
    let lane = layout.end_lane(EndIndex::new(0)).expect("lane exists");
    assert_eq!(mild.origin, Vec2::new(layout.x_range().1, lane - 40.0));
    assert_eq!(mild.segments.len(), 2);
    assert!((mild.segments[0].offset - 0.0).abs() < 1e-4);
    assert!((mild.segments[0].height - 20.0).abs() < 1e-4);
    assert!((mild.segments[1].offset - 20.0).abs() < 1e-4);
    assert!((mild.segments[1].height - 60.0).abs() < 1e-4);

    let moderate = &scene.bars[1];
    assert!(moderate.empty);
    assert!(moderate.segments.is_empty());
    assert_eq!(moderate.background, style.palette.empty_bar());
}

#[test]
fn labels_format_counts_and_percentages() {
    let layout = LaneLayout::from_geometry(&LaneGeometry::default(), 1, 4);
    let style = SceneStyle::default();

    let scene = Scene::from_snapshot(&snapshot(&layout), &layout, &ends(), &style);

    assert_eq!(scene.labels.len(), 8);
    let female_mild = &scene.labels[0];
    assert_eq!(female_mild.count, "1");
    assert_eq!(female_mild.percentage, "25%");
    let male_mild = &scene.labels[1];
    assert_eq!(male_mild.percentage, "75%");
    assert!(male_mild.anchor.x > female_mild.anchor.x);
    assert_eq!(male_mild.anchor.y, female_mild.anchor.y);

    let male_moderate = &scene.labels[3];
    assert_eq!(male_moderate.count, "0");
    assert_eq!(male_moderate.percentage, "0%");

    assert_eq!(scene.counters.population, 1_234);
    assert_eq!(scene.counters.to_string(), "1,234 particles, 5 arrived");
}

#[test]
fn particles_take_their_category_color() {
    let layout = LaneLayout::from_geometry(&LaneGeometry::default(), 1, 4);
    let style = SceneStyle::default();
    let palette = Palette::default();

    let scene = Scene::from_snapshot(&snapshot(&layout), &layout, &ends(), &style);

    assert_eq!(scene.particles.len(), 1);
    let moving = scene.particles[0];
    assert_eq!(moving.id, ParticleId::new(5));
    assert_eq!(moving.color, palette.category_color(CategoryIndex::new(1)));
    let (x_start, x_end) = layout.x_range();
    assert!((moving.position.x - (x_start + x_end) / 2.0).abs() < 1e-3);
}

#[test]
fn adapters_receive_scenes_read_only() {
    #[derive(Default)]
    struct Recorder {
        frames: Vec<usize>,
    }

    impl RenderAdapter for Recorder {
        fn present(&mut self, scene: &Scene) -> anyhow::Result<()> {
            self.frames.push(scene.particles.len());
            Ok(())
        }
    }

    let layout = LaneLayout::from_geometry(&LaneGeometry::default(), 1, 4);
    let scene = Scene::from_snapshot(
        &snapshot(&layout),
        &layout,
        &ends(),
        &SceneStyle::default(),
    );
    let mut recorder = Recorder::default();

    recorder.present(&scene).expect("present succeeds");
    recorder.present(&scene).expect("present succeeds");

    assert_eq!(recorder.frames, vec![1, 1]);
}
