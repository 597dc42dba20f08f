use std::time::Duration;

use anyhow::{Context, Result};
use sankey_flow_core::{Category, Command, Event, RunPhase};
use sankey_flow_rendering::{RenderAdapter, Scene, SceneStyle};
use sankey_flow_session::{apply, query, Session};
use tracing::{debug, warn};

/// Parameters of a headless run.
#[derive(Clone, Debug)]
pub(crate) struct RunSettings {
    pub(crate) categories: Vec<Category>,
    pub(crate) tick: Duration,
    pub(crate) max_ticks: u64,
}

/// How a headless run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RunOutcome {
    pub(crate) ticks: u64,
    pub(crate) phase: RunPhase,
}

/// Starts a run and ticks it at a fixed cadence until it halts or `max_ticks` elapse.
///
/// Every tick's snapshot is turned into a scene and presented through `adapter`.
pub(crate) fn drive<A: RenderAdapter>(
    session: &mut Session,
    settings: &RunSettings,
    style: &SceneStyle,
    adapter: &mut A,
) -> Result<RunOutcome> {
    let mut events = Vec::new();
    apply(
        session,
        Command::Simulate {
            categories: settings.categories.clone(),
        },
        &mut events,
    );
    drain(&mut events).context("simulation request rejected")?;

    let mut ticks = 0;
    while query::phase(session) == RunPhase::Running {
        if ticks >= settings.max_ticks {
            warn!(ticks, "tick budget exhausted before the run saturated");
            apply(session, Command::Stop, &mut events);
            drain(&mut events)?;
            break;
        }

        apply(session, Command::Tick { dt: settings.tick }, &mut events);
        ticks += 1;
        drain(&mut events).context("flow simulation failed")?;

        let scene = Scene::from_snapshot(
            query::snapshot(session),
            query::layout(session),
            query::table(session).ends(),
            style,
        );
        adapter
            .present(&scene)
            .with_context(|| format!("failed to present frame {ticks}"))?;
    }

    Ok(RunOutcome {
        ticks,
        phase: query::phase(session),
    })
}

/// Logs pending events, surfacing rejections and failures as errors.
fn drain(events: &mut Vec<Event>) -> Result<()> {
    for event in events.drain(..) {
        match event {
            Event::SimulationRejected { reason } => return Err(reason.into()),
            Event::RunFailed { error, .. } => return Err(error.into()),
            Event::TimeAdvanced { .. } | Event::ParticlesSpawned { .. } => {}
            other => debug!(event = ?other, "session event"),
        }
    }
    Ok(())
}
