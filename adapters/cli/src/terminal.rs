use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use sankey_flow_core::FlowSnapshot;
use sankey_flow_rendering::{format_count, format_percentage, RenderAdapter, Scene};
use serde::Serialize;
use tracing::info;

use crate::config::FlowFile;

/// Render adapter that reports progress through the log instead of drawing.
#[derive(Debug)]
pub(crate) struct TerminalAdapter {
    every: u64,
    frames: u64,
}

impl TerminalAdapter {
    /// Creates an adapter that logs every `every`-th frame.
    pub(crate) fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
        }
    }
}

impl RenderAdapter for TerminalAdapter {
    fn present(&mut self, scene: &Scene) -> Result<()> {
        self.frames += 1;
        if self.frames % self.every == 0 {
            let filled = scene.bars.iter().filter(|bar| !bar.empty).count();
            info!(
                frame = self.frames,
                moving = scene.particles.len(),
                filled_bars = filled,
                "{}",
                scene.counters
            );
        }
        Ok(())
    }
}

/// Layout of the final arrival report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReportFormat {
    /// Aligned, human readable table.
    Text,
    /// Pretty-printed JSON document.
    Json,
}

#[derive(Serialize)]
struct ReportView<'a> {
    start_title: Option<&'a str>,
    end_title: Option<&'a str>,
    run: u32,
    clock_secs: f64,
    population: usize,
    arrived: usize,
    ends: Vec<EndView<'a>>,
}

#[derive(Serialize)]
struct EndView<'a> {
    label: &'a str,
    total: u64,
    categories: Vec<StatView<'a>>,
}

#[derive(Serialize)]
struct StatView<'a> {
    category: &'a str,
    count: u64,
    percentage: f64,
}

impl<'a> ReportView<'a> {
    fn new(file: &'a FlowFile, snapshot: &'a FlowSnapshot) -> Self {
        let ends = snapshot
            .report
            .ends()
            .iter()
            .map(|entry| EndView {
                label: file
                    .ends
                    .get(entry.end.get())
                    .map_or("?", String::as_str),
                total: entry.total,
                categories: entry
                    .categories
                    .iter()
                    .map(|stat| StatView {
                        category: stat.category.as_str(),
                        count: stat.count,
                        percentage: stat.percentage,
                    })
                    .collect(),
            })
            .collect();

        Self {
            start_title: file.start_title.as_deref(),
            end_title: file.end_title.as_deref(),
            run: snapshot.run.get(),
            clock_secs: snapshot.clock.as_secs_f64(),
            population: snapshot.population,
            arrived: snapshot.arrived,
            ends,
        }
    }
}

/// Writes the arrival report of `snapshot` in the requested format.
pub(crate) fn write_report<W: Write>(
    out: &mut W,
    file: &FlowFile,
    snapshot: &FlowSnapshot,
    format: ReportFormat,
) -> Result<()> {
    let view = ReportView::new(file, snapshot);
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &view).context("failed to encode report")?;
            writeln!(out)?;
        }
        ReportFormat::Text => write_text(out, &view)?,
    }
    Ok(())
}

fn write_text<W: Write>(out: &mut W, view: &ReportView<'_>) -> Result<()> {
    match (view.start_title, view.end_title) {
        (Some(start), Some(end)) => writeln!(out, "{start} -> {end}")?,
        (Some(title), None) | (None, Some(title)) => writeln!(out, "{title}")?,
        (None, None) => {}
    }
    writeln!(
        out,
        "run {} after {:.1}s: {} particles, {} arrived",
        view.run,
        view.clock_secs,
        format_count(view.population as u64),
        format_count(view.arrived as u64)
    )?;

    let width = view
        .ends
        .iter()
        .map(|entry| entry.label.chars().count())
        .max()
        .unwrap_or(0);
    for entry in &view.ends {
        write!(out, "{:<width$}", entry.label)?;
        if entry.total == 0 {
            writeln!(out, "  no arrivals")?;
            continue;
        }
        for stat in &entry.categories {
            write!(
                out,
                "  {} {} ({})",
                stat.category,
                format_count(stat.count),
                format_percentage(stat.percentage)
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sankey_flow_core::{
        ArrivalReport, ArrivalStat, Category, CategoryIndex, CountRange, EndIndex, EndStateStats,
        PercentRange, RunId,
    };
    use std::time::Duration;

    fn file() -> FlowFile {
        FlowFile::parse(
            r#"
version = 1
start_title = "Not Seen"
end_title = "PHQ-9"
categories = ["Female"]
starts = ["Not Seen"]
ends = ["Minimal", "Severe"]

[[distribution]]
category = "Female"
start = "Not Seen"
cumulative = [0.5, 1.0]
"#,
        )
        .expect("flow file parses")
    }

    fn snapshot() -> FlowSnapshot {
        let stat = ArrivalStat {
            end: EndIndex::new(0),
            category_index: CategoryIndex::new(0),
            category: Category::from("Female"),
            count: 1_500,
            stacked_count: CountRange { from: 0, to: 1_500 },
            percentage: 1.0,
            stacked_percentage: PercentRange { from: 0.0, to: 1.0 },
            total_at_end: 1_500,
        };
        let empty = ArrivalStat {
            end: EndIndex::new(1),
            count: 0,
            stacked_count: CountRange::default(),
            percentage: 0.0,
            stacked_percentage: PercentRange::default(),
            total_at_end: 0,
            ..stat.clone()
        };
        FlowSnapshot {
            run: RunId::new(1),
            clock: Duration::from_millis(12_500),
            visible: Vec::new(),
            report: ArrivalReport::new(vec![
                EndStateStats {
                    end: EndIndex::new(0),
                    total: 1_500,
                    categories: vec![stat],
                },
                EndStateStats {
                    end: EndIndex::new(1),
                    total: 0,
                    categories: vec![empty],
                },
            ]),
            population: 1_502,
            arrived: 1_500,
        }
    }

    #[test]
    fn text_report_lists_every_end_state() {
        let mut out = Vec::new();
        write_report(&mut out, &file(), &snapshot(), ReportFormat::Text).expect("report writes");
        let text = String::from_utf8(out).expect("utf-8 output");

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Not Seen -> PHQ-9");
        assert_eq!(lines[1], "run 1 after 12.5s: 1,502 particles, 1,500 arrived");
        assert_eq!(lines[2], "Minimal  Female 1,500 (100%)");
        assert_eq!(lines[3], "Severe   no arrivals");
    }

    #[test]
    fn json_report_carries_labels_and_shares() {
        let mut out = Vec::new();
        write_report(&mut out, &file(), &snapshot(), ReportFormat::Json).expect("report writes");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");

        assert_eq!(value["arrived"], 1_500);
        assert_eq!(value["ends"][0]["label"], "Minimal");
        assert_eq!(value["ends"][0]["categories"][0]["category"], "Female");
        assert_eq!(value["ends"][1]["total"], 0);
        assert_eq!(value["ends"][1]["categories"][0]["percentage"], 0.0);
    }

    #[test]
    fn terminal_adapter_counts_frames() {
        let mut adapter = TerminalAdapter::new(0);
        let scene = Scene {
            particles: Vec::new(),
            bars: Vec::new(),
            labels: Vec::new(),
            counters: Default::default(),
            height: 0.0,
        };

        adapter.present(&scene).expect("present succeeds");
        adapter.present(&scene).expect("present succeeds");

        assert_eq!(adapter.every, 1);
        assert_eq!(adapter.frames, 2);
    }
}
