use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use sankey_flow_core::{DistributionTable, EngineConfig, SpeedRange};
use serde::Deserialize;

/// Flow file format understood by this binary.
pub(crate) const FLOW_FILE_VERSION: u32 = 1;

/// Declarative description of a flow: labels, distributions, and engine overrides.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FlowFile {
    /// Format version; must equal [`FLOW_FILE_VERSION`].
    pub(crate) version: u32,
    /// Heading printed above the start-states.
    #[serde(default)]
    pub(crate) start_title: Option<String>,
    /// Heading printed above the end-states.
    #[serde(default)]
    pub(crate) end_title: Option<String>,
    pub(crate) categories: Vec<String>,
    pub(crate) starts: Vec<String>,
    pub(crate) ends: Vec<String>,
    #[serde(default)]
    pub(crate) engine: EngineOverrides,
    #[serde(default, rename = "distribution")]
    pub(crate) distributions: Vec<DistributionEntry>,
}

/// Optional replacements for the engine defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EngineOverrides {
    pub(crate) population_cap: Option<usize>,
    pub(crate) spawn_increment: Option<usize>,
    pub(crate) flight_duration_ms: Option<u64>,
    pub(crate) spawn_jitter: Option<f64>,
    pub(crate) speed_min: Option<f64>,
    pub(crate) speed_max: Option<f64>,
    pub(crate) grace_period_ms: Option<u64>,
}

/// Distribution of one `(category, start)` pair, given either cumulatively or as raw counts.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DistributionEntry {
    pub(crate) category: String,
    pub(crate) start: String,
    #[serde(default)]
    pub(crate) cumulative: Option<Vec<f64>>,
    #[serde(default)]
    pub(crate) counts: Option<Vec<f64>>,
}

impl FlowFile {
    /// Reads and parses the flow file at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read flow file {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("invalid flow file {}", path.display()))
    }

    /// Parses a flow file from TOML source.
    pub(crate) fn parse(source: &str) -> Result<Self> {
        let file: Self = toml::from_str(source).context("failed to parse TOML")?;
        if file.version != FLOW_FILE_VERSION {
            bail!(
                "unsupported flow file version {} (expected {FLOW_FILE_VERSION})",
                file.version
            );
        }
        Ok(file)
    }

    /// Builds the validated distribution table.
    pub(crate) fn table(&self) -> Result<DistributionTable> {
        let mut builder = DistributionTable::builder(
            self.categories.iter().map(String::as_str),
            self.starts.iter().map(String::as_str),
            self.ends.iter().map(String::as_str),
        );
        for (index, entry) in self.distributions.iter().enumerate() {
            let context = || {
                format!(
                    "distribution #{} ({} / {})",
                    index + 1,
                    entry.category,
                    entry.start
                )
            };
            builder = match (&entry.cumulative, &entry.counts) {
                (Some(values), None) => builder
                    .cumulative(&entry.category, &entry.start, values.clone())
                    .with_context(context)?,
                (None, Some(counts)) => builder
                    .counts(&entry.category, &entry.start, counts)
                    .with_context(context)?,
                (Some(_), Some(_)) => {
                    bail!("{} declares both `cumulative` and `counts`", context())
                }
                (None, None) => bail!("{} declares neither `cumulative` nor `counts`", context()),
            };
        }
        builder.build().context("invalid label declarations")
    }

    /// Engine tuning with the file's overrides applied to the defaults.
    pub(crate) fn engine(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let overrides = &self.engine;
        EngineConfig {
            population_cap: overrides.population_cap.unwrap_or(defaults.population_cap),
            spawn_increment: overrides.spawn_increment.unwrap_or(defaults.spawn_increment),
            flight_duration: overrides
                .flight_duration_ms
                .map_or(defaults.flight_duration, Duration::from_millis),
            spawn_jitter: overrides.spawn_jitter.unwrap_or(defaults.spawn_jitter),
            speed: SpeedRange {
                min: overrides.speed_min.unwrap_or(defaults.speed.min),
                max: overrides.speed_max.unwrap_or(defaults.speed.max),
            },
            lane_half_width: defaults.lane_half_width,
            grace_period: overrides
                .grace_period_ms
                .map_or(defaults.grace_period, Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sankey_flow_core::{FlowError, StartIndex};

    const SAMPLE: &str = r#"
version = 1
start_title = "No Mental Health Treatment"
end_title = "PHQ-9 Score"
categories = ["Female", "Male"]
starts = ["Not Seen"]
ends = ["Minimal", "Mild", "Moderate"]

[engine]
population_cap = 500
flight_duration_ms = 4000

[[distribution]]
category = "Female"
start = "Not Seen"
cumulative = [0.5, 0.8, 1.0]

[[distribution]]
category = "Male"
start = "Not Seen"
counts = [6, 3, 1]
"#;

    #[test]
    fn parses_sample_flow() {
        let file = FlowFile::parse(SAMPLE).expect("sample parses");
        assert_eq!(file.categories, vec!["Female", "Male"]);
        assert_eq!(file.end_title.as_deref(), Some("PHQ-9 Score"));

        let table = file.table().expect("table builds");
        let male = table
            .lookup("Male", StartIndex::new(0))
            .expect("male distribution present");
        assert!((male.values()[0] - 0.6).abs() < 1e-12);
        assert!((male.values()[1] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn overrides_replace_only_given_defaults() {
        let engine = FlowFile::parse(SAMPLE).expect("sample parses").engine();
        let defaults = EngineConfig::default();

        assert_eq!(engine.population_cap, 500);
        assert_eq!(engine.flight_duration, Duration::from_secs(4));
        assert_eq!(engine.spawn_increment, defaults.spawn_increment);
        assert_eq!(engine.speed, defaults.speed);
        assert_eq!(engine.grace_period, defaults.grace_period);
    }

    #[test]
    fn rejects_unsupported_version() {
        let source = SAMPLE.replacen("version = 1", "version = 2", 1);
        let error = FlowFile::parse(&source).expect_err("version 2 is rejected");
        assert!(error.to_string().contains("unsupported flow file version 2"));
    }

    #[test]
    fn rejects_entries_with_both_or_neither_shape() {
        let both = SAMPLE.replacen(
            "counts = [6, 3, 1]",
            "counts = [6, 3, 1]\ncumulative = [0.6, 0.9, 1.0]",
            1,
        );
        let error = FlowFile::parse(&both)
            .expect("file parses")
            .table()
            .expect_err("ambiguous entry is rejected");
        assert!(error.to_string().contains("both"));

        let neither = SAMPLE.replacen("counts = [6, 3, 1]", "", 1);
        let error = FlowFile::parse(&neither)
            .expect("file parses")
            .table()
            .expect_err("empty entry is rejected");
        assert!(error.to_string().contains("neither"));
    }

    #[test]
    fn malformed_distribution_keeps_flow_error_as_source() {
        let source = SAMPLE.replacen("[0.5, 0.8, 1.0]", "[0.5, 0.4, 1.0]", 1);
        let error = FlowFile::parse(&source)
            .expect("file parses")
            .table()
            .expect_err("decreasing distribution is rejected");
        assert!(matches!(
            error.downcast_ref::<FlowError>(),
            Some(FlowError::MalformedDistribution { .. })
        ));
    }
}
