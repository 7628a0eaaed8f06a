use std::{collections::BTreeMap, path::PathBuf};

use common::{
    config::{ChartSettings, Config},
    dataset::{distinct, find_files, read_all},
    plot::{BarChartSpec, BarLayout, Series, YScale, render_bar_chart},
    util::file_stem_from_title,
};
use eyre::{Context, Result};
use itertools::Itertools;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

pub mod record;

pub use record::{Phase, ServiceRecord};

pub const STACKED_FILE: &str = "barplot";
pub const LOG_FILE: &str = "barplot_log";

/// Reads every measurement file in the data directory and concatenates their rows.
pub async fn load_records(config: &Config) -> Result<Vec<ServiceRecord>> {
    let files = find_files(&config.data_dir, &config.file_pattern)
        .await
        .context("Locating service measurements")?;

    let records: Vec<ServiceRecord> = read_all(&files)
        .await
        .context("Loading service measurements")?;

    info!(
        "Loaded {} rows from {} files: keep={:?} hosts={:?} queries={:?} rounds={:?}",
        records.len(),
        files.len(),
        distinct(&records, |r| r.keep.clone()),
        distinct(&records, |r| r.hosts),
        distinct(&records, |r| r.queries),
        distinct(&records, |r| r.rounds),
    );
    Ok(records)
}

/// Splits `records` by their `keep` value. Each group is sorted by host
/// count; rows with the same host count keep their input order.
pub fn group_by_keep(records: Vec<ServiceRecord>) -> BTreeMap<String, Vec<ServiceRecord>> {
    records
        .into_iter()
        .into_group_map_by(|r| r.keep.clone())
        .into_iter()
        .map(|(keep, mut rows)| {
            rows.sort_by_key(|r| r.hosts);
            (keep, rows)
        })
        .collect()
}

fn phase_series(phase: Phase, rows: &[ServiceRecord]) -> Series {
    Series::new(phase.column(), rows.iter().map(|r| phase.value(r)).collect()).with_color(phase.color())
}

/// Two charts per group: the stacked round components with the round time on
/// top, and every phase side by side on a log axis. With a single group the
/// charts keep the plain `barplot` names, otherwise the keep value is
/// appended so groups do not overwrite each other.
pub fn chart_specs(groups: &BTreeMap<String, Vec<ServiceRecord>>, config: &Config) -> Vec<BarChartSpec> {
    let chart: &ChartSettings = &config.chart;
    let per_group = groups.len() > 1;

    groups
        .iter()
        .flat_map(|(keep, rows)| {
            let (suffix, title) = if per_group {
                (
                    format!("_keep-{}", file_stem_from_title(keep)),
                    format!("{} (keep={keep})", chart.title),
                )
            } else {
                (String::new(), chart.title.clone())
            };
            let categories = rows.iter().map(|r| r.hosts.to_string()).collect::<Vec<_>>();

            [
                BarChartSpec {
                    path: config.data_dir.join(format!("{STACKED_FILE}{suffix}.png")),
                    title: title.clone(),
                    x_label: chart.x_label.clone(),
                    y_label: chart.y_label.clone(),
                    categories: categories.clone(),
                    bars: Phase::STACKED
                        .iter()
                        .map(|p| phase_series(*p, rows))
                        .collect(),
                    overlay: Some(phase_series(Phase::Round, rows)),
                    layout: BarLayout::Stacked,
                    y_scale: YScale::Linear,
                },
                BarChartSpec {
                    path: config.data_dir.join(format!("{LOG_FILE}{suffix}.png")),
                    title,
                    x_label: chart.x_label.clone(),
                    y_label: chart.log_y_label.clone(),
                    categories,
                    bars: Phase::ALL.iter().map(|p| phase_series(*p, rows)).collect(),
                    overlay: None,
                    layout: BarLayout::Grouped,
                    y_scale: YScale::Log,
                },
            ]
        })
        .collect()
}

fn render_all(specs: &[BarChartSpec], settings: &ChartSettings) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(specs.len());
    for spec in specs {
        render_bar_chart(spec, settings)
            .with_context(|| format!("Rendering {}", spec.path.display()))?;
        debug!("Wrote {}", spec.path.display());
        written.push(spec.path.clone());
    }
    Ok(written)
}

/// Loads the measurements, groups them by `keep` and writes the charts.
/// Returns the written image paths.
pub async fn plot_service_timings(config: &Config) -> Result<Vec<PathBuf>> {
    let records = load_records(config).await?;
    let groups = group_by_keep(records);
    info!("Plotting {} keep groups", groups.len());

    let specs = chart_specs(&groups, config);
    let settings = config.chart.clone();
    let written = spawn_blocking(move || render_all(&specs, &settings)).await??;
    Ok(written)
}
