use anyhow::{Context, Result};
use chrono::{NaiveDate, Timelike};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::config::{ReportSettings, StrategyConfig};
use crate::monitoring::heatmap::HeatmapRenderer;
use crate::monitoring::logger::ObservationLog;
use crate::strategies::types::Observation;

pub const HOURS_PER_DAY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportConfig {
    pub spread_threshold: f64,
    /// 0 means one column per hour.
    pub sub_bucket_minutes: u32,
}

impl ReportConfig {
    pub fn new(strategy: &StrategyConfig, settings: &ReportSettings) -> Self {
        Self {
            spread_threshold: strategy.spread_threshold,
            sub_bucket_minutes: settings.sub_bucket_minutes,
        }
    }

    fn columns(&self) -> usize {
        match self.sub_bucket_minutes {
            0 => 1,
            m => (60 / m.min(60)) as usize,
        }
    }

    fn column_of(&self, minute: u32) -> usize {
        match self.sub_bucket_minutes {
            0 => 0,
            m => (minute / m.min(60)) as usize,
        }
    }
}

/// Mean spread of one (date, hour, sub-bucket) cell that has rows.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyBucket {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
    pub mean_spread: f64,
    pub rows: usize,
}

/// One calendar day: 24 hour rows by `columns` sub-hour columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyGrid {
    pub date: NaiveDate,
    pub sub_bucket_minutes: u32,
    /// Empty cells hold 0.0; check `counts` to tell them apart.
    pub mean_spread: Vec<Vec<f64>>,
    pub counts: Vec<Vec<usize>>,
}

impl DailyGrid {
    fn empty(date: NaiveDate, config: &ReportConfig) -> Self {
        let columns = config.columns();
        Self {
            date,
            sub_bucket_minutes: config.sub_bucket_minutes,
            mean_spread: vec![vec![0.0; columns]; HOURS_PER_DAY],
            counts: vec![vec![0; columns]; HOURS_PER_DAY],
        }
    }

    pub fn columns(&self) -> usize {
        self.mean_spread.first().map_or(0, Vec::len)
    }

    /// Start minute of column `col`.
    pub fn column_minute(&self, col: usize) -> u32 {
        col as u32 * self.sub_bucket_minutes
    }

    pub fn buckets(&self) -> impl Iterator<Item = HourlyBucket> + '_ {
        (0..HOURS_PER_DAY).flat_map(move |hour| {
            (0..self.columns()).filter_map(move |col| {
                let rows = self.counts[hour][col];
                (rows > 0).then(|| HourlyBucket {
                    date: self.date,
                    hour: hour as u32,
                    minute: self.column_minute(col),
                    mean_spread: self.mean_spread[hour][col],
                    rows,
                })
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub opportunity_count: usize,
    pub opportunity_rate: f64,
    pub mean_spread: f64,
    pub max_spread: f64,
    /// Summed over opportunity rows only.
    pub total_estimated_profit: f64,
}

impl SummaryStats {
    pub fn compute<'a>(rows: impl IntoIterator<Item = &'a Observation>, threshold: f64) -> Self {
        let mut stats = SummaryStats::default();
        let mut spread_sum = 0.0;

        for row in rows {
            stats.total_rows += 1;
            spread_sum += row.spread;
            stats.max_spread = stats.max_spread.max(row.spread);
            if row.spread > threshold {
                stats.opportunity_count += 1;
                stats.total_estimated_profit += row.estimated_profit;
            }
        }

        if stats.total_rows > 0 {
            stats.mean_spread = spread_sum / stats.total_rows as f64;
            stats.opportunity_rate = stats.opportunity_count as f64 / stats.total_rows as f64;
        }
        stats
    }
}

impl std::fmt::Display for SummaryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} samples | {} opportunities ({:.1}%) | mean spread {:.2}% | max spread {:.2}% | total profit ${:.2}",
            self.total_rows,
            self.opportunity_count,
            self.opportunity_rate * 100.0,
            self.mean_spread * 100.0,
            self.max_spread * 100.0,
            self.total_estimated_profit,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub grids: Vec<DailyGrid>,
    pub stats: SummaryStats,
    pub daily_stats: BTreeMap<NaiveDate, SummaryStats>,
}

impl Report {
    pub fn stats_for(&self, date: NaiveDate) -> Option<&SummaryStats> {
        self.daily_stats.get(&date)
    }
}

/// Group rows by the local date and hour of `captured_at`, averaging spread per cell.
pub fn generate(rows: &[Observation], config: &ReportConfig) -> Report {
    let mut sums: BTreeMap<NaiveDate, DailyGrid> = BTreeMap::new();
    let mut by_date: BTreeMap<NaiveDate, Vec<&Observation>> = BTreeMap::new();

    for row in rows {
        let date = row.captured_at.date_naive();
        let hour = row.captured_at.hour() as usize;
        let col = config.column_of(row.captured_at.minute());

        let grid = sums.entry(date).or_insert_with(|| DailyGrid::empty(date, config));
        grid.mean_spread[hour][col] += row.spread;
        grid.counts[hour][col] += 1;

        by_date.entry(date).or_default().push(row);
    }

    let grids = sums
        .into_values()
        .map(|mut grid| {
            for (sums, counts) in grid.mean_spread.iter_mut().zip(&grid.counts) {
                for (cell, &n) in sums.iter_mut().zip(counts) {
                    if n > 0 {
                        *cell /= n as f64;
                    }
                }
            }
            grid
        })
        .collect();

    let daily_stats = by_date
        .into_iter()
        .map(|(date, day)| (date, SummaryStats::compute(day, config.spread_threshold)))
        .collect();

    Report {
        grids,
        stats: SummaryStats::compute(rows, config.spread_threshold),
        daily_stats,
    }
}

/// Reads the log, aggregates it, and hands each day to the renderer.
pub struct Reporter {
    config: ReportConfig,
    output_dir: PathBuf,
    renderer: Box<dyn HeatmapRenderer>,
}

impl Reporter {
    pub fn new(config: ReportConfig, output_dir: PathBuf, renderer: Box<dyn HeatmapRenderer>) -> Self {
        Self {
            config,
            output_dir,
            renderer,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn regenerate(&self, log: &ObservationLog) -> Result<Report> {
        let rows = log.read_all()?;
        let report = generate(&rows, &self.config);

        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", self.output_dir))?;

        for grid in &report.grids {
            let path = self.renderer
                .render(grid, self.config.spread_threshold, &self.output_dir)
                .with_context(|| format!("Failed to render heatmap for {}", grid.date))?;
            let populated = grid.buckets().count();
            if let Some(day) = report.stats_for(grid.date) {
                tracing::debug!("{} ({} buckets): {} -> {}", grid.date, populated, day, path.display());
            }
        }

        info!("📈 Report: {}", report.stats);
        Ok(report)
    }
}
