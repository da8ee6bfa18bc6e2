use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use crate::monitoring::report::DailyGrid;

/// Turns one day's grid into an image file under `output_dir`.
pub trait HeatmapRenderer: Send + Sync {
    fn render(&self, grid: &DailyGrid, threshold: f64, output_dir: &Path) -> Result<PathBuf>;
}

const CELL_WIDTH: u32 = 56;
const CELL_HEIGHT: u32 = 22;
const LEFT_MARGIN: u32 = 48;
const TOP_MARGIN: u32 = 56;

const GREEN: (f64, f64, f64) = (26.0, 152.0, 80.0);
const YELLOW: (f64, f64, f64) = (255.0, 255.0, 191.0);
const RED: (f64, f64, f64) = (215.0, 48.0, 39.0);

/// Green-yellow-red SVG heatmap, yellow at the opportunity threshold.
#[derive(Debug, Clone, Default)]
pub struct SvgHeatmap;

impl SvgHeatmap {
    pub fn file_name(grid: &DailyGrid) -> String {
        format!("heatmap_{}.svg", grid.date.format("%Y-%m-%d"))
    }

    pub fn to_svg(&self, grid: &DailyGrid, threshold: f64) -> String {
        let columns = grid.columns() as u32;
        let width = LEFT_MARGIN + columns * CELL_WIDTH + 16;
        let height = TOP_MARGIN + 24 * CELL_HEIGHT + 16;

        let peak = grid
            .mean_spread
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max);
        let upper = peak.max(threshold * 2.0);

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = width,
            h = height,
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="22" font-size="15" font-weight="bold">Spread heatmap - {}</text>"#,
            LEFT_MARGIN,
            grid.date,
        );

        for col in 0..columns {
            let label = if grid.sub_bucket_minutes == 0 {
                "hour".to_string()
            } else {
                format!(":{:02}", grid.column_minute(col as usize))
            };
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" font-size="10" text-anchor="middle">{}</text>"#,
                LEFT_MARGIN + col * CELL_WIDTH + CELL_WIDTH / 2,
                TOP_MARGIN - 6,
                label,
            );
        }

        for (hour, row) in grid.mean_spread.iter().enumerate() {
            let y = TOP_MARGIN + hour as u32 * CELL_HEIGHT;
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" font-size="10" text-anchor="end">{:02}:00</text>"#,
                LEFT_MARGIN - 6,
                y + CELL_HEIGHT / 2 + 4,
                hour,
            );

            for (col, &value) in row.iter().enumerate() {
                let x = LEFT_MARGIN + col as u32 * CELL_WIDTH;
                let (r, g, b) = diverging_color(value, threshold, upper);
                let _ = writeln!(
                    svg,
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="rgb({},{},{})" stroke="white"/>"#,
                    x, y, CELL_WIDTH, CELL_HEIGHT, r, g, b,
                );
                let _ = writeln!(
                    svg,
                    r#"<text x="{}" y="{}" font-size="9" text-anchor="middle">{:.1}%</text>"#,
                    x + CELL_WIDTH / 2,
                    y + CELL_HEIGHT / 2 + 3,
                    value * 100.0,
                );
            }
        }

        svg.push_str("</svg>\n");
        svg
    }
}

impl HeatmapRenderer for SvgHeatmap {
    fn render(&self, grid: &DailyGrid, threshold: f64, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(Self::file_name(grid));
        fs::write(&path, self.to_svg(grid, threshold))
            .with_context(|| format!("Failed to write heatmap: {:?}", path))?;
        Ok(path)
    }
}

/// Green below `center`, yellow at it, red towards `upper`.
pub fn diverging_color(value: f64, center: f64, upper: f64) -> (u8, u8, u8) {
    let (from, to, t) = if value <= center {
        let t = if center > 0.0 { value / center } else { 1.0 };
        (GREEN, YELLOW, t)
    } else {
        let span = upper - center;
        let t = if span > 0.0 { (value - center) / span } else { 1.0 };
        (YELLOW, RED, t)
    };
    let t = t.clamp(0.0, 1.0);
    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;

    (mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::report::{generate, ReportConfig};
    use crate::strategies::types::{Action, Observation};
    use chrono::{FixedOffset, TimeZone};

    fn grid(sub_bucket_minutes: u32) -> DailyGrid {
        let rows = vec![Observation {
            captured_at: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 7, 4, 13, 20, 0).unwrap(),
            venue_a_price: 0.40,
            venue_b_price: 0.46,
            spread: 0.06,
            action: Action::BuyASellB,
            estimated_profit: 4.5,
            venue_a_volume: 0,
            venue_b_volume: 0,
            venue_a_simulated: false,
            venue_b_simulated: false,
        }];
        let config = ReportConfig { spread_threshold: 0.03, sub_bucket_minutes };
        generate(&rows, &config).grids.remove(0)
    }

    #[test]
    fn test_color_scale() {
        assert_eq!(diverging_color(0.0, 0.03, 0.06), (26, 152, 80));
        assert_eq!(diverging_color(0.03, 0.03, 0.06), (255, 255, 191));
        assert_eq!(diverging_color(0.06, 0.03, 0.06), (215, 48, 39));
        assert_eq!(diverging_color(0.5, 0.03, 0.06), (215, 48, 39));
    }

    #[test]
    fn test_svg_has_one_cell_per_bucket() {
        let svg = SvgHeatmap.to_svg(&grid(0), 0.03);

        assert_eq!(svg.matches("<rect").count(), 24);
        assert!(svg.contains("Spread heatmap - 2026-07-04"));
        assert!(svg.contains(">6.0%</text>"));
        assert!(svg.contains("rgb(215,48,39)"));

        let svg = SvgHeatmap.to_svg(&grid(15), 0.03);
        assert_eq!(svg.matches("<rect").count(), 24 * 4);
        assert!(svg.contains(">:45</text>"));
    }

    #[test]
    fn test_render_writes_file_named_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = SvgHeatmap.render(&grid(0), 0.03, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("heatmap_2026-07-04.svg"));
        assert!(fs::read_to_string(&path).unwrap().starts_with("<svg"));
    }
}
