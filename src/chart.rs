//! Two-axis line chart rendered to SVG markup.
//!
//! The SVG string is the chart "surface": the HTML report embeds it, and the
//! image export rasterises it.

use crate::export::ExportError;
use crate::formatting::{format_compact_currency, format_percent_tick};
use crate::model::MetricTable;
use crate::projector::{Axis, SeriesPoint, SeriesSpec};
use serde::Deserialize;
use std::fmt::Write as _;

const DEFAULT_TITLE: &str = "Revenue, NOPBT and ROIC";
const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 640;
/// Largest width or height accepted for the chart, in pixels.
pub const MAX_CHART_SIDE: u32 = 8192;
const TICK_COUNT: usize = 5;

const MARGIN_LEFT: f64 = 96.0;
const MARGIN_RIGHT: f64 = 84.0;
const MARGIN_TOP: f64 = 96.0;
const MARGIN_BOTTOM: f64 = 56.0;

const FONT_STACK: &str = "Manrope, Segoe UI, sans-serif";
const INK: &str = "#1f1b16";
const MUTED: &str = "#6b635b";
const GRID: &str = "#e2d6c6";
const PALETTE: [&str; 6] = [
    "#e07a5f", "#3d405b", "#81b29a", "#c25335", "#f2cc8f", "#6d597a",
];

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChartOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
struct ChartLine {
    key: String,
    label: String,
    axis: Axis,
    color: &'static str,
}

/// Tick bounds for one value axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl AxisScale {
    /// Rounds `[min, max]` out to a "nice" step, always including zero.
    pub fn nice(min: f64, max: f64, ticks: usize) -> Self {
        let mut lo = min.min(0.0);
        let mut hi = max.max(0.0);
        if (hi - lo).abs() < f64::EPSILON {
            hi = lo + 1.0;
        }
        let step = nice_step(hi - lo, ticks.max(1));
        lo = (lo / step).floor() * step;
        hi = (hi / step).ceil() * step;
        Self {
            min: lo,
            max: hi,
            step,
        }
    }

    pub fn ticks(&self) -> Vec<f64> {
        let count = ((self.max - self.min) / self.step).round() as usize;
        (0..=count)
            .map(|i| self.step.mul_add(i as f64, self.min))
            .collect()
    }

    fn fraction(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

fn nice_step(range: f64, ticks: usize) -> f64 {
    let raw = range / ticks as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let residual = raw / magnitude;
    let nice = if residual <= 1.0 {
        1.0
    } else if residual <= 2.0 {
        2.0
    } else if residual <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// A rendered chart. Only exists when there was something to draw.
#[derive(Debug, Clone)]
pub struct ChartSurface {
    svg: String,
    width: u32,
    height: u32,
}

impl ChartSurface {
    /// Renders the projected points. Returns `None` for an empty projection
    /// or an empty series selection.
    pub fn render(
        table: &MetricTable,
        points: &[SeriesPoint],
        series: &[SeriesSpec],
        options: &ChartOptions,
    ) -> Option<Self> {
        if points.is_empty() || series.is_empty() {
            return None;
        }
        let lines: Vec<ChartLine> = series
            .iter()
            .enumerate()
            .map(|(idx, spec)| ChartLine {
                key: spec.key.clone(),
                label: spec
                    .resolve(table)
                    .map_or_else(|_| spec.key.clone(), |record| record.name.clone()),
                axis: spec.axis(table),
                color: PALETTE[idx % PALETTE.len()],
            })
            .collect();
        let svg = render_svg(points, &lines, options);
        Some(Self {
            svg,
            width: options.width,
            height: options.height,
        })
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Rasterises the surface into PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, ExportError> {
        use resvg::{tiny_skia, usvg};

        if self.width > MAX_CHART_SIDE || self.height > MAX_CHART_SIDE {
            return Err(ExportError::Raster(format!(
                "{}x{} exceeds the {MAX_CHART_SIDE}px limit per side",
                self.width, self.height
            )));
        }
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        let tree = usvg::Tree::from_str(&self.svg, &options)
            .map_err(|err| ExportError::Raster(format!("SVG parse failed: {err}")))?;
        let mut pixmap = tiny_skia::Pixmap::new(self.width, self.height).ok_or_else(|| {
            ExportError::Raster(format!(
                "cannot allocate a {}x{} pixmap",
                self.width, self.height
            ))
        })?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
        pixmap
            .encode_png()
            .map_err(|err| ExportError::Raster(format!("PNG encoding failed: {err}")))
    }
}

struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn new(options: &ChartOptions) -> Self {
        let width = (f64::from(options.width) - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
        let height = (f64::from(options.height) - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width,
            height,
        }
    }

    fn right(&self) -> f64 {
        self.left + self.width
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn x(&self, index: usize, count: usize) -> f64 {
        if count <= 1 {
            return self.left + self.width / 2.0;
        }
        self.left + self.width * index as f64 / (count - 1) as f64
    }

    fn y(&self, scale: &AxisScale, value: f64) -> f64 {
        self.bottom() - self.height * scale.fraction(value)
    }
}

fn axis_scale(points: &[SeriesPoint], lines: &[ChartLine], axis: Axis) -> Option<AxisScale> {
    let keys: Vec<&str> = lines
        .iter()
        .filter(|line| line.axis == axis)
        .map(|line| line.key.as_str())
        .collect();
    if keys.is_empty() {
        return None;
    }
    let values = points
        .iter()
        .flat_map(|point| keys.iter().filter_map(|key| point.get(key)))
        .filter(|value| value.is_finite());
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min > max {
        return Some(AxisScale::nice(0.0, 1.0, TICK_COUNT));
    }
    Some(AxisScale::nice(min, max, TICK_COUNT))
}

fn render_svg(points: &[SeriesPoint], lines: &[ChartLine], options: &ChartOptions) -> String {
    let frame = Frame::new(options);
    let currency = axis_scale(points, lines, Axis::Currency);
    let percent = axis_scale(points, lines, Axis::Percent);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" role=\"img\">",
        w = options.width,
        h = options.height
    );
    let _ = writeln!(
        svg,
        "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"#ffffff\"/>",
        options.width, options.height
    );
    let _ = writeln!(
        svg,
        "<text x=\"{:.0}\" y=\"36\" fill=\"{INK}\" font-family=\"{FONT_STACK}\" font-size=\"22\" font-weight=\"600\">{}</text>",
        frame.left,
        escape_markup(&options.title)
    );
    render_legend(&mut svg, lines, &frame);

    // Gridlines follow the currency axis when present, otherwise percent.
    if let Some(scale) = currency.as_ref().or(percent.as_ref()) {
        for tick in scale.ticks() {
            let y = frame.y(scale, tick);
            let _ = writeln!(
                svg,
                "<line x1=\"{:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"{GRID}\" stroke-width=\"1\"/>",
                frame.left,
                frame.right()
            );
        }
    }
    if let Some(scale) = &currency {
        render_axis_labels(
            &mut svg,
            &frame,
            scale,
            frame.left - 10.0,
            "end",
            format_compact_currency,
        );
    }
    if let Some(scale) = &percent {
        render_axis_labels(
            &mut svg,
            &frame,
            scale,
            frame.right() + 10.0,
            "start",
            format_percent_tick,
        );
    }
    render_period_labels(&mut svg, points, &frame);

    for line in lines {
        let scale = match line.axis {
            Axis::Currency => currency.as_ref(),
            Axis::Percent => percent.as_ref(),
        };
        if let Some(scale) = scale {
            render_line(&mut svg, points, line, scale, &frame);
        }
    }

    svg.push_str("</svg>\n");
    svg
}

fn render_legend(svg: &mut String, lines: &[ChartLine], frame: &Frame) {
    let mut x = frame.left;
    for line in lines {
        let axis = match line.axis {
            Axis::Currency => "$",
            Axis::Percent => "%",
        };
        let label = format!("{} ({axis})", line.label);
        let _ = writeln!(
            svg,
            "<rect x=\"{x:.1}\" y=\"56\" width=\"14\" height=\"4\" rx=\"2\" fill=\"{}\"/>",
            line.color
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"62\" fill=\"{MUTED}\" font-family=\"{FONT_STACK}\" font-size=\"13\">{}</text>",
            x + 20.0,
            escape_markup(&label)
        );
        x += 20.0 + 7.5 * label.chars().count() as f64 + 24.0;
    }
}

fn render_axis_labels(
    svg: &mut String,
    frame: &Frame,
    scale: &AxisScale,
    x: f64,
    anchor: &str,
    label: fn(f64) -> String,
) {
    for tick in scale.ticks() {
        let _ = writeln!(
            svg,
            "<text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"{anchor}\" fill=\"{MUTED}\" font-family=\"{FONT_STACK}\" font-size=\"12\">{}</text>",
            frame.y(scale, tick) + 4.0,
            escape_markup(&label(tick))
        );
    }
}

fn render_period_labels(svg: &mut String, points: &[SeriesPoint], frame: &Frame) {
    for (idx, point) in points.iter().enumerate() {
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" fill=\"{MUTED}\" font-family=\"{FONT_STACK}\" font-size=\"12\">{}</text>",
            frame.x(idx, points.len()),
            frame.bottom() + 24.0,
            escape_markup(&point.period)
        );
    }
}

fn render_line(
    svg: &mut String,
    points: &[SeriesPoint],
    line: &ChartLine,
    scale: &AxisScale,
    frame: &Frame,
) {
    let mut path = String::new();
    let mut pen_down = false;
    let mut markers = String::new();
    for (idx, point) in points.iter().enumerate() {
        let Some(value) = point.get(&line.key).filter(|v| v.is_finite()) else {
            pen_down = false;
            continue;
        };
        let x = frame.x(idx, points.len());
        let y = frame.y(scale, value);
        let _ = write!(path, "{}{x:.1},{y:.1} ", if pen_down { 'L' } else { 'M' });
        pen_down = true;
        let _ = writeln!(
            markers,
            "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"3.5\" fill=\"{}\"/>",
            line.color
        );
    }
    if path.is_empty() {
        return;
    }
    let dash = match line.axis {
        Axis::Currency => "",
        Axis::Percent => " stroke-dasharray=\"6 4\"",
    };
    let _ = writeln!(
        svg,
        "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2.5\"{dash}/>",
        path.trim_end(),
        line.color
    );
    svg.push_str(&markers);
}

pub fn escape_markup(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record;
    use crate::projector::{default_series, project};

    fn table() -> MetricTable {
        MetricTable::new(vec![
            record("Revenue", &[("2017", 1169.09), ("2018", 1254.73)]),
            record("NOPBT (DEFAULT)", &[("2017", 436.27), ("2018", -26.74)]),
            record("ROIC (DEFAULT)", &[("2017", 0.5420), ("2018", 0.4811)]),
        ])
    }

    #[test]
    fn nice_scale_includes_zero_and_rounds_out() {
        let scale = AxisScale::nice(-26.74, 1254.73, 5);
        assert!(scale.min <= -26.74 && scale.min < 0.0);
        assert!(scale.max >= 1254.73);
        assert!((scale.step - 500.0).abs() < 1e-9);
        assert_eq!(scale.ticks().len(), 5);
    }

    #[test]
    fn flat_series_still_gets_a_range() {
        let scale = AxisScale::nice(0.0, 0.0, 5);
        assert!(scale.max > scale.min);
    }

    #[test]
    fn renders_both_axes_and_legend() {
        let table = table();
        let series = default_series();
        let points = project(&table, &series).unwrap();
        let surface =
            ChartSurface::render(&table, &points, &series, &ChartOptions::default()).unwrap();
        let svg = surface.svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("ROIC (DEFAULT) (%)"));
        assert!(svg.contains("Revenue ($)"));
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("$1.00K"));
        assert!(svg.contains("60.0%"));
        assert_eq!(svg.matches("<path").count(), 3);
        assert_eq!(surface.size(), (1200, 640));
    }

    #[test]
    fn oversized_surface_refuses_to_rasterise() {
        let table = table();
        let series = default_series();
        let points = project(&table, &series).unwrap();
        let options = ChartOptions {
            width: MAX_CHART_SIDE + 1,
            ..ChartOptions::default()
        };
        let surface = ChartSurface::render(&table, &points, &series, &options).unwrap();
        assert!(matches!(surface.to_png(), Err(ExportError::Raster(_))));
    }

    #[test]
    fn no_surface_without_points() {
        let table = MetricTable::default();
        let series = default_series();
        assert!(ChartSurface::render(&table, &[], &series, &ChartOptions::default()).is_none());
    }

    #[test]
    fn escapes_titles() {
        let table = table();
        let series = default_series();
        let points = project(&table, &series).unwrap();
        let options = ChartOptions {
            title: "P&L <2018>".into(),
            ..ChartOptions::default()
        };
        let surface = ChartSurface::render(&table, &points, &series, &options).unwrap();
        assert!(surface.svg().contains("P&amp;L &lt;2018&gt;"));
    }
}
