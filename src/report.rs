use chrono::{DateTime, Local};
use metricboard::chart::{ChartSurface, escape_markup};
use metricboard::export::{ExportError, write_output_file};
use metricboard::formatting::{Tone, format_optional};
use metricboard::model::MetricTable;
use metricboard::view::{ColumnKey, TableView};
use std::path::Path;

pub struct HtmlReportPaths<'a> {
    pub(crate) spreadsheet: Option<&'a Path>,
    pub(crate) csv: Option<&'a Path>,
    pub(crate) chart: Option<&'a Path>,
    pub(crate) svg: Option<&'a Path>,
}

pub struct HtmlReportContext<'a> {
    pub(crate) run_started_at: &'a DateTime<Local>,
    pub(crate) input: &'a Path,
    pub(crate) table: &'a MetricTable,
    pub(crate) view: &'a TableView,
    pub(crate) chart: Option<&'a ChartSurface>,
    pub(crate) series_count: usize,
    pub(crate) paths: HtmlReportPaths<'a>,
    pub(crate) output_path: &'a Path,
}

pub async fn save_html_report(
    output_path: &Path,
    context: &HtmlReportContext<'_>,
) -> Result<(), ExportError> {
    let html = render_html_report(context);
    write_output_file(output_path, html.as_bytes()).await
}

pub(crate) fn render_html_report(context: &HtmlReportContext<'_>) -> String {
    let generated_at = context
        .run_started_at
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();
    let periods = context.view.visible_periods(context.table);
    let negatives = count_negatives(context.table, &periods);
    let title = format!(
        "Financial Metrics - {}",
        context.run_started_at.format("%Y-%m-%d")
    );

    let mut html = String::new();
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_markup(&title)));
    html.push_str("<style>\n");
    html.push_str(REPORT_STYLE);
    html.push_str("\n</style>\n</head>\n<body>\n");
    html.push_str("<div class=\"page\">\n");

    html.push_str("<header class=\"hero\">\n");
    html.push_str(&format!(
        "<div class=\"pill\">MetricBoard v{}</div>\n",
        env!("CARGO_PKG_VERSION")
    ));
    html.push_str("<h1>Financial Metrics</h1>\n");
    html.push_str("<div class=\"meta\">\n");
    html.push_str(&format!(
        "<div><span class=\"label\">Generated</span><span class=\"value mono\">{}</span></div>\n",
        escape_markup(&generated_at)
    ));
    html.push_str(&format!(
        "<div><span class=\"label\">Source</span><span class=\"value mono\">{}</span></div>\n",
        escape_markup(&context.input.display().to_string())
    ));
    html.push_str("</div>\n</header>\n");

    html.push_str("<section class=\"cards\">\n");
    for (label, value) in [
        ("Metrics", context.table.len()),
        ("Periods", context.table.periods().len()),
        ("Chart series", context.series_count),
        ("Negative values", negatives),
    ] {
        html.push_str(&format!(
            "<div class=\"card\"><div class=\"card-label\">{label}</div><div class=\"card-value\">{value}</div></div>\n"
        ));
    }
    html.push_str("</section>\n");

    html.push_str("<section class=\"table-section\">\n<h2>Metrics</h2>\n");
    if context.table.is_empty() {
        html.push_str("<p class=\"muted\">No metric data available.</p>\n");
    } else {
        html.push_str("<div class=\"table-wrap\">\n<table>\n");
        html.push_str(&render_table_header(context.view, &periods));
        html.push_str("<tbody>\n");
        html.push_str(&render_table_rows(context.table, context.view, &periods));
        html.push_str("</tbody>\n</table>\n</div>\n");
    }
    html.push_str("</section>\n");

    html.push_str("<section class=\"chart-section\">\n<h2>Trend</h2>\n");
    match context.chart {
        Some(surface) => {
            html.push_str("<div class=\"chart-wrap\">\n");
            html.push_str(surface.svg());
            html.push_str("</div>\n");
        }
        None => html.push_str("<p class=\"muted\">No chart was rendered for this run.</p>\n"),
    }
    html.push_str("</section>\n");

    html.push_str(&render_downloads(context));

    html.push_str("<footer class=\"footer\">Values are shown in compact USD; ROIC and margin metrics as percentages.</footer>\n");
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn count_negatives(table: &MetricTable, periods: &[&str]) -> usize {
    table
        .records()
        .iter()
        .flat_map(|record| periods.iter().filter_map(|period| record.value(period)))
        .filter(|value| Tone::of(value) == Tone::Negative)
        .count()
}

fn render_table_header(view: &TableView, periods: &[&str]) -> String {
    let mut header = String::new();
    header.push_str("<thead><tr>");
    header.push_str(&header_cell(view, &ColumnKey::Name));
    for period in periods {
        header.push_str(&header_cell(view, &ColumnKey::Period((*period).to_string())));
    }
    header.push_str("</tr></thead>\n");
    header
}

fn header_cell(view: &TableView, column: &ColumnKey) -> String {
    let label = escape_markup(&column.to_string());
    view.sort_marker(column).map_or_else(
        || format!("<th>{label}</th>"),
        |marker| {
            format!("<th class=\"sorted\">{label} <span class=\"arrow\">{marker}</span></th>")
        },
    )
}

fn render_table_rows(table: &MetricTable, view: &TableView, periods: &[&str]) -> String {
    let mut rows = String::new();
    for record in view.rows(table) {
        rows.push_str("<tr>");
        rows.push_str(&format!(
            "<td class=\"metric\">{}</td>",
            escape_markup(&record.name)
        ));
        for period in periods {
            let value = record.value(period);
            let tone = value.map_or(Tone::Neutral, Tone::of);
            rows.push_str(&format!(
                "<td class=\"num {}\">{}</td>",
                tone.css_class(),
                escape_markup(&format_optional(value, &record.name))
            ));
        }
        rows.push_str("</tr>\n");
    }
    rows
}

fn render_downloads(context: &HtmlReportContext<'_>) -> String {
    let items = [
        ("Spreadsheet", context.paths.spreadsheet),
        ("CSV", context.paths.csv),
        ("Chart PNG", context.paths.chart),
        ("Chart SVG", context.paths.svg),
    ];

    let mut section = String::new();
    section.push_str("<section class=\"downloads\">\n");
    section.push_str("<h3>Downloads</h3>\n");
    if items.iter().all(|(_, path)| path.is_none()) {
        section.push_str("<p class=\"muted\">No files were exported. Use --save-spreadsheet, --save-csv, --save-chart, or --save-svg.</p>\n");
        section.push_str("</section>\n");
        return section;
    }

    section.push_str("<div class=\"download-list\">\n");
    for (label, path) in items {
        section.push_str("<div class=\"download-item\">\n");
        section.push_str(&format!(
            "<div class=\"download-label\">{}</div>\n",
            escape_markup(label)
        ));
        if let Some(path) = path {
            let full_display = path.to_string_lossy();
            let display_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(full_display.as_ref());
            if let Some(rel) = relative_link(context.output_path, path) {
                section.push_str(&format!(
                    "<a class=\"download-link\" href=\"{}\" title=\"{}\">{}</a>\n",
                    escape_markup(&rel),
                    escape_markup(full_display.as_ref()),
                    escape_markup(display_name)
                ));
            } else {
                section.push_str(&format!(
                    "<span class=\"download-path\" title=\"{}\">{}</span>\n",
                    escape_markup(full_display.as_ref()),
                    escape_markup(display_name)
                ));
            }
        } else {
            section.push_str("<span class=\"download-path\">Not saved</span>\n");
        }
        section.push_str("</div>\n");
    }
    section.push_str("</div>\n</section>\n");
    section
}

fn relative_link(html_path: &Path, target: &Path) -> Option<String> {
    let html_dir = html_path.parent()?;
    let target_dir = target.parent()?;
    if html_dir == target_dir {
        target
            .file_name()
            .and_then(|name| name.to_str())
            .map(std::string::ToString::to_string)
    } else {
        None
    }
}

const REPORT_STYLE: &str = r#"
:root {
  --bg: #f6f3ec;
  --ink: #1f1b16;
  --muted: #6b635b;
  --card: #ffffff;
  --accent: #3d405b;
  --up: #2f6f54;
  --down: #8b2d17;
  --border: #e2d6c6;
  --shadow: 0 16px 40px rgba(34, 30, 24, 0.08);
}

* { box-sizing: border-box; }

body {
  margin: 0;
  font-family: "Manrope", "Segoe UI", sans-serif;
  color: var(--ink);
  background: var(--bg);
}

.page { max-width: 1240px; margin: 0 auto; padding: 40px 24px 56px; }

.hero, .card, .table-wrap, .chart-wrap, .downloads {
  background: var(--card);
  border: 1px solid var(--border);
  border-radius: 18px;
  box-shadow: var(--shadow);
}

.hero { padding: 28px 32px; }

.pill {
  display: inline-block;
  padding: 4px 12px;
  border-radius: 999px;
  background: rgba(61, 64, 91, 0.12);
  color: var(--accent);
  font-size: 12px;
  font-weight: 600;
  text-transform: uppercase;
  letter-spacing: 0.08em;
}

h1 { margin: 14px 0 12px; font-size: 2.4rem; }
h2 { margin: 0 0 12px; font-size: 1.5rem; }

.meta { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 12px; }
.label { display: block; font-size: 12px; text-transform: uppercase; color: var(--muted); }
.value { font-weight: 600; }
.mono, .num { font-family: "JetBrains Mono", ui-monospace, monospace; }

.cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 16px; margin: 24px 0; }
.card { padding: 16px 20px; }
.card-label { font-size: 12px; text-transform: uppercase; color: var(--muted); margin-bottom: 6px; }
.card-value { font-size: 26px; font-weight: 600; color: var(--accent); }

.table-section, .chart-section { margin: 28px 0; }
.table-wrap { overflow: auto; }

table { width: 100%; border-collapse: collapse; }

thead th {
  background: var(--accent);
  color: #f8fafc;
  text-align: right;
  font-size: 12px;
  text-transform: uppercase;
  padding: 12px 14px;
}

thead th:first-child { text-align: left; }
thead th.sorted .arrow { opacity: 0.75; }

tbody td { padding: 10px 14px; border-bottom: 1px solid var(--border); font-size: 14px; }
tbody tr:nth-child(even) { background: rgba(246, 243, 236, 0.6); }

.metric { font-weight: 600; }
.num { text-align: right; font-variant-numeric: tabular-nums; }
.num.up, .num.neutral { color: var(--up); }
.num.down { color: var(--down); }

.chart-wrap { padding: 12px; overflow: auto; }
.chart-wrap svg { width: 100%; height: auto; }

.downloads { padding: 20px 24px; }
.downloads h3 { margin: 0 0 12px; }
.download-list { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 12px; }
.download-item { padding: 10px 12px; border-radius: 12px; border: 1px solid var(--border); }
.download-label { font-size: 12px; text-transform: uppercase; color: var(--muted); margin-bottom: 4px; }
.download-link, .download-path { color: var(--down); font-weight: 600; text-decoration: none; word-break: break-all; }
.download-link:hover { text-decoration: underline; }

.muted { color: var(--muted); }
.footer { margin-top: 24px; color: var(--muted); font-size: 13px; text-align: center; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use metricboard::chart::ChartOptions;
    use metricboard::model::MetricRecord;
    use metricboard::projector::{default_series, project};
    use std::path::PathBuf;

    fn table() -> MetricTable {
        let rows = [
            ("Revenue", 1169.09, 1254.73),
            ("NOPBT (DEFAULT)", -26.74, 436.27),
            ("ROIC (DEFAULT)", 0.5420, 0.4811),
        ];
        MetricTable::new(
            rows.iter()
                .map(|(name, a, b)| {
                    MetricRecord::new(*name, [("2017", *a), ("2018", *b)].into_iter().collect())
                })
                .collect(),
        )
    }

    fn render(view: &TableView, chart: Option<&ChartSurface>, csv: Option<&Path>) -> String {
        let started = Local::now();
        let table = table();
        let context = HtmlReportContext {
            run_started_at: &started,
            input: Path::new("data/input/metrics.json"),
            table: &table,
            view,
            chart,
            series_count: 3,
            paths: HtmlReportPaths {
                spreadsheet: None,
                csv,
                chart: None,
                svg: None,
            },
            output_path: Path::new("out/report.html"),
        };
        render_html_report(&context)
    }

    #[test]
    fn report_contains_formatted_cells_and_chart() {
        let table = table();
        let series = default_series();
        let points = project(&table, &series).unwrap();
        let surface = ChartSurface::render(&table, &points, &series, &ChartOptions::default());
        let html = render(&TableView::default(), surface.as_ref(), None);
        assert!(html.contains("<td class=\"num down\">-$26.74</td>"));
        assert!(html.contains("<td class=\"num up\">54.2%</td>"));
        assert!(html.contains("<svg"));
        assert!(html.contains("No files were exported"));
        assert!(html.contains("<div class=\"card-value\">1</div>"));
    }

    #[test]
    fn negative_count_ignores_hidden_and_stray_periods() {
        let mut records = table().records().to_vec();
        records.push(MetricRecord::new(
            "Operating Margins",
            [("2018", 0.35), ("2016", -0.02)].into_iter().collect(),
        ));
        let table = MetricTable::new(records);
        assert_eq!(count_negatives(&table, &["2017", "2018"]), 1);
        assert_eq!(count_negatives(&table, &["2018"]), 0);
    }

    #[test]
    fn report_drops_hidden_columns_and_links_siblings() {
        let mut view = TableView::default();
        view.visibility.hide(ColumnKey::Period("2017".into()));
        let csv = PathBuf::from("out/financial_metrics.csv");
        let html = render(&view, None, Some(&csv));
        assert!(!html.contains("<th>2017</th>"));
        assert!(html.contains("<th>2018</th>"));
        assert!(html.contains("No chart was rendered"));
        assert!(html.contains("href=\"financial_metrics.csv\""));
    }
}
