use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use metricboard::formatting::{Tone, format_optional};
use metricboard::model::MetricTable;
use metricboard::view::{ColumnKey, TableView};
use std::path::Path;

const COMPACT_ROWS: usize = 10;
const MAX_NAME_WIDTH: usize = 32;

pub struct SummaryPaths<'a> {
    pub(crate) spreadsheet: Option<&'a Path>,
    pub(crate) csv: Option<&'a Path>,
    pub(crate) chart: Option<&'a Path>,
    pub(crate) svg: Option<&'a Path>,
    pub(crate) html: Option<&'a Path>,
}

pub struct SummaryContext<'a> {
    pub(crate) input: &'a Path,
    pub(crate) run_started_at: &'a DateTime<Local>,
    pub(crate) table: &'a MetricTable,
    pub(crate) view: &'a TableView,
    pub(crate) paths: SummaryPaths<'a>,
    pub(crate) full_output: bool,
}

pub fn print_summary(context: &SummaryContext<'_>) {
    println!();
    print_summary_header(context);
    print_summary_paths(&context.paths);
    println!();
    println!("{}", "Financial Metrics".bold().bright_magenta());
    let table_width = print_metric_table(context);
    if table_width > 0 {
        let divider = "=".repeat(table_width);
        println!("{}", divider.bright_cyan());
    }
}

fn print_summary_header(context: &SummaryContext<'_>) {
    println!(
        "{}",
        "==================== MetricBoard Report ===================="
            .bold()
            .bright_cyan()
    );
    println!(
        "{} {}",
        "Run started".bright_yellow().bold(),
        context
            .run_started_at
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
            .bright_white()
    );
    println!(
        "{} {} | {} | {}",
        "Input".bright_yellow().bold(),
        format!("{}", context.input.display()).bright_white(),
        format!("Metrics: {}", context.table.len()).bright_white(),
        format!("Periods: {}", context.table.periods().len()).bright_white(),
    );
}

fn print_summary_paths(paths: &SummaryPaths<'_>) {
    print_path_line(
        "Spreadsheet",
        paths.spreadsheet,
        "not saved (use --save-spreadsheet)",
    );
    print_path_line("CSV", paths.csv, "not saved (use --save-csv)");
    print_path_line("Chart PNG", paths.chart, "not saved (use --save-chart)");
    print_path_line("Chart SVG", paths.svg, "not saved (use --save-svg)");
    print_path_line("HTML Report", paths.html, "not saved (use --save-html)");
}

fn print_path_line(label: &str, path: Option<&Path>, hint: &str) {
    let label_colored = label.bright_yellow().bold();
    match path {
        Some(path) => println!(
            "{} {}",
            label_colored,
            format!("{}", path.display()).bright_white()
        ),
        None => println!("{} {}", label_colored, hint.bright_black()),
    }
}

/// Plain-text cells of the visible table, padded, with the tone of each value.
pub(crate) struct TableLayout {
    pub(crate) header: String,
    pub(crate) separator: String,
    pub(crate) rows: Vec<Vec<(String, Tone)>>,
    pub(crate) hidden_rows: usize,
}

pub(crate) fn layout_table(
    table: &MetricTable,
    view: &TableView,
    full_output: bool,
) -> TableLayout {
    let periods = view.visible_periods(table);
    let rows = view.rows(table);
    let limit = if full_output { rows.len() } else { COMPACT_ROWS };

    let header_label = |column: &ColumnKey| {
        view.sort_marker(column).map_or_else(
            || column.to_string(),
            |marker| format!("{column} {marker}"),
        )
    };
    let name_header = header_label(&ColumnKey::Name);
    let period_headers: Vec<String> = periods
        .iter()
        .map(|period| header_label(&ColumnKey::Period((*period).to_string())))
        .collect();

    let cells: Vec<(String, Vec<(String, Tone)>)> = rows
        .iter()
        .take(limit)
        .map(|record| {
            let values = periods
                .iter()
                .map(|period| {
                    let value = record.value(period);
                    let tone = value.map_or(Tone::Neutral, Tone::of);
                    (format_optional(value, &record.name), tone)
                })
                .collect();
            (truncate(&record.name, MAX_NAME_WIDTH), values)
        })
        .collect();

    let name_width = cells
        .iter()
        .map(|(name, _)| name.chars().count())
        .chain(std::iter::once(name_header.chars().count()))
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = period_headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            cells
                .iter()
                .map(|(_, values)| values[idx].0.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut header = format!("{name_header:<name_width$}");
    let mut separator = "-".repeat(name_width);
    for (title, width) in period_headers.iter().zip(widths.iter().copied()) {
        header.push_str(&format!(" | {title:>width$}"));
        separator.push_str(&format!("-+-{}", "-".repeat(width)));
    }

    let rows = cells
        .into_iter()
        .map(|(name, values)| {
            let mut line = vec![(format!("{name:<name_width$}"), Tone::Neutral)];
            line.extend(
                values
                    .into_iter()
                    .zip(widths.iter().copied())
                    .map(|((text, tone), width)| (format!("{text:>width$}"), tone)),
            );
            line
        })
        .collect();

    TableLayout {
        header,
        separator,
        rows,
        hidden_rows: table.len().saturating_sub(limit),
    }
}

fn print_metric_table(context: &SummaryContext<'_>) -> usize {
    if context.table.is_empty() {
        let message = "No metric data available.";
        println!("{}", message.bright_black());
        return message.len();
    }

    let layout = layout_table(context.table, context.view, context.full_output);
    let mut max_width = layout.header.len().max(layout.separator.len());
    println!("{}", layout.header.bold().bright_white());
    println!("{}", layout.separator.bright_black());
    for row in &layout.rows {
        let mut line = String::new();
        let mut width = 0;
        for (idx, (text, tone)) in row.iter().enumerate() {
            if idx > 0 {
                line.push_str(&" | ".bright_black().to_string());
                width += 3;
            }
            width += text.chars().count();
            line.push_str(&paint(text, *tone, idx == 0).to_string());
        }
        max_width = max_width.max(width);
        println!("{line}");
    }
    if layout.hidden_rows > 0 {
        let message = format!(
            "... {} more metrics (use --full-output to display all).",
            layout.hidden_rows
        );
        max_width = max_width.max(message.len());
        println!("{}", message.bright_black());
    }

    max_width
}

fn paint(text: &str, tone: Tone, is_name: bool) -> ColoredString {
    if is_name {
        return text.bright_white().bold();
    }
    match tone {
        Tone::Negative => text.bright_red(),
        Tone::Positive | Tone::Neutral => text.bright_green(),
    }
}

fn truncate(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let mut cut: String = name.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricboard::model::MetricRecord;

    fn table() -> MetricTable {
        let rows: [(&str, [f64; 2]); 3] = [
            ("Revenue", [1169.09, 1254.73]),
            ("NOPBT (DEFAULT)", [-26.74, 436.27]),
            ("ROIC (DEFAULT)", [0.5420, 0.4811]),
        ];
        MetricTable::new(
            rows.iter()
                .map(|(name, values)| {
                    MetricRecord::new(
                        *name,
                        [("2017", values[0]), ("2018", values[1])]
                            .into_iter()
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn layout_formats_and_marks_negatives() {
        let layout = layout_table(&table(), &TableView::default(), true);
        assert!(layout.header.starts_with("name"));
        assert_eq!(layout.rows.len(), 3);
        let nopbt = &layout.rows[1];
        assert_eq!(nopbt[1].0.trim(), "-$26.74");
        assert_eq!(nopbt[1].1, Tone::Negative);
        assert_eq!(layout.rows[2][1].0.trim(), "54.2%");
        assert_eq!(layout.rows[0][1].0.trim(), "$1.17K");
        assert_eq!(layout.hidden_rows, 0);
    }

    #[test]
    fn layout_respects_hidden_columns_and_sort() {
        let mut view = TableView::default();
        view.visibility.hide(ColumnKey::Period("2017".into()));
        view.toggle_sort(ColumnKey::Period("2018".into()));
        let layout = layout_table(&table(), &view, true);
        assert!(!layout.header.contains("2017"));
        assert!(layout.header.contains("2018 ^"));
        assert_eq!(layout.rows[0][0].0.trim(), "ROIC (DEFAULT)");
        assert!(layout.rows.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn compact_layout_limits_rows() {
        let records = (0..12)
            .map(|i| {
                MetricRecord::new(
                    format!("Metric {i}"),
                    [("2017", f64::from(i))].into_iter().collect(),
                )
            })
            .collect();
        let layout = layout_table(&MetricTable::new(records), &TableView::default(), false);
        assert_eq!(layout.rows.len(), COMPACT_ROWS);
        assert_eq!(layout.hidden_rows, 2);
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("Revenue", 10), "Revenue");
        assert_eq!(truncate("Net Operating Profit", 10), "Net Ope...");
    }
}
