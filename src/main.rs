use crate::cli::{Cli, Commands, generate_completions};
use crate::progress::{ProgressState, Stage, run_with_spinner};
use crate::report::{HtmlReportContext, HtmlReportPaths, save_html_report};
use crate::summary::{SummaryContext, SummaryPaths, print_summary};
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::LevelFilter;
use metricboard::chart::ChartSurface;
use metricboard::config::{ConfigSource, Overrides, ReportConfig, load_config};
use metricboard::export::{
    ExportError, save_chart_png, save_chart_svg, save_csv, save_spreadsheet,
};
use metricboard::loader::load_table;
use metricboard::model::MetricTable;
use metricboard::projector::{SeriesPoint, project};
use std::future::Future;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

mod cli;
mod progress;
mod report;
mod summary;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    init_logging(cli.verbose);

    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    colored::control::set_override(use_color);

    match cli.command.take() {
        Some(Commands::Completions {
            shell,
            output_dir,
            install,
        }) => return generate_completions(shell, output_dir, install),
        Some(Commands::Series) => return print_series(&cli).await,
        None => {}
    }

    let run_started_at = Local::now();
    let export_count = [
        cli.save_spreadsheet.is_some(),
        cli.save_csv.is_some(),
        cli.save_chart.is_some(),
        cli.save_svg.is_some(),
        cli.save_html.is_some(),
    ]
    .into_iter()
    .filter(|requested| *requested)
    .count();
    let progress = ProgressState::new(!cli.no_progress, use_color, 1 + export_count);
    let config = resolve_config(&mut cli).await?;
    let view = config.table_view();

    let input_label = cli.input.display().to_string();
    let table = run_with_spinner(&progress, Stage::Load, &input_label, load_table(&cli.input))
        .await
        .with_context(|| format!("failed to load metrics from {input_label}"))?;

    let points = project(&table, &config.series).context("invalid chart series selection")?;
    log::debug!(
        "projected {} points across {} series",
        points.len(),
        config.series.len()
    );

    let surface = if cli.no_chart {
        log::info!("chart rendering disabled");
        None
    } else {
        ChartSurface::render(&table, &points, &config.series, &config.chart)
    };
    if let Some(surface) = &surface {
        let (width, height) = surface.size();
        log::debug!("rendered a {width}x{height} chart surface");
    }

    let spreadsheet_path = match cli.save_spreadsheet.as_deref() {
        Some(path) => {
            export_step(
                &progress,
                "spreadsheet",
                save_spreadsheet(&table, &config.spreadsheet_sheet, path),
            )
            .await
        }
        None => None,
    };
    let csv_path = match cli.save_csv.as_deref() {
        Some(path) => {
            export_step(&progress, "CSV", save_csv(&table, path, cli.archive_csv)).await
        }
        None => None,
    };
    let chart_path = match cli.save_chart.as_deref() {
        Some(path) => {
            export_step(&progress, "chart PNG", save_chart_png(surface.as_ref(), path)).await
        }
        None => None,
    };
    let svg_path = match cli.save_svg.as_deref() {
        Some(path) => {
            export_step(&progress, "chart SVG", save_chart_svg(surface.as_ref(), path)).await
        }
        None => None,
    };

    let html_path = match cli.save_html.as_deref() {
        Some(path) => {
            let html_context = HtmlReportContext {
                run_started_at: &run_started_at,
                input: &cli.input,
                table: &table,
                view: &view,
                chart: surface.as_ref(),
                series_count: config.series.len(),
                paths: HtmlReportPaths {
                    spreadsheet: spreadsheet_path.as_deref(),
                    csv: csv_path.as_deref(),
                    chart: chart_path.as_deref(),
                    svg: svg_path.as_deref(),
                },
                output_path: path,
            };
            export_step(&progress, "HTML report", async {
                save_html_report(path, &html_context).await?;
                Ok::<_, ExportError>(path.to_path_buf())
            })
            .await
        }
        None => None,
    };

    progress.clear();

    print_summary(&SummaryContext {
        input: &cli.input,
        run_started_at: &run_started_at,
        table: &table,
        view: &view,
        paths: SummaryPaths {
            spreadsheet: spreadsheet_path.as_deref(),
            csv: csv_path.as_deref(),
            chart: chart_path.as_deref(),
            svg: svg_path.as_deref(),
            html: html_path.as_deref(),
        },
        full_output: cli.full_output,
    });

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
}

async fn resolve_config(cli: &mut Cli) -> Result<ReportConfig> {
    let (mut config, source) = load_config(cli.config.as_deref()).await?;
    match &source {
        ConfigSource::Defaults => log::debug!("using built-in report configuration"),
        ConfigSource::File(path) => log::debug!("report configuration from {}", path.display()),
    }
    config
        .apply(Overrides {
            sort: cli.sort.take(),
            descending: cli.descending,
            hide: std::mem::take(&mut cli.hide),
            series: std::mem::take(&mut cli.series),
        })
        .context("command-line options produce an invalid configuration")?;
    Ok(config)
}

/// Runs one export behind a spinner. A failure is logged and yields `None`.
async fn export_step(
    progress: &ProgressState,
    label: &str,
    fut: impl Future<Output = Result<PathBuf, ExportError>>,
) -> Option<PathBuf> {
    match run_with_spinner(progress, Stage::Export, label, fut).await {
        Ok(path) => {
            log::info!("saved {label} to {}", path.display());
            Some(path)
        }
        Err(err) => {
            log::error!("{label} export failed: {err}");
            None
        }
    }
}

async fn print_series(cli: &Cli) -> Result<()> {
    let (mut config, _) = load_config(cli.config.as_deref()).await?;
    if !cli.series.is_empty() {
        config
            .apply(Overrides {
                series: cli.series.clone(),
                ..Overrides::default()
            })
            .context("command-line options produce an invalid configuration")?;
    }
    let table = load_input(&cli.input).await?;
    let points = project(&table, &config.series).context("invalid chart series selection")?;
    println!("{}", series_json(&points)?);
    Ok(())
}

async fn load_input(path: &Path) -> Result<MetricTable> {
    load_table(path)
        .await
        .with_context(|| format!("failed to load metrics from {}", path.display()))
}

fn series_json(points: &[SeriesPoint]) -> Result<String> {
    serde_json::to_string_pretty(points).context("failed to serialise chart series")
}
