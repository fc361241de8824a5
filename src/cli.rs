use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate, generate_to};
use metricboard::projector::SeriesSpec;

pub const DEFAULT_INPUT_PATH: &str = "data/input/metrics.json";
pub const DEFAULT_SPREADSHEET_PATH: &str = "data/output/financial_metrics.xlsx";
pub const DEFAULT_CSV_PATH: &str = "data/output/financial_metrics.csv";
pub const DEFAULT_CHART_PATH: &str = "data/output/financial_chart.png";
pub const DEFAULT_SVG_PATH: &str = "data/output/financial_chart.svg";
pub const DEFAULT_HTML_PATH: &str = "data/output/report.html";

pub const INPUT_HELP: &str = "Metric table to load: a JSON array of {\"name\": ..., \"<period>\": value} objects, or a CSV with a leading name column. Use - to read JSON from stdin.";
pub const CONFIG_HELP: &str = "YAML report configuration (defaults to ./metricboard.yaml when present).";
pub const SERIES_HELP: &str = "Chart series as KEY=ROW or KEY=~NAME (repeatable; replaces the configured series).";
pub const SAVE_SPREADSHEET_HELP: &str = "Save the raw metric table as an .xlsx workbook (defaults to data/output/financial_metrics.xlsx when no path is provided).";
pub const SAVE_CSV_HELP: &str = "Save the raw metric table as CSV (defaults to data/output/financial_metrics.csv when no path is provided). Use --archive-csv to store a .gz instead.";
pub const SAVE_CHART_HELP: &str = "Save the chart as a PNG image (defaults to data/output/financial_chart.png when no path is provided).";
pub const SAVE_SVG_HELP: &str = "Save the chart as SVG markup (defaults to data/output/financial_chart.svg when no path is provided).";
pub const SAVE_HTML_HELP: &str = "Save the HTML report to the given file (defaults to data/output/report.html when no path is provided).";
pub const ARCHIVE_CSV_HELP: &str = "Archive the saved CSV output into a .gz file.";

#[derive(Debug, Parser)]
#[command(
    name = "metricboard",
    about = "Display a financial metrics table, project chart series, and export spreadsheets and chart images.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        default_value = DEFAULT_INPUT_PATH,
        help = INPUT_HELP
    )]
    pub input: PathBuf,
    #[arg(long, global = true, value_name = "FILE", help = CONFIG_HELP)]
    pub config: Option<PathBuf>,
    #[arg(
        long = "series",
        global = true,
        value_name = "SPEC",
        value_parser = parse_series,
        help = SERIES_HELP
    )]
    pub series: Vec<SeriesSpec>,
    #[arg(
        long,
        value_name = "COLUMN",
        help = "Sort rows by a column: `name` or a period label."
    )]
    pub sort: Option<String>,
    #[arg(long, help = "Sort in descending order.")]
    pub descending: bool,
    #[arg(
        long,
        value_name = "COLUMN",
        help = "Hide a period column from the table and HTML report (repeatable)."
    )]
    pub hide: Vec<String>,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_SPREADSHEET_PATH,
        help = SAVE_SPREADSHEET_HELP
    )]
    pub save_spreadsheet: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_CSV_PATH,
        help = SAVE_CSV_HELP
    )]
    pub save_csv: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_CHART_PATH,
        help = SAVE_CHART_HELP
    )]
    pub save_chart: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_SVG_PATH,
        help = SAVE_SVG_HELP
    )]
    pub save_svg: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_HTML_PATH,
        help = SAVE_HTML_HELP
    )]
    pub save_html: Option<PathBuf>,
    #[arg(long, help = ARCHIVE_CSV_HELP)]
    pub archive_csv: bool,
    #[arg(
        long,
        help = "Print every metric row instead of the first ten."
    )]
    pub full_output: bool,
    #[arg(long, help = "Skip rendering the chart; chart exports will report no surface.")]
    pub no_chart: bool,
    #[arg(long, help = "Disable progress spinner output.")]
    pub no_progress: bool,
    #[arg(long, help = "Disable colored terminal output.")]
    pub no_color: bool,
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence."
    )]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the projected chart series as JSON.
    Series,
    /// Generate shell completion scripts, optionally installing them for the current user.
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for.")]
        shell: Shell,
        #[arg(
            long,
            value_name = "DIR",
            help = "Directory to write the completion script to."
        )]
        output_dir: Option<PathBuf>,
        #[arg(
            long,
            help = "Install the completion script into the default location for the selected shell."
        )]
        install: bool,
    },
}

fn parse_series(input: &str) -> Result<SeriesSpec, String> {
    SeriesSpec::parse(input).map_err(|err| err.to_string())
}

pub fn generate_completions(
    shell: Shell,
    output_dir: Option<PathBuf>,
    install: bool,
) -> Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();

    let target_dir = if let Some(dir) = output_dir {
        Some(dir)
    } else if install {
        Some(default_install_dir(shell)?)
    } else {
        None
    };

    if let Some(dir) = target_dir {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create completion directory {}", dir.display()))?;
        let path = generate_to(shell, &mut command, bin_name, &dir)
            .context("failed to write completion file")?;
        println!("Installed {shell:?} completions to {}", path.display());
    } else {
        let mut stdout = io::stdout().lock();
        generate(shell, &mut command, bin_name, &mut stdout);
        stdout
            .flush()
            .context("failed to flush completion output")?;
    }

    Ok(())
}

fn default_install_dir(shell: Shell) -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| {
        anyhow!("HOME environment variable is not set; use --output-dir to specify a path")
    })?;
    let mut path = PathBuf::from(home);

    match shell {
        Shell::Bash => {
            path.push(".local/share/bash-completion/completions");
            Ok(path)
        }
        Shell::Elvish => {
            path.push(".elvish/lib/completions");
            Ok(path)
        }
        Shell::Fish => {
            path.push(".config/fish/completions");
            Ok(path)
        }
        Shell::PowerShell => {
            path.push(".local/share/powershell/Scripts");
            Ok(path)
        }
        Shell::Zsh => {
            path.push(".local/share/zsh/site-functions");
            Ok(path)
        }
        other => Err(anyhow!(
            "no default install location for {other:?}; specify --output-dir"
        )),
    }
}
