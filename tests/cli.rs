use calamine::{Data, Reader, Xlsx, open_workbook};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn sample_input() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/input/metrics.json")
}

fn run(dir: &tempfile::TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_metricboard"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["--no-progress", "--no-color"])
        .args(args)
        .output()
        .expect("failed to run metricboard")
}

#[test]
fn exports_every_format_and_prints_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = sample_input();
    let out = dir.path().join("out");
    let csv = out.join("metrics.csv");
    let xlsx = out.join("metrics.xlsx");
    let svg = out.join("chart.svg");
    let png = out.join("chart.png");
    let html = out.join("report.html");

    let output = run(
        &dir,
        &[
            "--input",
            input.to_str().unwrap(),
            "--save-csv",
            csv.to_str().unwrap(),
            "--save-spreadsheet",
            xlsx.to_str().unwrap(),
            "--save-svg",
            svg.to_str().unwrap(),
            "--save-chart",
            png.to_str().unwrap(),
            "--save-html",
            html.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Revenue"));
    assert!(stdout.contains("-$26.74"));
    assert!(stdout.contains("54.2%"));

    let csv_text = std::fs::read_to_string(&csv).unwrap();
    assert!(csv_text.starts_with("name,2017,2018"));
    assert!(csv_text.contains("NOPBT (DEFAULT),-26.74"));
    let mut workbook: Xlsx<_> = open_workbook(&xlsx).unwrap();
    let sheet = workbook.worksheet_range("Metrics").unwrap();
    assert_eq!(sheet.get_value((0, 7)), Some(&Data::String("2023".into())));
    assert_eq!(sheet.get_value((3, 1)), Some(&Data::Float(0.542)));
    assert!(std::fs::read(&png).unwrap().starts_with(b"\x89PNG"));
    assert!(std::fs::read_to_string(&svg).unwrap().contains("<svg"));

    let report = std::fs::read_to_string(&html).unwrap();
    assert!(report.contains("-$26.74"));
    assert!(report.contains("href=\"metrics.csv\""));
}

#[test]
fn missing_chart_surface_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = sample_input();
    let png = dir.path().join("chart.png");
    let csv = dir.path().join("metrics.csv");

    let output = run(
        &dir,
        &[
            "--input",
            input.to_str().unwrap(),
            "--no-chart",
            "--save-chart",
            png.to_str().unwrap(),
            "--save-csv",
            csv.to_str().unwrap(),
            "--archive-csv",
        ],
    );
    assert!(output.status.success());
    assert!(!png.exists());
    assert!(dir.path().join("metrics.csv.gz").exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("chart PNG export failed"));
}

#[test]
fn series_command_prints_projected_points() {
    let dir = tempfile::tempdir().unwrap();
    let input = sample_input();
    let output = run(&dir, &["--input", input.to_str().unwrap(), "series"]);
    assert!(output.status.success());

    let points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 7);
    assert_eq!(points[0]["period"], "2017");
    assert_eq!(points[0]["revenue"], 1169.09);
    assert_eq!(points[0]["nopbt"], -26.74);
    assert!((points[0]["roic"].as_f64().unwrap() - 54.2).abs() < 1e-9);
}

#[test]
fn series_can_be_selected_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let input = sample_input();
    let output = run(
        &dir,
        &[
            "--input",
            input.to_str().unwrap(),
            "--series",
            "margin=~Operating Margins",
            "series",
        ],
    );
    assert!(output.status.success());
    let points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!((points[0]["margin"].as_f64().unwrap() + 2.29).abs() < 1e-9);
    assert!(points[0].get("revenue").is_none());
}

#[test]
fn invalid_series_selection_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = sample_input();
    let output = run(
        &dir,
        &["--input", input.to_str().unwrap(), "--series", "roic=42"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid chart series selection"));
}

#[test]
fn loads_csv_input_with_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("metrics.csv");
    std::fs::write(
        &input,
        "name,2017,2018\n\
         Revenue,1169.09,1254.73\n\
         NOPBT (DEFAULT),-26.74,\n\
         ROIC (DEFAULT),0.542,n/a\n",
    )
    .unwrap();

    let output = run(&dir, &["--input", input.to_str().unwrap(), "series"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(points[1]["period"], "2018");
    assert_eq!(points[1]["revenue"], 1254.73);
    assert!(points[1].get("nopbt").is_none());
    assert!(points[1].get("roic").is_none());
}

#[test]
fn missing_input_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&dir, &["--input", "does-not-exist.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does-not-exist.json"));
}

#[test]
fn reads_json_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let input = std::fs::read(sample_input()).unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_metricboard"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["--no-progress", "--no-color", "--input", "-", "series"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run metricboard");
    child.stdin.take().unwrap().write_all(&input).unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(points.as_array().unwrap().len(), 7);
    assert_eq!(points[0]["revenue"], 1169.09);
}

#[test]
fn picks_up_config_from_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("metricboard.yaml"),
        "series: [{key: only, index: 0}]\n",
    )
    .unwrap();
    let input = sample_input();
    let output = run(&dir, &["--input", input.to_str().unwrap(), "series"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let first = points[0].as_object().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first["only"], 1169.09);
    assert!(first.get("roic").is_none());
}

#[test]
fn oversized_chart_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("metricboard.yaml"),
        "chart: {width: 100000, height: 100000}\n",
    )
    .unwrap();
    let input = sample_input();
    let png = dir.path().join("chart.png");
    let output = run(
        &dir,
        &["--input", input.to_str().unwrap(), "--save-chart", png.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(!png.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("chart size"));
}
