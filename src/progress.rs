use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::Cell;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const TICKS_UNICODE: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";
const TICKS_ASCII: &str = "|/-\\ ";
const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Load,
    Export,
}

impl Stage {
    const fn verb(self) -> &'static str {
        match self {
            Self::Load => "Loading",
            Self::Export => "Exporting",
        }
    }
}

/// Spinners for the steps of one run, numbered `[n/total]`.
pub struct ProgressState {
    multi: MultiProgress,
    style: ProgressStyle,
    total: usize,
    done: Cell<usize>,
}

impl ProgressState {
    pub(crate) fn new(enabled: bool, use_color: bool, total: usize) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr_with_hz(15)
        } else {
            ProgressDrawTarget::hidden()
        };
        let template = if use_color {
            "{spinner:.cyan.bold} {msg}"
        } else {
            "{spinner} {msg}"
        };
        let ticks = if is_dumb_term() {
            TICKS_ASCII
        } else {
            TICKS_UNICODE
        };
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(ticks);
        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            total: total.max(1),
            done: Cell::new(0),
        }
    }

    fn next_step(&self) -> usize {
        let step = (self.done.get() + 1).min(self.total);
        self.done.set(step);
        step
    }

    pub(crate) fn clear(&self) {
        let _ = self.multi.clear();
    }
}

fn is_dumb_term() -> bool {
    std::env::var("TERM").is_ok_and(|term| term.eq_ignore_ascii_case("dumb"))
}

fn step_message(step: usize, total: usize, stage: Stage, label: &str) -> String {
    format!(
        "{} {} {}",
        format!("[{step}/{total}]").bright_yellow().bold(),
        stage.verb().bright_cyan().bold(),
        label.bright_white()
    )
}

fn elapsed_label(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

/// Awaits `fut` behind a spinner that ends as `done` or `failed: <error>`.
pub async fn run_with_spinner<T, E: Display>(
    progress: &ProgressState,
    stage: Stage,
    label: &str,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let message = step_message(progress.next_step(), progress.total, stage, label);
    let bar = progress.multi.add(ProgressBar::new_spinner());
    bar.set_style(progress.style.clone());
    bar.set_message(message.clone());
    bar.enable_steady_tick(TICK_INTERVAL);

    let result = fut.await;
    let elapsed = elapsed_label(bar.elapsed());
    let outcome = match &result {
        Ok(_) => format!("{} {}", "done".bright_green().bold(), elapsed.bright_black()),
        Err(err) => format!(
            "{} {}",
            "failed:".bright_red().bold(),
            err.to_string().bright_black()
        ),
    };
    bar.finish_with_message(format!("{message} {outcome}"));
    result
}
