use crate::model::CellValue;

const PERCENT_MARKERS: [&str; 2] = ["ROIC", "Margins"];
const COMPACT_TIERS: [(f64, &str); 5] = [
    (1.0, ""),
    (1e3, "K"),
    (1e6, "M"),
    (1e9, "B"),
    (1e12, "T"),
];
const MISSING: &str = "-";

/// How a metric's values are displayed, decided from the metric name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStyle {
    Currency,
    Percent,
}

impl ValueStyle {
    pub fn classify(name: &str) -> Self {
        if PERCENT_MARKERS.iter().any(|marker| name.contains(marker)) {
            Self::Percent
        } else {
            Self::Currency
        }
    }
}

/// Sign of a cell, for callers that colour negative values differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Negative,
    Positive,
    Neutral,
}

impl Tone {
    pub fn of(value: &CellValue) -> Self {
        match value {
            CellValue::Number(v) if *v < 0.0 => Self::Negative,
            CellValue::Number(v) if *v > 0.0 => Self::Positive,
            _ => Self::Neutral,
        }
    }

    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Negative => "down",
            Self::Positive => "up",
            Self::Neutral => "neutral",
        }
    }
}

/// Formats a cell for display. Text cells pass through unchanged.
pub fn format_value(value: &CellValue, metric_name: &str) -> String {
    match value {
        CellValue::Number(number) => format_number(*number, metric_name),
        CellValue::Text(text) => text.clone(),
    }
}

pub fn format_number(value: f64, metric_name: &str) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    match ValueStyle::classify(metric_name) {
        ValueStyle::Percent => format_percent(value),
        ValueStyle::Currency => format_compact_currency(value),
    }
}

pub fn format_optional(value: Option<&CellValue>, metric_name: &str) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format_value(v, metric_name))
}

/// `0.542` -> `54.2%`
pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// US-dollar compact notation with two decimals: `1169.09` -> `$1.17K`.
pub fn format_compact_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    let mut tier = COMPACT_TIERS
        .iter()
        .rposition(|(scale, _)| magnitude >= *scale)
        .unwrap_or(0);
    let mut mantissa = round_cents(magnitude / COMPACT_TIERS[tier].0);
    // 999.999 rounds to 1000.00; show it as 1.00 of the next tier instead.
    if mantissa >= 1000.0 && tier + 1 < COMPACT_TIERS.len() {
        tier += 1;
        mantissa = round_cents(magnitude / COMPACT_TIERS[tier].0);
    }
    format!("{sign}${mantissa:.2}{}", COMPACT_TIERS[tier].1)
}

/// Axis tick label for a value already scaled to percentage units.
pub fn format_percent_tick(percent: f64) -> String {
    format!("{percent:.1}%")
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
