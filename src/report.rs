//! Plain-text rendering of an [`InferenceResult`] with `comfy_table`.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};

use crate::inference::InferenceResult;

const TABLE_WIDTH: u16 = 120;

/// Rendered tables for one analysis.
#[derive(Debug, Clone)]
pub struct InferenceTables {
    /// Estimate, interval, and p-value.
    pub effect: String,
    /// Resampling and interval diagnostics.
    pub diagnostics: String,
}

/// Render the effect and its diagnostics as text tables.
///
/// The interval cell is highlighted when it excludes 1 (no effect).
#[must_use]
pub fn render_inference_tables(result: &InferenceResult) -> InferenceTables {
    let level = format!("{:.0}% CI ({})", result.confidence_level * 100.0, result.method);
    let mut effect = make_table(&["estimate", &level, "p-value", "mean control", "mean treated"]);
    let interval = format!("[{:.4}, {:.4}]", result.interval.lower, result.interval.upper);
    let interval_cell = if result.interval.contains(1.0) {
        Cell::new(interval)
    } else {
        Cell::new(interval)
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    };
    effect.add_row(vec![
        Cell::new(format!("{:.4}", result.estimate)),
        interval_cell,
        Cell::new(format!("{:.4}", result.p_value)),
        Cell::new(format!("{:.4}", result.gamma_control)),
        Cell::new(format!("{:.4}", result.gamma_treated)),
    ]);

    let mut diagnostics = make_table(&["diagnostic", "value"]);
    let mut add = |label: &str, value: String| {
        diagnostics.add_row(vec![Cell::new(label), Cell::new(value)]);
    };
    add("replicates requested", result.replicates_requested.to_string());
    add("replicates failed", result.failed_replicates.to_string());
    for (kind, count) in &result.failure_tally {
        add(&format!("  {kind}"), count.to_string());
    }
    add("bootstrap bias", format!("{:.4}", result.bias));
    add("bootstrap std. error", format!("{:.4}", result.std_error));
    if let Some(bca) = result.bca {
        add("bca z0", format!("{:.4}", bca.z0));
        add("bca acceleration", format!("{:.5}", bca.acceleration));
        add(
            "bca quantile levels",
            format!("{:.4}, {:.4}", bca.alpha_lower, bca.alpha_upper),
        );
        add(
            "jackknife fits (failed)",
            format!("{} ({})", bca.jackknife_estimates, bca.jackknife_failures),
        );
    }

    InferenceTables {
        effect: effect.to_string(),
        diagnostics: diagnostics.to_string(),
    }
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(TABLE_WIDTH)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}
