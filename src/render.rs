//! Plain-text rendering of the view models.

use dashboard_core::aggregator::ResultsBoard;
use dashboard_core::progress::SyntheticProgress;
use dashboard_core::wizard::ResultsView;
use dashboard_core::*;

const BAR_WIDTH: usize = 30;

/// `1234567` -> `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut res = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            res.push(',');
        }
        res.push(c);
    }
    res
}

pub fn format_percent(x: f64) -> String {
    format!("{:.1}%", x)
}

pub fn bar(value: f64, max: f64, width: usize) -> String {
    let filled = if max <= 0.0 {
        0
    } else {
        ((value / max) * width as f64).round().clamp(0.0, width as f64) as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn title(text: &str) -> Vec<String> {
    vec![text.to_string(), "=".repeat(text.chars().count())]
}

pub fn render_datasets(heading: &str, entries: &[DatasetEntry]) -> String {
    let mut lines = title(heading);
    if entries.is_empty() {
        lines.push("(no datasets)".to_string());
    }
    for e in entries {
        lines.push(format!(
            "{:>6}  {:<40} {}",
            e.id,
            e.name,
            e.created_at.as_deref().unwrap_or("-")
        ));
    }
    lines.join("\n")
}

pub fn render_operations() -> String {
    let mut lines = title("Cleaning operations");
    for op in CLEANING_OPERATIONS.iter() {
        lines.push(format!("- {}: {}", op.name, op.description));
    }
    lines.join("\n")
}

pub fn render_upload(file: &UploadedFile) -> String {
    format!(
        "Uploaded {} (id {}, {}, {})",
        file.display_name, file.identifier, file.size_label, file.uploaded_at
    )
}

pub fn render_summary(summary: &CleaningSummary) -> String {
    let mut lines = title("Cleaning summary");
    lines.push(format!("Total records:   {}", format_count(summary.total_records)));
    lines.push(format!("Kept:            {}", format_count(summary.records_kept)));
    lines.push(format!(
        "Removed:         {} ({})",
        format_count(summary.records_removed),
        format_percent(summary.removed_percent())
    ));
    lines.push(format!("Precision:       {}", format_percent(summary.precision_percent)));
    lines.push(format!(
        "Completeness:    {}",
        format_percent(summary.completeness_percent)
    ));
    lines.join("\n")
}

pub fn render_metrics(metrics: &TrainingMetrics) -> String {
    let mut lines = title("Model metrics");
    lines.push(format!("Accuracy:  {}", format_percent(metrics.accuracy * 100.0)));
    lines.push(format!("F1 score:  {:.2}", metrics.f1_score));
    lines.push(format!("Precision: {}", format_percent(metrics.precision * 100.0)));
    lines.push(format!("Recall:    {}", format_percent(metrics.recall * 100.0)));
    lines.join("\n")
}

pub fn progress_line(progress: SyntheticProgress) -> String {
    format!(
        "[{}] {:>3}% {}",
        bar(progress.percent() as f64, 100.0, 20),
        progress.percent(),
        progress.stage_label()
    )
}

fn render_series(heading: &str, points: &[DataPoint]) -> Vec<String> {
    let mut lines = title(heading);
    if points.is_empty() {
        lines.push("(no data)".to_string());
        return lines;
    }
    let max = points.iter().map(|p| p.value).fold(0.0, f64::max);
    for p in points {
        lines.push(format!(
            "{:<16} {} {}",
            p.label,
            bar(p.value, max, BAR_WIDTH),
            p.value
        ));
    }
    lines
}

pub fn render_results(view: &ResultsView) -> String {
    let mut lines = vec![render_summary(&view.summary), String::new()];
    lines.extend(render_series("Distribution by region", &view.distribution));
    lines.push(String::new());
    lines.extend(render_series("Participation trend", &view.trend));
    lines.push(String::new());
    lines.extend(title("Predictions"));
    if view.predictions.is_empty() {
        lines.push("(no data)".to_string());
    }
    for p in view.predictions.iter() {
        lines.push(format!(
            "{:<24} {} {:>6.2}%  confidence {}  {}",
            p.party,
            bar(p.prediction, 100.0, BAR_WIDTH),
            p.prediction,
            format_percent(p.confidence),
            p.status
        ));
    }
    lines.join("\n")
}

pub fn render_board(board: &ResultsBoard, updated_at: &str) -> String {
    let kpis = board.kpis();
    let mut lines = title(&format!("Results: {}", board.selection().label()));
    lines.push(format!("Last update:   {}", updated_at));
    lines.push(format!("Total voters:  {}", format_count(kpis.total_voters)));
    lines.push(format!("Votes cast:    {}", format_count(board.total_votes())));
    lines.push(format!(
        "Participation: {}",
        format_percent(board.participation_percent())
    ));
    lines.push(String::new());

    let parties = board.visible_parties();
    let max = board.max_votes() as f64;
    if parties.is_empty() {
        lines.push("(no party results)".to_string());
    }
    for p in parties.iter() {
        lines.push(format!(
            "{:<24} {} {:>12} {:>7}",
            p.party_name,
            bar(p.votes as f64, max, BAR_WIDTH),
            format_count(p.votes),
            format_percent(board.party_share(p))
        ));
    }

    if !board.regions().is_empty() {
        lines.push(String::new());
        lines.extend(title("Participation by region"));
        for region in board.regions().iter() {
            let leader = board
                .leading_party(region)
                .map(|(name, _)| name)
                .unwrap_or("-");
            lines.push(format!(
                "{:<20} {:>7} {:>12}  {}",
                region.region,
                format_percent(region.percentage),
                format_count(region.votes),
                leader
            ));
        }
    }
    lines.push(String::new());
    lines.push(format!("Regions: {}", board.region_options().join(", ")));
    lines.join("\n")
}
