use std::path::Path;

use tiller_common::SchemaVersion;

/// Render the status box: database, versions and pending migrations.
pub fn render_status(
    db_path: &Path,
    current: SchemaVersion,
    latest: SchemaVersion,
    pending: &[&str],
) -> Vec<String> {
    let version = env!("CARGO_PKG_VERSION");

    let dir_display = match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => db_path.to_string_lossy().replace(&home, "~"),
        _ => db_path.to_string_lossy().to_string(),
    };

    let pending_display = if pending.is_empty() {
        "none".to_string()
    } else {
        format!(
            "{} migration{} ({})",
            pending.len(),
            if pending.len() == 1 { "" } else { "s" },
            pending.join(", ")
        )
    };

    let state = match current.cmp(&latest) {
        std::cmp::Ordering::Equal => "up to date",
        std::cmp::Ordering::Less => "behind",
        std::cmp::Ordering::Greater => "ahead of this build",
    };

    // Layout
    let width = 70;
    let label_w = 12;
    let value_w = width - label_w - 4; // 4 for "│ " + " │"

    let title = format!("Tiller v{version}");
    let title_dashes = width - 2 - title.len() - 5; // 2 for ╭╮, 5 for "─── " + " "
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |l: &str, r: &str| format!("│ {:<label_w$}{:<value_w$} │", l, truncate(r, value_w));

    vec![
        top,
        row("", ""),
        row("Database", &dir_display),
        row("Current", &current.to_string()),
        row("Latest", &latest.to_string()),
        row("State", state),
        row("Pending", &pending_display),
        row("", ""),
        bottom,
    ]
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
