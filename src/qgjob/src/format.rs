//! Terminal rendering: icons, colours, panels and simple tables.

use console::{pad_str, style, Alignment, StyledObject};
use qgjob_core::types::{DeviceStatus, JobStatus, Priority, QueueTier, Target};

pub fn priority_icon(priority: u8) -> &'static str {
    match priority {
        p if p >= 4 => "🔥",
        p if p >= 2 => "⚡",
        _ => "🐌",
    }
}

pub fn priority_band(priority: u8) -> &'static str {
    match priority {
        p if p >= 4 => "High",
        p if p >= 2 => "Normal",
        _ => "Low",
    }
}

/// `🔥 5`, coloured by band.
pub fn priority_indicator(priority: Priority) -> String {
    let p = priority.get();
    colour_by_priority(p, format!("{} {p}", priority_icon(p))).to_string()
}

/// `🔥 5 (High Priority)`.
pub fn priority_long(priority: Priority) -> String {
    let p = priority.get();
    colour_by_priority(p, format!("{} {p} ({} Priority)", priority_icon(p), priority_band(p)))
        .to_string()
}

fn colour_by_priority(priority: u8, text: String) -> StyledObject<String> {
    match priority {
        p if p >= 4 => style(text).red(),
        p if p >= 2 => style(text).yellow(),
        _ => style(text).blue(),
    }
}

pub fn status_icon(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "⏳",
        JobStatus::Running => "🔄",
        JobStatus::Completed => "✅",
        JobStatus::Failed => "❌",
    }
}

fn status_word(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "QUEUED",
        JobStatus::Running => "RUNNING",
        JobStatus::Completed => "DONE",
        JobStatus::Failed => "FAILED",
    }
}

/// `✅ DONE`, coloured by status.
pub fn status_indicator(status: JobStatus) -> String {
    let text = format!("{} {}", status_icon(status), status_word(status));
    match status {
        JobStatus::Queued => style(text).yellow(),
        JobStatus::Running => style(text).blue(),
        JobStatus::Completed => style(text).green(),
        JobStatus::Failed => style(text).red(),
    }
    .to_string()
}

pub fn device_status_indicator(status: DeviceStatus) -> String {
    match status {
        DeviceStatus::Available => style(status.as_str()).green(),
        DeviceStatus::Busy => style(status.as_str()).yellow(),
        DeviceStatus::Offline => style(status.as_str()).red(),
        DeviceStatus::Maintenance => style(status.as_str()).magenta(),
    }
    .to_string()
}

pub fn target_icon(target: Target) -> &'static str {
    match target {
        Target::Emulator => "📱",
        Target::Device => "📲",
        Target::Browserstack => "☁️",
    }
}

/// `high_priority` → `High Priority`.
pub fn title_case(raw: &str) -> String {
    raw.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn queue_name(tier: QueueTier) -> String {
    title_case(tier.as_str())
}

/// `45s`, `3m`, `2h`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

/// `12s ago` up to `3d ago`.
pub fn format_ago(secs: i64) -> String {
    let secs = secs.max(0);
    if secs >= 86_400 {
        format!("{}d ago", secs / 86_400)
    } else {
        format!("{} ago", format_duration(secs))
    }
}

/// Keep at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{kept}...")
}

/// Show only the file name of a test path, then cap its length.
pub fn short_test_path(path: &str, max: usize) -> String {
    let shown = match path.rsplit_once('/') {
        Some((_, file)) => format!(".../{file}"),
        None => path.to_string(),
    };
    if shown.chars().count() > max {
        truncate(&shown, max.saturating_sub(3))
    } else {
        shown
    }
}

/// Boxed block of lines with a title.
pub fn panel(title: &str, lines: &[String]) -> String {
    let width = lines
        .iter()
        .map(|l| console::measure_text_width(l))
        .chain(std::iter::once(console::measure_text_width(title) + 2))
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    let top_fill = width.saturating_sub(console::measure_text_width(title) + 1);
    out.push_str(&format!("╭─ {} {}╮\n", style(title).bold(), "─".repeat(top_fill)));
    for line in lines {
        out.push_str(&format!("│ {} │\n", pad_str(line, width, Alignment::Left, None)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(width + 2)));
    out
}

/// Column-aligned table with a bold header row.
pub struct Table {
    title: Option<String>,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            title: None,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|i| {
                self.rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .map(|c| console::measure_text_width(c))
                    .chain(std::iter::once(console::measure_text_width(&self.headers[i])))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| pad_str(c, *w, Alignment::Left, None).into_owned())
                .collect::<Vec<String>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = Vec::new();
        if let Some(title) = &self.title {
            out.push(style(title).bold().to_string());
        }
        let header_cells: Vec<String> = self
            .headers
            .iter()
            .map(|h| style(h).bold().cyan().to_string())
            .collect();
        out.push(line(&header_cells));
        let rule: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        out.push("─".repeat(rule));
        for row in &self.rows {
            out.push(line(row));
        }
        out.join("\n")
    }
}

pub fn print_error(message: &str) {
    eprintln!("{}", panel("Error", &[style(message).red().bold().to_string()]));
}

pub fn print_success(title: &str, message: &str) {
    println!("{}", panel(title, &[style(message).green().bold().to_string()]));
}

pub fn print_warning(title: &str, message: &str) {
    println!("{}", panel(title, &[style(message).yellow().bold().to_string()]));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> String {
        console::strip_ansi_codes(text).into_owned()
    }

    #[test]
    fn test_priority_icons() {
        assert_eq!(priority_icon(5), "🔥");
        assert_eq!(priority_icon(4), "🔥");
        assert_eq!(priority_icon(3), "⚡");
        assert_eq!(priority_icon(2), "⚡");
        assert_eq!(priority_icon(1), "🐌");
        let p = Priority::new(4).unwrap();
        assert_eq!(plain(&priority_long(p)), "🔥 4 (High Priority)");
        assert_eq!(plain(&priority_indicator(p)), "🔥 4");
    }

    #[test]
    fn test_status_indicators() {
        assert_eq!(plain(&status_indicator(JobStatus::Completed)), "✅ DONE");
        assert_eq!(plain(&status_indicator(JobStatus::Queued)), "⏳ QUEUED");
        assert_eq!(status_icon(JobStatus::Failed), "❌");
        assert_eq!(status_icon(JobStatus::Running), "🔄");
    }

    #[test]
    fn test_durations() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m");
        assert_eq!(format_duration(7300), "2h");
        assert_eq!(format_duration(-5), "0s");
        assert_eq!(format_ago(30), "30s ago");
        assert_eq!(format_ago(3 * 86_400 + 5), "3d ago");
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate("qualgent", 10), "qualgent");
        assert_eq!(truncate("qualgent-enterprise", 10), "qualgent-e...");
        assert_eq!(short_test_path("tests/login.spec.js", 23), ".../login.spec.js");
        assert_eq!(
            short_test_path("/a/b/an_extremely_long_test_name.spec.js", 23),
            ".../an_extremely_lon..."
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("high_priority"), "High Priority");
        assert_eq!(queue_name(QueueTier::Low), "Low Priority");
    }

    #[test]
    fn test_table_aligns_columns() {
        let mut table = Table::new(&["ID", "Status"]);
        table.add_row(vec!["1".to_string(), "queued".to_string()]);
        table.add_row(vec!["120".to_string(), "done".to_string()]);
        let rendered = plain(&table.render());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "ID   Status");
        assert_eq!(lines[2], "1    queued");
        assert_eq!(lines[3], "120  done");
    }
}
