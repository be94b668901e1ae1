//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};

use a3s_offline_core::Component;
use a3s_offline_runtime::{ExportResult, StatusRow};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format seconds as `1h 02m 03s`, `2m 03s` or `3.4s`.
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let total = secs.round() as u64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {mins:02}m {secs:02}s")
    } else {
        format!("{mins}m {secs:02}s")
    }
}

/// Per-component version status: recorded vs latest.
pub fn status_table(rows: &[StatusRow]) -> Table {
    let mut table = new_table(&["COMPONENT", "RECORDED", "LATEST", "STATUS"]);
    for row in rows {
        table.add_row(vec![
            row.component.clone(),
            row.prior.clone().unwrap_or_else(|| "-".to_string()),
            row.latest.clone().unwrap_or_else(|| "-".to_string()),
            row.status.to_string(),
        ]);
    }
    table
}

/// Configured components.
pub fn components_table(components: &[Component]) -> Table {
    let mut table = new_table(&["NAME", "IMAGE", "PATTERN", "SELECTION", "SCHEME"]);
    for component in components {
        let pattern = match &component.exclude_pattern {
            Some(exclude) => format!("{} (exclude {})", component.tag_pattern, exclude),
            None => component.tag_pattern.clone(),
        };
        table.add_row(vec![
            component.name.clone(),
            component.image(),
            pattern,
            component.selection.to_string(),
            component.scheme.to_string(),
        ]);
    }
    table
}

/// One line per export work item.
pub fn export_table(results: &[ExportResult]) -> Table {
    let mut table = new_table(&["IMAGE", "VERSION", "ARCH", "RESULT", "SIZE", "DETAIL"]);
    for result in results {
        let outcome = if !result.succeeded() {
            "failed"
        } else if result.export_skipped {
            "reused"
        } else {
            "exported"
        };
        let size = result
            .file_path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|| "-".to_string());
        let detail = result
            .error_message
            .clone()
            .unwrap_or_else(|| format!("{} attempt(s)", result.attempts));
        table.add_row(vec![
            result.image_name.clone(),
            result.version.clone(),
            result.arch.clone(),
            outcome.to_string(),
            size,
            detail,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_offline_runtime::RowStatus;
    use std::path::PathBuf;

    fn render(mut table: Table) -> String {
        table.force_no_tty();
        table.to_string()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(3.42), "3.4s");
        assert_eq!(format_duration(123.0), "2m 03s");
        assert_eq!(format_duration(3723.0), "1h 02m 03s");
    }

    #[test]
    fn test_new_table() {
        let rendered = render(new_table(&["A", "B"]));
        assert!(rendered.contains('A'));
        assert!(rendered.contains('B'));
    }

    #[test]
    fn test_status_table() {
        let rows = vec![
            StatusRow {
                component: "redis".to_string(),
                prior: Some("7.2.0".to_string()),
                latest: Some("7.4.0".to_string()),
                status: RowStatus::Update,
            },
            StatusRow {
                component: "nacos".to_string(),
                prior: None,
                latest: None,
                status: RowStatus::Unresolved,
            },
        ];
        let rendered = render(status_table(&rows));
        assert!(rendered.contains("7.4.0"));
        assert!(rendered.contains("update"));
        assert!(rendered.contains("unresolved"));
    }

    #[test]
    fn test_components_table() {
        let rendered = render(components_table(
            &a3s_offline_core::SyncConfig::default_components(),
        ));
        assert!(rendered.contains("docker.io/minio/minio"));
        assert!(rendered.contains("timestamp-release"));
        assert!(rendered.contains("exclude ^buildcache-.*"));
    }

    #[test]
    fn test_export_table_failure_detail() {
        let result = ExportResult {
            component: "redis".to_string(),
            image_name: "redis".to_string(),
            version: "7.4.0".to_string(),
            arch: "arm64".to_string(),
            reference: "docker.io/library/redis:7.4.0".to_string(),
            target: PathBuf::from("x.tar.gz"),
            pull_succeeded: false,
            export_succeeded: false,
            attempts: 3,
            pull_skipped: false,
            export_skipped: false,
            error_message: Some("pull timed out".to_string()),
            file_path: None,
        };
        let rendered = render(export_table(&[result]));
        assert!(rendered.contains("failed"));
        assert!(rendered.contains("pull timed out"));
    }
}
