use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::models::Sample;
use crate::storage::TrendLogStore;

/// Derive the per-run log path, relative to the log root:
/// `{YYYY-MM-DD}/{device}/{device}__{description}__{unix_start}.csv`.
///
/// The unix start time makes the path unique per run even when the same
/// device/description pair is restarted later.
pub fn log_relative_path(
    start_time: DateTime<Utc>,
    device_identifier: &str,
    description: &str,
) -> PathBuf {
    let date = start_time.format("%Y-%m-%d");
    PathBuf::from(format!(
        "{}/{}/{}__{}__{}.csv",
        date,
        device_identifier,
        device_identifier,
        description,
        start_time.timestamp()
    ))
}

/// Render one CSV cell with minimal quoting: quote only when the cell
/// contains a delimiter, quote, or line break, doubling embedded quotes.
fn csv_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn format_row(cells: impl Iterator<Item = String>) -> String {
    let mut line = cells
        .map(|c| csv_cell(&c))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn format_sample(sample: &Sample) -> String {
    let cells = std::iter::once(sample.sequence_index.to_string())
        .chain(std::iter::once(
            sample.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ))
        .chain(sample.values.iter().map(|v| v.to_string()));
    format_row(cells)
}

/// Filesystem trend log store writing comma-delimited, `\n`-terminated
/// files under a root directory.
pub struct CsvTrendLogStore {
    root: PathBuf,
}

impl CsvTrendLogStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&root)
            .await
            .context("Failed to create trend log root directory")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TrendLogStore for CsvTrendLogStore {
    async fn ensure_header(&self, rel_path: &Path, columns: &[String]) -> Result<()> {
        let path = self.root.join(rel_path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create trend log directory")?;
        }

        // Header goes in exactly once: skip if the file already has content.
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() > 0 {
                return Ok(());
            }
        }

        let header = format_row(columns.iter().cloned());
        tokio::fs::write(&path, header.as_bytes())
            .await
            .with_context(|| format!("Failed to write header to {}", path.display()))?;

        tracing::info!("Trend log created: {}", path.display());
        Ok(())
    }

    async fn append_rows(&self, rel_path: &Path, rows: &[Sample]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.root.join(rel_path);

        let mut payload = String::new();
        for sample in rows {
            payload.push_str(&format_sample(sample));
        }

        // Scoped acquisition: the handle lives only inside this call and is
        // released on every exit path, success or failure.
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {} for append", path.display()))?;

        file.write_all(payload.as_bytes())
            .await
            .with_context(|| format!("Failed to append rows to {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TagValue;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn make_sample(index: u64, values: Vec<TagValue>) -> Sample {
        Sample {
            sequence_index: index,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, index as u32).unwrap(),
            values,
        }
    }

    fn columns() -> Vec<String> {
        vec![
            "Index".to_string(),
            "DateTime".to_string(),
            "T1".to_string(),
            "T2".to_string(),
        ]
    }

    #[test]
    fn test_log_relative_path_layout() {
        let start = Utc.with_ymd_and_hms(2025, 6, 15, 10, 3, 0).unwrap();
        let path = log_relative_path(start, "BlendB", "Phase1");
        let expected = format!("2025-06-15/BlendB/BlendB__Phase1__{}.csv", start.timestamp());
        assert_eq!(path, PathBuf::from(expected));
    }

    #[test]
    fn test_log_relative_path_unique_per_start_time() {
        let a = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 1).unwrap();
        assert_ne!(
            log_relative_path(a, "BlendB", "Phase1"),
            log_relative_path(b, "BlendB", "Phase1")
        );
    }

    #[test]
    fn test_csv_cell_minimal_quoting() {
        assert_eq!(csv_cell("plain"), "plain");
        assert_eq!(csv_cell("a,b"), "\"a,b\"");
        assert_eq!(csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_cell("line\nbreak"), "\"line\nbreak\"");
    }

    #[tokio::test]
    async fn test_ensure_header_writes_once() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("2025-06-15/BlendB/BlendB__Phase1__1.csv");

        store.ensure_header(&rel, &columns()).await.expect("first");
        store.ensure_header(&rel, &columns()).await.expect("second");

        let content = std::fs::read_to_string(tmp.path().join(&rel)).expect("read");
        assert_eq!(content, "Index,DateTime,T1,T2\n");
    }

    #[tokio::test]
    async fn test_ensure_header_preserved_after_rows() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("d/BlendB/run.csv");

        store.ensure_header(&rel, &columns()).await.expect("header");
        store
            .append_rows(&rel, &[make_sample(0, vec![TagValue::Int(0), TagValue::Int(0)])])
            .await
            .expect("append");
        // A second ensure_header against a non-empty file must not truncate.
        store.ensure_header(&rel, &columns()).await.expect("re-ensure");

        let content = std::fs::read_to_string(tmp.path().join(&rel)).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Index,DateTime,T1,T2");
        assert!(lines[1].starts_with("0,2025-06-15 10:00:00"));
    }

    #[tokio::test]
    async fn test_append_rows_appends_in_order() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("d/BlendB/run.csv");

        store.ensure_header(&rel, &columns()).await.expect("header");
        store
            .append_rows(
                &rel,
                &[
                    make_sample(0, vec![TagValue::Int(0), TagValue::Int(0)]),
                    make_sample(1, vec![TagValue::Int(1), TagValue::Int(10)]),
                ],
            )
            .await
            .expect("first flush");
        store
            .append_rows(
                &rel,
                &[make_sample(2, vec![TagValue::Int(2), TagValue::Int(20)])],
            )
            .await
            .expect("second flush");

        let content = std::fs::read_to_string(tmp.path().join(&rel)).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        for (i, line) in lines[1..].iter().enumerate() {
            assert!(
                line.starts_with(&format!("{},", i)),
                "Row {} should start with its sequence index, got: {}",
                i,
                line
            );
        }
        assert!(lines[3].ends_with("2,20"));
    }

    #[tokio::test]
    async fn test_append_rows_empty_slice_is_noop() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("d/BlendB/run.csv");

        store.ensure_header(&rel, &columns()).await.expect("header");
        store.append_rows(&rel, &[]).await.expect("empty append");

        let content = std::fs::read_to_string(tmp.path().join(&rel)).expect("read");
        assert_eq!(content, "Index,DateTime,T1,T2\n");
    }

    #[tokio::test]
    async fn test_append_rows_fails_without_sink() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("d/BlendB/missing.csv");

        let result = store
            .append_rows(&rel, &[make_sample(0, vec![TagValue::Int(0)])])
            .await;
        assert!(result.is_err(), "Append without a created sink should fail");
    }

    #[tokio::test]
    async fn test_tag_values_render_into_cells() {
        let tmp = TempDir::new().expect("tempdir");
        let store = CsvTrendLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        let rel = PathBuf::from("d/Dev/run.csv");
        let cols = vec![
            "Index".to_string(),
            "DateTime".to_string(),
            "B".to_string(),
            "R".to_string(),
            "S".to_string(),
        ];

        store.ensure_header(&rel, &cols).await.expect("header");
        store
            .append_rows(
                &rel,
                &[make_sample(
                    0,
                    vec![
                        TagValue::Bool(true),
                        TagValue::Real(1.25),
                        TagValue::Text("a,b".to_string()),
                    ],
                )],
            )
            .await
            .expect("append");

        let content = std::fs::read_to_string(tmp.path().join(&rel)).expect("read");
        let data_line = content.lines().nth(1).expect("data row");
        assert!(data_line.ends_with("true,1.25,\"a,b\""));
    }
}
