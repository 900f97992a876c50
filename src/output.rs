use crate::PredictionResult;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;
use std::path::{Path, PathBuf};

/// One classified input, as reported by the CLI.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub file: PathBuf,
    pub result: PredictionResult,
    pub classified_at: DateTime<Utc>,
}

pub fn describe(row: &ReportRow) -> String {
    match &row.result {
        PredictionResult::Ok { label, confidence } => format!(
            "{}: {} (confidence {:.2}%)",
            row.file.display(),
            label,
            confidence * 100.0
        ),
        PredictionResult::Err { message, .. } => format!(
            "{}: {} ({})",
            row.file.display(),
            row.result.label(),
            message
        ),
    }
}

pub fn to_json_line(row: &ReportRow) -> Result<String> {
    let mut value = serde_json::to_value(&row.result)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("file".into(), row.file.display().to_string().into());
        obj.insert("classified_at".into(), row.classified_at.to_rfc3339().into());
    }
    Ok(serde_json::to_string(&value)?)
}

pub fn write_report_csv(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));

    // Create directory if it doesn't exist
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
    }

    info!("Writing {} results to {}", rows.len(), path.display());
    let file = std::fs::File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "file",
        "status",
        "label",
        "confidence",
        "error_kind",
        "message",
        "classified_at",
    ])?;

    for row in rows {
        let (status, confidence, kind, message) = match &row.result {
            PredictionResult::Ok { confidence, .. } => {
                ("ok", confidence.to_string(), String::new(), String::new())
            }
            PredictionResult::Err { kind, message, .. } => {
                ("error", String::new(), format!("{:?}", kind), message.clone())
            }
        };
        writer.write_record([
            row.file.display().to_string(),
            status.to_string(),
            row.result.label().into_owned(),
            confidence,
            kind,
            message,
            row.classified_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Stage};

    fn rows() -> Vec<ReportRow> {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        vec![
            ReportRow {
                file: PathBuf::from("normal.npy"),
                result: PredictionResult::Ok {
                    label: "Normal".into(),
                    confidence: 0.9,
                },
                classified_at: at,
            },
            ReportRow {
                file: PathBuf::from("flat.npy"),
                result: PredictionResult::Err {
                    kind: ErrorKind::DegenerateSignal,
                    stage: Stage::Normalizing,
                    message: "signal has no variance (std 0e0)".into(),
                },
                classified_at: at,
            },
        ]
    }

    #[test]
    fn report_has_one_line_per_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.csv");
        write_report_csv(&path, &rows()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("normal.npy,ok,Normal,0.9,"));
        assert!(lines[2].starts_with("flat.npy,error,Error: Degenerate signal,,DegenerateSignal,"));
    }

    #[test]
    fn json_line_carries_file_and_status() {
        let line = to_json_line(&rows()[1]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["file"], "flat.npy");
        assert_eq!(value["status"], "err");
    }

    #[test]
    fn plain_text_shows_percent() {
        assert_eq!(describe(&rows()[0]), "normal.npy: Normal (confidence 90.00%)");
    }
}
