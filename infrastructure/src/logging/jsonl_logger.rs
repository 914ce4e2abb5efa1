//! JSONL file writer for interview events.
//!
//! Each observer callback is serialized as a single JSON line with a
//! `type` field and `timestamp`, appended to the file via a buffered writer.

use cohort_application::InterviewObserver;
use cohort_domain::{InterviewException, InterviewResult, LanguageModel, QuestionRecord};
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// JSONL event logger that writes one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes on `Drop`.
pub struct JsonlInterviewLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlInterviewLogger {
    /// Create a new logger writing to the given path.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Returns `None` if the file cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match File::create(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not create event log file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn log(&self, event_type: &str, payload: Value) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let record = if let Value::Object(mut map) = payload {
            map.insert("type".to_string(), Value::String(event_type.to_string()));
            map.insert("timestamp".to_string(), Value::String(timestamp));
            Value::Object(map)
        } else {
            json!({
                "type": event_type,
                "timestamp": timestamp,
                "data": payload,
            })
        };

        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

impl InterviewObserver for JsonlInterviewLogger {
    fn on_run_start(&self, total: usize, max_concurrent: usize) {
        self.log(
            "run_start",
            json!({ "total": total, "max_concurrent": max_concurrent }),
        );
    }

    fn on_chunk_start(&self, chunk: usize, size: usize) {
        self.log("chunk_start", json!({ "chunk": chunk, "size": size }));
    }

    fn on_interview_start(&self, index: usize, agent: &str, model: &LanguageModel) {
        self.log(
            "interview_start",
            json!({ "index": index, "agent": agent, "model": model.to_string() }),
        );
    }

    fn on_question_skipped(&self, index: usize, question: &str) {
        self.log(
            "question_skipped",
            json!({ "index": index, "question": question }),
        );
    }

    fn on_question_answered(&self, index: usize, question: &str, record: &QuestionRecord) {
        self.log(
            "question_answered",
            json!({
                "index": index,
                "question": question,
                "raw_response": record.raw_response,
                "cached": record.cached,
                "attempts": record.attempts,
                "input_tokens": record.input_tokens,
                "output_tokens": record.output_tokens,
                "validated": record.validated,
            }),
        );
    }

    fn on_exception(&self, index: usize, exception: &InterviewException) {
        self.log(
            "exception",
            json!({
                "index": index,
                "question": exception.question_name,
                "kind": exception.kind.as_str(),
                "message": exception.message,
                "attempt": exception.attempt,
            }),
        );
    }

    fn on_interview_complete(&self, result: &InterviewResult) {
        self.log(
            "interview_complete",
            json!({
                "index": result.index,
                "agent": result.agent.label(),
                "model": result.model.to_string(),
                "answered": result.answers.len(),
                "skipped": result.skipped.len(),
                "unfixed_exceptions": result.unfixed_exceptions().count(),
                "input_tokens": result.usage.input_tokens,
                "output_tokens": result.usage.output_tokens,
                "cache_hits": result.cache_hits,
            }),
        );
    }

    fn on_interview_failed(&self, index: usize, error: &str) {
        self.log("interview_failed", json!({ "index": index, "error": error }));
    }

    fn on_run_complete(&self, completed: usize, failed: usize) {
        self.log(
            "run_complete",
            json!({ "completed": completed, "failed": failed }),
        );
    }
}

impl Drop for JsonlInterviewLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_domain::ErrorKind;
    use std::io::Read;

    fn read_lines(path: &Path) -> Vec<Value> {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
            .trim()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_jsonl_logger_writes_valid_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.events.jsonl");
        let logger = JsonlInterviewLogger::new(&path).unwrap();

        logger.on_run_start(6, 2);
        logger.on_interview_start(0, "ana", &LanguageModel::new("gpt-4o", "openai", 60.0, 6000.0));
        logger.on_question_skipped(0, "cups");
        logger.on_exception(
            0,
            &InterviewException::new("favorite", ErrorKind::Transient, "429", 1),
        );
        logger.on_interview_failed(1, "gateway rejected the request");
        logger.on_run_complete(5, 1);

        // Flush
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 6);
        for line in &lines {
            assert!(line.get("type").is_some());
            assert!(line.get("timestamp").is_some());
        }

        assert_eq!(lines[0]["type"], "run_start");
        assert_eq!(lines[0]["total"], 6);
        assert_eq!(lines[1]["model"], "openai/gpt-4o");
        assert_eq!(lines[2]["question"], "cups");
        assert_eq!(lines[3]["kind"], "transient");
        assert_eq!(lines[3]["attempt"], 1);
        assert_eq!(lines[4]["type"], "interview_failed");
        assert_eq!(lines[5]["failed"], 1);
    }

    #[test]
    fn test_jsonl_logger_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/events.jsonl");
        let logger = JsonlInterviewLogger::new(&path).unwrap();
        assert_eq!(logger.path(), path.as_path());
        logger.on_chunk_start(0, 3);
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines[0]["type"], "chunk_start");
        assert_eq!(lines[0]["size"], 3);
    }

    #[test]
    fn test_jsonl_logger_handles_non_object_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jsonl");
        let logger = JsonlInterviewLogger::new(&path).unwrap();
        logger.log("note", json!("just a string"));
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines[0]["type"], "note");
        assert_eq!(lines[0]["data"], "just a string");
    }

    #[test]
    fn test_jsonl_logger_returns_none_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        assert!(JsonlInterviewLogger::new(blocker.join("events.jsonl")).is_none());
    }
}
