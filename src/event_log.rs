//! 追加写入的 JSON Lines 事件日志，管理后台可查看末尾记录。

use std::io::SeekFrom;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub time: DateTime<Utc>,
    pub level: EventLevel,
    pub event: String,
    #[serde(default)]
    pub detail: Value,
}

pub struct EventLog {
    path: PathBuf,
    // 进程内串行化追加
    write_lock: Mutex<()>,
}

/// 查看日志时只读取文件末尾这么多字节
const TAIL_WINDOW_BYTES: u64 = 1024 * 1024;

impl EventLog {
    pub const MAX_TAIL: usize = 1000;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, level: EventLevel, event: &str, detail: Value) -> std::io::Result<()> {
        let record = EventRecord {
            time: Utc::now(),
            level,
            event: event.to_string(),
            detail,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// 写日志失败只记录 tracing，不影响请求
    pub async fn record(&self, level: EventLevel, event: &str, detail: Value) {
        if let Err(e) = self.append(level, event, detail).await {
            tracing::error!("Failed to append event log {}: {}", self.path.display(), e);
        }
    }

    /// 读取最后 `lines` 条记录，无法解析的行跳过
    pub async fn tail(&self, lines: usize) -> std::io::Result<Vec<EventRecord>> {
        self.tail_within(lines, TAIL_WINDOW_BYTES).await
    }

    async fn tail_within(&self, lines: usize, window: u64) -> std::io::Result<Vec<EventRecord>> {
        let lines = lines.min(Self::MAX_TAIL);
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).await?;

        let content = String::from_utf8_lossy(&buf);
        // 从文件中间开始读时，第一行可能不完整
        let text = if start > 0 {
            content.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
        } else {
            &content[..]
        };

        let mut records: Vec<EventRecord> = text
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .take(lines)
            .collect();
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_tail_keeps_order() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("logs/app.log"));

        for i in 0..5 {
            log.append(EventLevel::Info, "login", json!({ "n": i }))
                .await
                .unwrap();
        }
        log.append(EventLevel::Error, "upload_failed", Value::Null)
            .await
            .unwrap();

        let tail = log.tail(3).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].detail["n"], 3);
        assert_eq!(tail[1].detail["n"], 4);
        assert_eq!(tail[2].event, "upload_failed");
        assert_eq!(tail[2].level, EventLevel::Error);
    }

    #[tokio::test]
    async fn tail_of_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("missing.log"));
        assert!(log.tail(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "not json\n").await.unwrap();
        let log = EventLog::new(&path);
        log.record(EventLevel::Warn, "x", json!("y")).await;

        let tail = log.tail(10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event, "x");
    }

    #[tokio::test]
    async fn tail_reads_only_the_end_of_large_logs() {
        let dir = tempdir().unwrap();
        let log = EventLog::new(dir.path().join("app.log"));
        for i in 0..50 {
            log.append(EventLevel::Info, "tick", json!({ "n": i }))
                .await
                .unwrap();
        }

        let tail = log.tail_within(1000, 400).await.unwrap();
        assert!(!tail.is_empty());
        assert!(tail.len() < 50);
        assert_eq!(tail.last().unwrap().detail["n"], 49);
        // 窗口起点落在行中间时，残片被丢弃而不是误解析
        let first = tail[0].detail["n"].as_i64().unwrap();
        let expected: Vec<i64> = (first..50).collect();
        let got: Vec<i64> = tail.iter().map(|r| r.detail["n"].as_i64().unwrap()).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempdir().unwrap();
        let log = std::sync::Arc::new(EventLog::new(dir.path().join("app.log")));

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(EventLevel::Info, "tick", json!({ "i": i }))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(log.tail(100).await.unwrap().len(), 20);
    }
}
