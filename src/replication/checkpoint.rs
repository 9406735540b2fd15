use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::replication::{CopyJob, ReplicationError};

/// 单个对象的进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObjectProgress {
    InProgress,
    Completed { bytes: u64 },
    Skipped,
    Failed { error_kind: String },
}

impl ObjectProgress {
    /// 恢复时是否可以直接跳过
    pub fn is_complete(&self) -> bool {
        matches!(self, ObjectProgress::Completed { .. } | ObjectProgress::Skipped)
    }
}

/// checkpoint 快照，可序列化后保存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCheckpoint {
    pub job_name: String,
    pub source: String,
    pub destination: String,
    /// 下一次列举的起点，None 表示从头开始
    pub enumeration_cursor: Option<String>,
    pub objects: BTreeMap<String, ObjectProgress>,
}

impl TransferCheckpoint {
    /// 以 JSON 格式写入文件（先写临时文件再重命名）
    pub async fn save(&self, path: &Path) -> Result<(), ReplicationError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, ReplicationError> {
        let content = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// 已完成（复制或跳过）的对象数
    pub fn completed_objects(&self) -> usize {
        self.objects.values().filter(|p| p.is_complete()).count()
    }
}

/// 运行中的 checkpoint
///
/// 列举游标由编排器串行推进，对象进度由多个 worker 并发写入。
pub struct Checkpoint {
    job_name: String,
    source: String,
    destination: String,
    cursor: Mutex<Option<String>>,
    objects: DashMap<String, ObjectProgress>,
}

impl Checkpoint {
    pub fn new(job: &CopyJob) -> Self {
        Self {
            job_name: job.job_name.clone(),
            source: job.source_ref(),
            destination: job.destination_ref(),
            cursor: Mutex::new(None),
            objects: DashMap::new(),
        }
    }

    /// 从快照恢复，快照必须由同一个 (作业, 源, 目标) 产生
    pub fn resume(job: &CopyJob, snapshot: TransferCheckpoint) -> Result<Self, ReplicationError> {
        let checkpoint = Self::new(job);
        if snapshot.job_name != checkpoint.job_name
            || snapshot.source != checkpoint.source
            || snapshot.destination != checkpoint.destination
        {
            return Err(ReplicationError::CheckpointMismatch(format!(
                "checkpoint belongs to job '{}' ({} -> {}), current job is '{}' ({} -> {})",
                snapshot.job_name,
                snapshot.source,
                snapshot.destination,
                checkpoint.job_name,
                checkpoint.source,
                checkpoint.destination
            )));
        }

        checkpoint.advance_cursor(snapshot.enumeration_cursor);
        for (name, progress) in snapshot.objects {
            checkpoint.objects.insert(name, progress);
        }
        Ok(checkpoint)
    }

    /// 替换列举游标
    pub fn advance_cursor(&self, token: Option<String>) {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn cursor(&self) -> Option<String> {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 丢弃已结算页面的对象记录
    ///
    /// 游标越过某一页之后，续传不会再列举这一页，这些记录只会让快照无限增长。
    pub fn forget_objects<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.objects.remove(name);
        }
    }

    pub fn record_object_progress(&self, name: &str, state: ObjectProgress) {
        self.objects.insert(name.to_string(), state);
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.objects
            .get(name)
            .map(|p| p.is_complete())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> TransferCheckpoint {
        TransferCheckpoint {
            job_name: self.job_name.clone(),
            source: self.source.clone(),
            destination: self.destination.clone(),
            enumeration_cursor: self.cursor(),
            objects: self
                .objects
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(name: &str) -> CopyJob {
        CopyJob {
            job_name: name.to_string(),
            source_account: "src".to_string(),
            dest_account: "dst".to_string(),
            source_container: "photos".to_string(),
            dest_container: "photos-replica".to_string(),
            is_incremental: true,
            prefix: None,
        }
    }

    #[test]
    fn test_record_and_snapshot() {
        let checkpoint = Checkpoint::new(&job("nightly"));
        checkpoint.advance_cursor(Some("b.txt".to_string()));
        checkpoint.record_object_progress("a.txt", ObjectProgress::InProgress);
        checkpoint.record_object_progress("a.txt", ObjectProgress::Completed { bytes: 10 });
        checkpoint.record_object_progress("b.txt", ObjectProgress::Failed {
            error_kind: "timeout".to_string(),
        });
        checkpoint.record_object_progress("c.txt", ObjectProgress::Skipped);

        assert!(checkpoint.is_completed("a.txt"));
        assert!(!checkpoint.is_completed("b.txt"));
        assert!(checkpoint.is_completed("c.txt"));
        assert!(!checkpoint.is_completed("d.txt"));

        let snapshot = checkpoint.snapshot();
        assert_eq!(snapshot.enumeration_cursor.as_deref(), Some("b.txt"));
        assert_eq!(snapshot.source, "src/photos");
        assert_eq!(snapshot.objects.len(), 3);
        assert_eq!(snapshot.completed_objects(), 2);

        // 快照是独立副本
        checkpoint.record_object_progress("d.txt", ObjectProgress::Skipped);
        assert_eq!(snapshot.objects.len(), 3);
    }

    #[test]
    fn test_resume_requires_same_job() {
        let checkpoint = Checkpoint::new(&job("nightly"));
        checkpoint.advance_cursor(Some("k".to_string()));
        checkpoint.record_object_progress("a.txt", ObjectProgress::Completed { bytes: 1 });
        let snapshot = checkpoint.snapshot();

        let resumed = Checkpoint::resume(&job("nightly"), snapshot.clone()).unwrap();
        assert_eq!(resumed.cursor().as_deref(), Some("k"));
        assert!(resumed.is_completed("a.txt"));

        assert!(matches!(
            Checkpoint::resume(&job("weekly"), snapshot.clone()),
            Err(ReplicationError::CheckpointMismatch(_))
        ));

        let mut other_destination = job("nightly");
        other_destination.dest_container = "elsewhere".to_string();
        assert!(Checkpoint::resume(&other_destination, snapshot).is_err());
    }

    #[test]
    fn test_forget_settled_objects() {
        let checkpoint = Checkpoint::new(&job("nightly"));
        for name in ["a.txt", "b.txt", "c.txt"] {
            checkpoint.record_object_progress(name, ObjectProgress::Completed { bytes: 1 });
        }

        checkpoint.advance_cursor(Some("b.txt".to_string()));
        checkpoint.forget_objects(["a.txt", "b.txt", "missing.txt"]);

        let snapshot = checkpoint.snapshot();
        assert_eq!(snapshot.objects.len(), 1);
        assert!(checkpoint.is_completed("c.txt"));
        assert!(!checkpoint.is_completed("a.txt"));
    }

    #[test]
    fn test_cursor_survives_poisoned_lock() {
        let checkpoint = Checkpoint::new(&job("nightly"));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = checkpoint.cursor.lock().unwrap();
            panic!("worker died while holding the cursor");
        }));
        assert!(checkpoint.cursor.is_poisoned());

        checkpoint.advance_cursor(Some("k".to_string()));
        assert_eq!(checkpoint.cursor().as_deref(), Some("k"));
        assert_eq!(checkpoint.snapshot().enumeration_cursor.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<(), ReplicationError> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state").join("nightly.json");

        let checkpoint = Checkpoint::new(&job("nightly"));
        checkpoint.advance_cursor(Some("m".to_string()));
        checkpoint.record_object_progress("a.txt", ObjectProgress::Completed { bytes: 42 });
        let snapshot = checkpoint.snapshot();
        snapshot.save(&path).await?;

        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("\"state\": \"completed\""));

        let loaded = TransferCheckpoint::load(&path).await?;
        assert_eq!(loaded, snapshot);
        Ok(())
    }
}
