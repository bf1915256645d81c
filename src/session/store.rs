//! JSONL-backed conversation persistence.
//!
//! Layout under the sessions home:
//!
//! ```text
//! session_<id>/
//!   session.json      metadata
//!   messages.jsonl    one SessionRecord per line
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ExecutionContext, Message};
use crate::error::{Result, ToolhostError};
use crate::id;

pub const SESSION_DIR_PREFIX: &str = "session_";
pub const MESSAGES_FILE: &str = "messages.jsonl";
pub const METADATA_FILE: &str = "session.json";

/// One persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub message: Message,
}

/// Contents of `session.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Directory holding session `id` under `home`
pub fn session_dir(home: &Path, id: &str) -> PathBuf {
    home.join(format!("{}{}", SESSION_DIR_PREFIX, id))
}

/// Sorted names of the sessions stored under `home`; backups are skipped.
pub fn list_sessions(home: &Path) -> Result<Vec<String>> {
    if !home.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(home)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        match file_name.strip_prefix(SESSION_DIR_PREFIX) {
            Some(name) if !name.contains(id::BACKUP_MARKER) => names.push(name.to_string()),
            _ => {}
        }
    }
    names.sort();
    Ok(names)
}

/// Remove session `id` from `home`. Returns false when it does not exist.
pub fn delete_session(home: &Path, id: &str) -> Result<bool> {
    if !id::is_valid_session_name(id) {
        return Err(ToolhostError::Session(format!("invalid session name '{}'", id)));
    }
    let dir = session_dir(home, id);
    if !dir.exists() {
        return Ok(false);
    }
    if dir.is_dir() {
        fs::remove_dir_all(&dir)?;
    } else {
        fs::remove_file(&dir)?;
    }
    Ok(true)
}

/// Persistence handle for one session
#[derive(Debug)]
pub struct FileSession {
    dir: PathBuf,
    metadata: SessionMetadata,
    records: Vec<SessionRecord>,
}

impl FileSession {
    /// Open or create session `id` under `home`.
    ///
    /// A log that cannot be parsed is moved aside to
    /// `session_<id>.backup.<ms>.<hex>` and a fresh session is started.
    pub fn open(home: &Path, id: &str) -> Result<Self> {
        if !id::is_valid_session_name(id) {
            return Err(ToolhostError::Session(format!("invalid session name '{}'", id)));
        }

        let dir = session_dir(home, id);
        let (metadata, records) = match Self::read_existing(&dir, id) {
            Ok(Some(existing)) => existing,
            Ok(None) => (Self::fresh_metadata(id), Vec::new()),
            Err(e) if !matches!(e, ToolhostError::Json(_)) => return Err(e),
            Err(e) => {
                log::warn!("Session '{}' has incompatible data: {}", id, e);
                Self::back_up(&dir)?;
                (Self::fresh_metadata(id), Vec::new())
            }
        };

        fs::create_dir_all(&dir)?;
        let session = Self { dir, metadata, records };
        session.write_metadata()?;
        log::debug!("Opened session '{}' with {} message(s)", id, session.records.len());
        Ok(session)
    }

    fn fresh_metadata(id: &str) -> SessionMetadata {
        let now = Utc::now();
        SessionMetadata {
            session_id: id.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
        }
    }

    fn read_existing(dir: &Path, id: &str) -> Result<Option<(SessionMetadata, Vec<SessionRecord>)>> {
        if !dir.exists() {
            return Ok(None);
        }

        let metadata_path = dir.join(METADATA_FILE);
        let messages_path = dir.join(MESSAGES_FILE);
        if !metadata_path.exists() && !messages_path.exists() {
            return Ok(None);
        }

        let metadata = if metadata_path.exists() {
            serde_json::from_str(&fs::read_to_string(&metadata_path)?)?
        } else {
            Self::fresh_metadata(id)
        };

        let mut records = Vec::new();
        if messages_path.exists() {
            let reader = BufReader::new(File::open(&messages_path)?);
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    records.push(serde_json::from_str::<SessionRecord>(&line)?);
                }
            }
        }
        Ok(Some((metadata, records)))
    }

    fn back_up(dir: &Path) -> Result<()> {
        Self::back_up_with_suffix(dir, &id::generate_backup_suffix())
    }

    /// Move `dir` aside. A failed rename is returned and the data stays in place.
    fn back_up_with_suffix(dir: &Path, suffix: &str) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        let backup = PathBuf::from(format!("{}.{}", dir.display(), suffix));
        fs::rename(dir, &backup).map_err(|e| {
            ToolhostError::Session(format!(
                "could not back up {} to {}: {}",
                dir.display(),
                backup.display(),
                e
            ))
        })?;
        log::info!("Session backup created: {}", backup.display());
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.records.iter().map(|r| r.message.clone()).collect()
    }

    /// Reconcile with the context on activation.
    ///
    /// A non-empty log replaces the context's messages; an empty log is
    /// seeded from whatever the context already holds.
    pub fn initialize(&mut self, context: &dyn ExecutionContext) -> Result<()> {
        if self.records.is_empty() {
            for message in context.messages() {
                self.append(&message)?;
            }
        } else {
            context.replace_messages(self.messages());
        }
        Ok(())
    }

    pub fn append(&mut self, message: &Message) -> Result<()> {
        let record = SessionRecord {
            seq: self.records.last().map(|r| r.seq + 1).unwrap_or(0),
            timestamp: Utc::now(),
            message: message.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(MESSAGES_FILE))?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;

        self.records.push(record);
        self.touch()
    }

    /// Replace the most recent message.
    pub fn redact_latest(&mut self, replacement: &Message) -> Result<()> {
        let latest = self
            .records
            .last_mut()
            .ok_or_else(|| ToolhostError::Session("no message to redact".to_string()))?;
        latest.message = replacement.clone();
        latest.timestamp = Utc::now();
        self.rewrite()
    }

    /// Persist the context's current messages as the full log.
    pub fn sync(&mut self, context: &dyn ExecutionContext) -> Result<()> {
        let messages = context.messages();
        if messages == self.messages() {
            return Ok(());
        }
        let now = Utc::now();
        self.records = messages
            .into_iter()
            .enumerate()
            .map(|(seq, message)| SessionRecord {
                seq: seq as u64,
                timestamp: now,
                message,
            })
            .collect();
        self.rewrite()
    }

    /// Drop every persisted message
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.rewrite()
    }

    /// Flush the log and metadata to disk
    pub fn save(&mut self) -> Result<()> {
        self.rewrite()
    }

    fn rewrite(&mut self) -> Result<()> {
        let mut file = File::create(self.dir.join(MESSAGES_FILE))?;
        for record in &self.records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        self.touch()
    }

    fn touch(&mut self) -> Result<()> {
        self.metadata.updated_at = Utc::now();
        self.metadata.message_count = self.records.len();
        self.write_metadata()
    }

    fn write_metadata(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(self.dir.join(METADATA_FILE), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::context::InMemoryContext;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let home = TempDir::new().unwrap();
        let session = FileSession::open(home.path(), "demo").unwrap();
        assert_eq!(session.dir(), home.path().join("session_demo"));
        assert!(session.dir().join(METADATA_FILE).exists());
        assert_eq!(session.session_id(), "demo");
        assert!(session.is_empty());
    }

    #[test]
    fn test_append_persists_across_reopen() {
        let home = TempDir::new().unwrap();
        {
            let mut session = FileSession::open(home.path(), "demo").unwrap();
            session.append(&Message::user("hello")).unwrap();
            session.append(&Message::assistant("hi there")).unwrap();
        }

        let session = FileSession::open(home.path(), "demo").unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[1].text(), "hi there");
        assert_eq!(session.metadata().message_count, 2);

        let content = fs::read_to_string(session.dir().join(MESSAGES_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_initialize_seeds_empty_log_from_context() {
        let home = TempDir::new().unwrap();
        let ctx = InMemoryContext::with_messages(vec![Message::user("before activation")]);
        let mut session = FileSession::open(home.path(), "seeded").unwrap();

        session.initialize(&ctx).unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_initialize_restores_existing_log_into_context() {
        let home = TempDir::new().unwrap();
        {
            let mut session = FileSession::open(home.path(), "restore").unwrap();
            session.append(&Message::user("persisted")).unwrap();
        }

        let ctx = InMemoryContext::with_messages(vec![Message::user("stale")]);
        let mut session = FileSession::open(home.path(), "restore").unwrap();
        session.initialize(&ctx).unwrap();

        let messages = ctx.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "persisted");
    }

    #[test]
    fn test_redact_latest() {
        let home = TempDir::new().unwrap();
        let mut session = FileSession::open(home.path(), "redact").unwrap();
        assert!(session.redact_latest(&Message::user("x")).is_err());

        session.append(&Message::user("secret")).unwrap();
        session.redact_latest(&Message::user("[redacted]")).unwrap();

        let reopened = FileSession::open(home.path(), "redact").unwrap();
        assert_eq!(reopened.messages()[0].text(), "[redacted]");
    }

    #[test]
    fn test_sync_and_clear() {
        let home = TempDir::new().unwrap();
        let ctx = InMemoryContext::with_messages(vec![Message::user("a"), Message::assistant("b")]);
        let mut session = FileSession::open(home.path(), "sync").unwrap();

        session.sync(&ctx).unwrap();
        assert_eq!(session.len(), 2);

        session.clear().unwrap();
        let reopened = FileSession::open(home.path(), "sync").unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_corrupt_log_is_backed_up() {
        let home = TempDir::new().unwrap();
        {
            let mut session = FileSession::open(home.path(), "broken").unwrap();
            session.append(&Message::user("keep me")).unwrap();
        }
        fs::write(session_dir(home.path(), "broken").join(MESSAGES_FILE), "{not a record\n").unwrap();

        let session = FileSession::open(home.path(), "broken").unwrap();
        assert!(session.is_empty());

        let backups: Vec<String> = fs::read_dir(home.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("session_broken.backup."))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_failed_backup_keeps_session_data() {
        let home = TempDir::new().unwrap();
        let dir = session_dir(home.path(), "stuck");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MESSAGES_FILE), "{not a record\n").unwrap();

        // an occupied, non-empty target makes the rename fail
        let suffix = "backup.1.deadbeef";
        let occupied = PathBuf::from(format!("{}.{}", dir.display(), suffix));
        fs::create_dir_all(&occupied).unwrap();
        fs::write(occupied.join("older.jsonl"), "{}\n").unwrap();

        let err = FileSession::back_up_with_suffix(&dir, suffix).unwrap_err();
        assert!(matches!(err, ToolhostError::Session(_)));
        assert_eq!(
            fs::read_to_string(dir.join(MESSAGES_FILE)).unwrap(),
            "{not a record\n"
        );
        assert!(occupied.join("older.jsonl").exists());
    }

    #[test]
    fn test_list_and_delete_sessions() {
        let home = TempDir::new().unwrap();
        FileSession::open(home.path(), "zeta").unwrap();
        FileSession::open(home.path(), "alpha").unwrap();
        fs::create_dir(home.path().join("session_alpha.backup.1.abcd0123")).unwrap();
        fs::create_dir(home.path().join("unrelated")).unwrap();

        assert_eq!(list_sessions(home.path()).unwrap(), vec!["alpha", "zeta"]);

        assert!(delete_session(home.path(), "zeta").unwrap());
        assert!(!delete_session(home.path(), "zeta").unwrap());
        assert_eq!(list_sessions(home.path()).unwrap(), vec!["alpha"]);
    }

    #[test]
    fn test_list_sessions_missing_home() {
        let home = TempDir::new().unwrap();
        assert!(list_sessions(&home.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_session_name() {
        let home = TempDir::new().unwrap();
        let err = FileSession::open(home.path(), "../outside").unwrap_err();
        assert!(matches!(err, ToolhostError::Session(_)));
    }
}
