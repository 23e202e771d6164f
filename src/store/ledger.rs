//! The session ledger. Running sessions live in `active.json` (a small array
//! rewritten on every change), finished ones are appended to
//! `sessions/<tracker id>.jsonl` and never rewritten. Appends are a single
//! write so an interrupted process can only ever tear the final line.

use std::collections::BTreeMap;

use futures::{StreamExt, stream};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::warn;

use super::{
    StoreDir, StoreError,
    entities::{ActiveSession, Session, TrackerId},
    read_json_or, write_json,
};

impl StoreDir {
    /// Running sessions keyed by tracker. The map form is what enforces the
    /// one-active-session-per-tracker rule: writers look a tracker up here
    /// before starting another.
    pub(crate) async fn load_active(
        &self,
    ) -> Result<BTreeMap<TrackerId, ActiveSession>, StoreError> {
        let entries: Vec<ActiveSession> = read_json_or(&self.active_path(), Vec::new).await?;
        Ok(entries
            .into_iter()
            .map(|active| (active.tracker_id, active))
            .collect())
    }

    pub(crate) async fn save_active(
        &self,
        active: &BTreeMap<TrackerId, ActiveSession>,
    ) -> Result<(), StoreError> {
        let entries: Vec<&ActiveSession> = active.values().collect();
        write_json(&self.active_path(), &entries).await
    }

    pub(crate) async fn append_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(session).map_err(|source| StoreError::Json {
            path: self.session_path(session.tracker_id),
            source,
        })?;
        line.push(b'\n');

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(self.session_path(session.tracker_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Completed sessions of one tracker, ordered by start time. Lines that
    /// don't parse are skipped with a warning; a shutdown can cut a write
    /// short and that must not take the rest of the ledger with it.
    pub(crate) async fn read_sessions(&self, id: TrackerId) -> Result<Vec<Session>, StoreError> {
        let path = self.session_path(id);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut sessions = vec![];
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Session>(&line) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!("Skipping illegal ledger line in {path:?}: {e}");
                }
            }
        }

        sessions.sort_by_key(|session| session.start_time);
        Ok(sessions)
    }

    /// Drops a tracker's entire completed-session file. Missing file is fine,
    /// a tracker without finished sessions has none.
    pub(crate) async fn remove_sessions(&self, id: TrackerId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.session_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Trackers that have a ledger file, from the directory listing. Can
    /// include trackers deleted by hand from `trackers.json`.
    pub(crate) async fn ledger_tracker_ids(&self) -> Result<Vec<TrackerId>, StoreError> {
        let mut dir = tokio::fs::read_dir(self.sessions_dir()).await?;
        let mut ids = vec![];
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match stem.parse::<u64>() {
                Ok(id) => ids.push(TrackerId(id)),
                Err(_) => warn!("Ignoring unexpected ledger file {path:?}"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every completed session in the store, across all trackers, ordered by
    /// start time.
    pub(crate) async fn read_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let ids = self.ledger_tracker_ids().await?;
        let mut per_tracker = stream::iter(ids)
            .map(|id| self.read_sessions(id))
            .buffered(4);

        let mut sessions = vec![];
        while let Some(batch) = per_tracker.next().await {
            sessions.extend(batch?);
        }
        sessions.sort_by_key(|session| (session.start_time, session.tracker_id));
        Ok(sessions)
    }
}
