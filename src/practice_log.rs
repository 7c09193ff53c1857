use std::collections::BTreeMap;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlite::{Connection, State};
use crate::patterns::{Difficulty, Pattern};
use crate::playback::Timbre;
use crate::scales::ScaleDegree;
use crate::session::{Exercise, PatternSource, PracticeSession};

pub const BOOKMARKS_KEY: &str = "bookmarks";
pub const HISTORY_KEY: &str = "history";
pub const INSTRUMENT_KEY: &str = "instrument";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// JSON records by key. Only the practice front end talks to this; the
/// generators never do.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(filename: &str) -> anyhow::Result<Self> {
        let connection = sqlite::open(filename)?;
        connection.execute("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT, updated INTEGER);")?;
        Ok(SqliteStore {connection})
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::open(":memory:")
    }

    /// Seconds since the epoch at which `key` was last written.
    pub fn updated(&self, key: &str) -> anyhow::Result<Option<i64>> {
        let mut statement = self.connection.prepare("SELECT updated FROM kv WHERE key = ?")?;
        statement.bind((1, key))?;
        match statement.next()? {
            State::Row => Ok(Some(statement.read::<i64, usize>(0)?)),
            State::Done => Ok(None),
        }
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let mut statement = self.connection.prepare("SELECT value FROM kv WHERE key = ?")?;
        statement.bind((1, key))?;
        match statement.next()? {
            State::Row => {
                let text = statement.read::<String, usize>(0)?;
                Ok(Some(serde_json::from_str(text.as_str())?))
            }
            State::Done => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        let text = serde_json::to_string(&value)?;
        let mut statement = self
            .connection
            .prepare("INSERT OR REPLACE INTO kv (key, value, updated) VALUES (?, ?, ?)")?;
        statement.bind((1, key))?;
        statement.bind((2, text.as_str()))?;
        statement.bind((3, Local::now().timestamp()))?;
        while let State::Row = statement.next()? {}
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub scale_key: String,
    pub difficulty: Difficulty,
    pub degrees: Vec<ScaleDegree>,
    pub created: i64,
}

impl Bookmark {
    /// Melodic exercises only.
    pub fn of(session: &PracticeSession) -> Option<Self> {
        let pattern = session.pattern()?;
        Some(Bookmark {
            scale_key: session.scale_key().to_owned(),
            difficulty: session.difficulty(),
            degrees: pattern.degrees().to_vec(),
            created: Local::now().timestamp(),
        })
    }

    pub fn pattern(&self, scale_len: usize) -> anyhow::Result<Pattern> {
        Pattern::custom(&self.degrees, scale_len)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub scale_key: String,
    pub difficulty: Difficulty,
    pub source: PatternSource,
    pub summary: String,
    pub practiced_at: i64,
}

impl HistoryEntry {
    pub fn of(session: &PracticeSession) -> Self {
        let summary = match session.exercise() {
            Exercise::Empty => String::new(),
            Exercise::Melodic(pattern) => pattern.to_string(),
            Exercise::Intervals(intervals) => {
                intervals.iter().map(|i| i.notation_short()).collect::<Vec<_>>().join(" ")
            }
        };
        HistoryEntry {
            scale_key: session.scale_key().to_owned(),
            difficulty: session.difficulty(),
            source: session.source(),
            summary,
            practiced_at: Local::now().timestamp(),
        }
    }
}

pub struct PracticeLog<S: KeyValueStore> {
    store: S,
    history_limit: usize,
}

impl<S: KeyValueStore> PracticeLog<S> {
    pub fn new(store: S, history_limit: usize) -> Self {
        PracticeLog {store, history_limit: history_limit.max(1)}
    }

    pub fn store(&self) -> &S {&self.store}

    pub fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        self.load_list(BOOKMARKS_KEY)
    }

    /// Returns false if the same pattern on the same scale is already saved.
    pub fn add_bookmark(&mut self, bookmark: Bookmark) -> anyhow::Result<bool> {
        let mut bookmarks = self.bookmarks()?;
        if bookmarks.iter().any(|b| b.scale_key == bookmark.scale_key && b.degrees == bookmark.degrees) {
            return Ok(false);
        }
        bookmarks.push(bookmark);
        self.store.set(BOOKMARKS_KEY, serde_json::to_value(&bookmarks)?)?;
        Ok(true)
    }

    pub fn remove_bookmark(&mut self, index: usize) -> anyhow::Result<Option<Bookmark>> {
        let mut bookmarks = self.bookmarks()?;
        if index >= bookmarks.len() {
            return Ok(None);
        }
        let removed = bookmarks.remove(index);
        self.store.set(BOOKMARKS_KEY, serde_json::to_value(&bookmarks)?)?;
        Ok(Some(removed))
    }

    /// Newest first, dropping the oldest past the limit.
    pub fn record_history(&mut self, entry: HistoryEntry) -> anyhow::Result<()> {
        let mut history = self.history()?;
        history.insert(0, entry);
        history.truncate(self.history_limit);
        self.store.set(HISTORY_KEY, serde_json::to_value(&history)?)
    }

    pub fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        self.load_list(HISTORY_KEY)
    }

    pub fn set_instrument(&mut self, timbre: Timbre) -> anyhow::Result<()> {
        self.store.set(INSTRUMENT_KEY, serde_json::to_value(timbre)?)
    }

    pub fn instrument(&self) -> anyhow::Result<Timbre> {
        Ok(self.load(INSTRUMENT_KEY)?.unwrap_or_default())
    }

    fn load_list<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Vec<T>> {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Unreadable records are logged and treated as missing.
    fn load<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.store.get(key)? {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    log::warn!(target: "practice_log", "Ignoring unreadable {key} record: {e}");
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bookmark(degrees: &[ScaleDegree]) -> Bookmark {
        Bookmark {scale_key: "major".to_owned(), difficulty: Difficulty::Easy, degrees: degrees.to_vec(), created: 0}
    }

    fn exercise_log<S: KeyValueStore>(mut log: PracticeLog<S>) {
        assert!(log.bookmarks().unwrap().is_empty());
        assert!(log.add_bookmark(bookmark(&[1, 2, 3])).unwrap());
        assert!(!log.add_bookmark(bookmark(&[1, 2, 3])).unwrap());
        assert!(log.add_bookmark(bookmark(&[5, 3, 1])).unwrap());
        assert_eq!(log.bookmarks().unwrap().len(), 2);
        assert_eq!(log.remove_bookmark(0).unwrap().unwrap().degrees, vec![1, 2, 3]);
        assert_eq!(log.remove_bookmark(4).unwrap(), None);
        assert_eq!(log.bookmarks().unwrap()[0].pattern(7).unwrap().degrees(), &[5, 3, 1]);

        assert_eq!(log.instrument().unwrap(), Timbre::Harmonium);
        log.set_instrument(Timbre::Bansuri).unwrap();
        assert_eq!(log.instrument().unwrap(), Timbre::Bansuri);
    }

    #[test]
    fn test_memory_log() {
        exercise_log(PracticeLog::new(MemoryStore::default(), 10));
    }

    #[test]
    fn test_sqlite_log() {
        let store = SqliteStore::in_memory().unwrap();
        exercise_log(PracticeLog::new(store, 10));
    }

    #[test]
    fn test_sqlite_round_trip() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("k", json!({"a": [1, 2]})).unwrap();
        store.set("k", json!("replaced")).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!("replaced")));
        assert!(store.updated("k").unwrap().unwrap() > 0);
    }

    #[test]
    fn test_history_is_capped_newest_first() {
        let mut log = PracticeLog::new(MemoryStore::default(), 3);
        let mut session = PracticeSession::default();
        for degrees in [[1, 2], [2, 3], [3, 4], [4, 5]] {
            session.use_custom_pattern(&degrees).unwrap();
            log.record_history(HistoryEntry::of(&session)).unwrap();
        }
        let history = log.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].summary, "4 5");
        assert_eq!(history[2].summary, "2 3");
        assert_eq!(history[0].source, PatternSource::Custom);
    }

    #[test]
    fn test_bad_records_are_ignored() {
        let mut store = MemoryStore::default();
        store.set(BOOKMARKS_KEY, json!("not a list")).unwrap();
        store.set(INSTRUMENT_KEY, json!("kazoo")).unwrap();
        let log = PracticeLog::new(store, 5);
        assert!(log.bookmarks().unwrap().is_empty());
        assert_eq!(log.instrument().unwrap(), Timbre::Harmonium);
    }

    #[test]
    fn test_bookmark_of_session() {
        let mut session = PracticeSession::default();
        assert_eq!(Bookmark::of(&session), None);
        session.use_custom_pattern(&[1, 5, 1]).unwrap();
        let saved = Bookmark::of(&session).unwrap();
        assert_eq!(saved.degrees, vec![1, 5, 1]);
        assert_eq!(saved.scale_key, "major");
    }
}
