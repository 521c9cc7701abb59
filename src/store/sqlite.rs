use super::{parse_scheme_doc, DocumentStore, StoreError, StoreTransaction, TxError};
use crate::config::TxPolicy;
use crate::db;
use crate::model::{IdScheme, Student, StudentDraft, ID_SCHEME_KEY};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use tracing::{debug, warn};

/// One connection to a workspace database plus the retry policy used for
/// its transactions.
pub struct SqliteStore {
    conn: Connection,
    policy: TxPolicy,
}

impl SqliteStore {
    pub fn open(workspace: &Path, policy: TxPolicy) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace, policy.busy_timeout)?;
        Ok(Self { conn, policy })
    }

    /// Connection for plain (non-transactional) CRUD.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn attempt<T, E, F>(&self, f: &mut F) -> Result<T, E>
    where
        F: FnMut(&mut dyn StoreTransaction) -> Result<T, E>,
        E: TxError,
    {
        // Deferred: the snapshot starts at the first read, and SQLite refuses
        // to upgrade a stale snapshot to a writer (BUSY_SNAPSHOT -> Conflict).
        let tx = self.conn.unchecked_transaction().map_err(StoreError::from)?;
        let out = {
            let mut handle = SqliteTx {
                conn: &tx,
                scheme: SchemeRead::Unread,
            };
            f(&mut handle)?
        };
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

impl DocumentStore for SqliteStore {
    fn run_transaction<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn StoreTransaction) -> Result<T, E>,
        E: TxError,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match self.attempt(&mut f) {
                Ok(v) => {
                    if attempt > 1 {
                        debug!(attempt, "transaction committed after retry");
                    }
                    return Ok(v);
                }
                Err(e) if e.is_conflict() => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, "transaction retries exhausted");
                        return Err(StoreError::RetriesExhausted { attempts: attempt }.into());
                    }
                    debug!(attempt, "transaction conflict, retrying");
                    std::thread::sleep(self.policy.backoff_step * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn id_scheme(&self) -> Result<Option<IdScheme>, StoreError> {
        match db::config_doc_get(&self.conn, ID_SCHEME_KEY)? {
            Some((doc, _)) => parse_scheme_doc(&doc).map(Some),
            None => Ok(None),
        }
    }

    fn insert_student(
        &self,
        draft: &StudentDraft,
        student_id: &str,
    ) -> Result<Student, StoreError> {
        Ok(db::insert_student(&self.conn, draft, student_id)?)
    }
}

enum SchemeRead {
    Unread,
    Missing,
    Version(i64),
}

struct SqliteTx<'c> {
    conn: &'c Connection,
    scheme: SchemeRead,
}

impl StoreTransaction for SqliteTx<'_> {
    fn id_scheme(&mut self) -> Result<Option<IdScheme>, StoreError> {
        match db::config_doc_get(self.conn, ID_SCHEME_KEY)? {
            Some((doc, version)) => {
                self.scheme = SchemeRead::Version(version);
                parse_scheme_doc(&doc).map(Some)
            }
            None => {
                self.scheme = SchemeRead::Missing;
                Ok(None)
            }
        }
    }

    fn put_id_scheme(&mut self, scheme: &IdScheme) -> Result<(), StoreError> {
        if let SchemeRead::Unread = self.scheme {
            // Blind write: condition on the version as it stands now. Reads
            // the version only, so a malformed document can still be replaced.
            let version: Option<i64> = self
                .conn
                .query_row(
                    "SELECT version FROM config WHERE key = ?",
                    [ID_SCHEME_KEY],
                    |r| r.get(0),
                )
                .optional()?;
            self.scheme = match version {
                Some(v) => SchemeRead::Version(v),
                None => SchemeRead::Missing,
            };
        }
        let doc = serde_json::to_string(scheme).map_err(|e| StoreError::Malformed {
            record: ID_SCHEME_KEY,
            reason: e.to_string(),
        })?;

        match self.scheme {
            SchemeRead::Version(v) => {
                let n = self.conn.execute(
                    "UPDATE config SET doc = ?, version = version + 1
                     WHERE key = ? AND version = ?",
                    (&doc, ID_SCHEME_KEY, v),
                )?;
                if n == 0 {
                    return Err(StoreError::Conflict);
                }
                self.scheme = SchemeRead::Version(v + 1);
            }
            SchemeRead::Missing | SchemeRead::Unread => {
                match self.conn.execute(
                    "INSERT INTO config(key, doc, version) VALUES(?, ?, 0)",
                    (ID_SCHEME_KEY, &doc),
                ) {
                    Ok(_) => self.scheme = SchemeRead::Version(0),
                    // Someone created it after our read.
                    Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                        return Err(StoreError::Conflict)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    fn insert_student(
        &mut self,
        draft: &StudentDraft,
        student_id: &str,
    ) -> Result<Student, StoreError> {
        Ok(db::insert_student(self.conn, draft, student_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn policy(max_attempts: u32) -> TxPolicy {
        TxPolicy {
            max_attempts,
            backoff_step: Duration::from_millis(1),
            busy_timeout: Duration::from_millis(2000),
        }
    }

    fn scheme(next_id: u64) -> IdScheme {
        IdScheme {
            use_scheme: true,
            prefix: "STU-".into(),
            next_id,
        }
    }

    fn bump(store: &SqliteStore) {
        store
            .run_transaction(|tx| -> Result<(), StoreError> {
                let cur = tx.id_scheme()?.expect("scheme");
                tx.put_id_scheme(&IdScheme {
                    next_id: cur.next_id + 1,
                    ..cur
                })
            })
            .expect("bump");
    }

    #[test]
    fn put_then_read_back() {
        let ws = temp_dir("trackedu-store-put");
        let store = SqliteStore::open(&ws, policy(4)).expect("open");
        assert_eq!(store.id_scheme().expect("read"), None);

        store
            .run_transaction(|tx| tx.put_id_scheme(&scheme(101)))
            .expect("create scheme");
        assert_eq!(store.id_scheme().expect("read"), Some(scheme(101)));

        bump(&store);
        assert_eq!(store.id_scheme().expect("read"), Some(scheme(102)));
    }

    #[test]
    fn stale_snapshot_reruns_the_body() {
        let ws = temp_dir("trackedu-store-conflict");
        let store = SqliteStore::open(&ws, policy(4)).expect("open");
        let rival = SqliteStore::open(&ws, policy(4)).expect("open rival");
        store
            .run_transaction(|tx| tx.put_id_scheme(&scheme(10)))
            .expect("seed");

        let runs = Cell::new(0);
        let seen = store
            .run_transaction(|tx| -> Result<u64, StoreError> {
                runs.set(runs.get() + 1);
                let cur = tx.id_scheme()?.expect("scheme");
                if runs.get() == 1 {
                    // Commit a competing increment between our read and write.
                    bump(&rival);
                }
                tx.put_id_scheme(&IdScheme {
                    next_id: cur.next_id + 1,
                    ..cur.clone()
                })?;
                Ok(cur.next_id)
            })
            .expect("transaction");

        assert_eq!(runs.get(), 2);
        assert_eq!(seen, 11, "second run must observe the rival's increment");
        assert_eq!(store.id_scheme().expect("read").expect("scheme").next_id, 12);
    }

    #[test]
    fn exhausted_retries_surface_distinct_error() {
        let ws = temp_dir("trackedu-store-exhausted");
        let store = SqliteStore::open(&ws, policy(3)).expect("open");
        let rival = SqliteStore::open(&ws, policy(3)).expect("open rival");
        store
            .run_transaction(|tx| tx.put_id_scheme(&scheme(1)))
            .expect("seed");

        let runs = Cell::new(0u32);
        let res = store.run_transaction(|tx| -> Result<(), StoreError> {
            runs.set(runs.get() + 1);
            let cur = tx.id_scheme()?.expect("scheme");
            bump(&rival);
            tx.put_id_scheme(&IdScheme {
                next_id: cur.next_id + 100,
                ..cur
            })
        });

        assert!(matches!(
            res,
            Err(StoreError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(runs.get(), 3);
        // Only the rival's three increments landed.
        assert_eq!(store.id_scheme().expect("read").expect("scheme").next_id, 4);
    }

    #[test]
    fn malformed_document_is_reported() {
        let ws = temp_dir("trackedu-store-malformed");
        let store = SqliteStore::open(&ws, policy(2)).expect("open");
        store
            .conn()
            .execute(
                "INSERT INTO config(key, doc, version) VALUES(?, ?, 0)",
                (ID_SCHEME_KEY, r#"{"useScheme":true,"prefix":"A"}"#),
            )
            .expect("seed bad doc");

        assert!(matches!(
            store.id_scheme(),
            Err(StoreError::Malformed { .. })
        ));
        let res = store.run_transaction(|tx| tx.id_scheme().map(|_| ()));
        assert!(matches!(res, Err(StoreError::Malformed { .. })));
    }
}
