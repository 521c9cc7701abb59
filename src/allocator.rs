//! Student creation and sequential id allocation.
//!
//! With the scheme enabled, the display id `prefix + nextId` is computed,
//! the student is inserted and `nextId` advanced inside one store
//! transaction, so racing creators serialize on the scheme record and never
//! share or skip a number. With the scheme disabled the caller's id is
//! written as given.

use crate::model::{IdScheme, IdSource, Student, StudentDraft};
use crate::store::{DocumentStore, StoreError, TxError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AllocError {
    /// Fix the scheme before retrying.
    #[error("student id scheme not configured: {reason}")]
    NotConfigured { reason: String },

    /// Manual path without a caller-supplied id.
    #[error("studentId is required when automatic ids are disabled")]
    StudentIdRequired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TxError for AllocError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict))
    }
}

fn not_configured(reason: &str) -> AllocError {
    AllocError::NotConfigured {
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Created {
    pub student: Student,
    pub source: IdSource,
}

/// Reserve the next sequential id and create the student with it.
pub fn allocate_student<S: DocumentStore>(
    store: &S,
    draft: &StudentDraft,
) -> Result<Student, AllocError> {
    let student = store.run_transaction(|tx| -> Result<Student, AllocError> {
        let Some(scheme) = tx.id_scheme()? else {
            return Err(not_configured("scheme record is missing"));
        };
        if !scheme.use_scheme {
            return Err(not_configured("automatic ids are disabled"));
        }
        if scheme.prefix.trim().is_empty() {
            return Err(not_configured("prefix is empty"));
        }
        if scheme.next_id < 1 {
            return Err(not_configured("nextId must be at least 1"));
        }
        let next = scheme
            .next_id
            .checked_add(1)
            .ok_or_else(|| not_configured("nextId is exhausted"))?;

        let student_id = scheme.display_id(scheme.next_id);
        let student = tx.insert_student(draft, &student_id)?;
        tx.put_id_scheme(&IdScheme {
            next_id: next,
            ..scheme
        })?;
        Ok(student)
    });

    match &student {
        Ok(s) => info!(student_id = %s.student_id, "allocated student id"),
        Err(AllocError::NotConfigured { reason }) => {
            warn!(%reason, "student id allocation refused")
        }
        Err(e) => warn!(error = %e, "student id allocation failed"),
    }
    student
}

/// Creation workflow: pick the allocation path from the current scheme.
///
/// `requested_id` is only used on the manual path.
pub fn create_student<S: DocumentStore>(
    store: &S,
    draft: &StudentDraft,
    requested_id: Option<&str>,
) -> Result<Created, AllocError> {
    let scheme = store.id_scheme()?;
    let use_scheme = scheme.as_ref().map(|s| s.use_scheme).unwrap_or(false);

    if use_scheme {
        let student = allocate_student(store, draft)?;
        return Ok(Created {
            student,
            source: IdSource::Scheme,
        });
    }

    // Blank ids are refused; anything else is stored exactly as given, with
    // no uniqueness check.
    let id = requested_id
        .filter(|s| !s.trim().is_empty())
        .ok_or(AllocError::StudentIdRequired)?;
    let student = store.insert_student(draft, id)?;
    Ok(Created {
        student,
        source: IdSource::Manual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxPolicy;
    use crate::db;
    use crate::store::SqliteStore;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use std::sync::Barrier;
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

    fn policy() -> TxPolicy {
        TxPolicy {
            max_attempts: 200,
            backoff_step: Duration::from_millis(1),
            busy_timeout: Duration::from_millis(5000),
        }
    }

    fn open(ws: &Path) -> SqliteStore {
        SqliteStore::open(ws, policy()).expect("open store")
    }

    fn seed(store: &SqliteStore, scheme: IdScheme) {
        store
            .conn()
            .execute(
                "INSERT INTO classes(id, name, teacher, created_at) VALUES('c1', 'Batch A', '', 'x')",
                [],
            )
            .expect("seed class");
        store
            .run_transaction(|tx| tx.put_id_scheme(&scheme))
            .expect("seed scheme");
    }

    fn draft(name: &str) -> StudentDraft {
        StudentDraft {
            name: name.into(),
            class_id: "c1".into(),
            email: format!("{}@school.test", name.to_lowercase()),
            phone: None,
            dob: None,
        }
    }

    fn scheme(prefix: &str, next_id: u64) -> IdScheme {
        IdScheme {
            use_scheme: true,
            prefix: prefix.into(),
            next_id,
        }
    }

    fn next_id(store: &SqliteStore) -> u64 {
        store.id_scheme().expect("read").expect("scheme").next_id
    }

    #[test]
    fn allocation_reads_back() {
        let ws = temp_dir("trackedu-alloc-readback");
        let store = open(&ws);
        seed(&store, scheme("STU-", 101));

        let s = allocate_student(&store, &draft("Alice")).expect("allocate");
        assert_eq!(s.student_id, "STU-101");

        let again = db::get_student(store.conn(), &s.id)
            .expect("query")
            .expect("student");
        assert_eq!(again.student_id, "STU-101");
        assert_eq!(next_id(&store), 102);
    }

    #[test]
    fn concurrent_allocations_are_contiguous() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 5;

        let ws = temp_dir("trackedu-alloc-concurrent");
        seed(&open(&ws), scheme("STU-", 101));

        let barrier = Barrier::new(THREADS);
        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let ws = ws.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let store = open(&ws);
                        barrier.wait();
                        (0..PER_THREAD)
                            .map(|i| {
                                allocate_student(&store, &draft(&format!("T{}S{}", t, i)))
                                    .expect("allocate")
                                    .student_id
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("thread"))
                .collect()
        });

        let total = THREADS * PER_THREAD;
        let unique: BTreeSet<_> = ids.iter().cloned().collect();
        assert_eq!(unique.len(), total, "no id handed out twice");
        let expected: BTreeSet<_> = (101..101 + total as u64)
            .map(|n| format!("STU-{}", n))
            .collect();
        assert_eq!(unique, expected, "no gaps");

        let store = open(&ws);
        assert_eq!(next_id(&store), 101 + total as u64);
        assert_eq!(
            db::count_rows(store.conn(), "students").expect("count"),
            total as i64
        );
    }

    #[test]
    fn empty_prefix_is_a_configuration_error() {
        let ws = temp_dir("trackedu-alloc-empty-prefix");
        let store = open(&ws);
        seed(&store, scheme("", 5));

        let e = allocate_student(&store, &draft("Carol")).unwrap_err();
        assert!(matches!(e, AllocError::NotConfigured { .. }));
        assert_eq!(next_id(&store), 5);
        assert_eq!(db::count_rows(store.conn(), "students").expect("count"), 0);
    }

    fn assert_refused(store: &SqliteStore, name: &str, expected_next: u64) {
        let e = allocate_student(store, &draft(name)).unwrap_err();
        assert!(
            matches!(e, AllocError::NotConfigured { .. }),
            "unexpected error: {e:?}"
        );
        assert_eq!(next_id(store), expected_next);
        assert_eq!(db::count_rows(store.conn(), "students").expect("count"), 0);
    }

    #[test]
    fn disabled_scheme_inside_transaction_is_refused() {
        let ws = temp_dir("trackedu-alloc-disabled");
        let store = open(&ws);
        seed(
            &store,
            IdScheme {
                use_scheme: false,
                prefix: "STU-".into(),
                next_id: 12,
            },
        );
        assert_refused(&store, "Jade", 12);
    }

    #[test]
    fn whitespace_prefix_is_refused_but_padding_is_kept() {
        let ws = temp_dir("trackedu-alloc-blank-prefix");
        let store = open(&ws);
        seed(&store, scheme("   ", 3));
        assert_refused(&store, "Mona", 3);

        store
            .run_transaction(|tx| tx.put_id_scheme(&scheme(" S-", 3)))
            .expect("fix scheme");
        let s = allocate_student(&store, &draft("Mona")).expect("allocate");
        assert_eq!(s.student_id, " S-3");
    }

    #[test]
    fn zero_next_id_is_refused() {
        let ws = temp_dir("trackedu-alloc-zero");
        let store = open(&ws);
        seed(&store, scheme("STU-", 0));
        assert_refused(&store, "Kurt", 0);
    }

    #[test]
    fn counter_overflow_is_refused() {
        let ws = temp_dir("trackedu-alloc-overflow");
        let store = open(&ws);
        seed(&store, scheme("STU-", u64::MAX));
        assert_refused(&store, "Lior", u64::MAX);
    }

    #[test]
    fn missing_scheme_is_a_configuration_error() {
        let ws = temp_dir("trackedu-alloc-missing");
        let store = open(&ws);
        let e = allocate_student(&store, &draft("Carol")).unwrap_err();
        assert!(matches!(e, AllocError::NotConfigured { .. }));
        assert!(store.id_scheme().expect("read").is_none());
    }

    #[test]
    fn failed_insert_leaves_counter_untouched() {
        let ws = temp_dir("trackedu-alloc-rollback");
        let store = open(&ws);
        seed(&store, scheme("STU-", 7));

        let bad = StudentDraft {
            class_id: "no-such-class".into(),
            ..draft("Dave")
        };
        let e = allocate_student(&store, &bad).unwrap_err();
        assert!(matches!(e, AllocError::Store(StoreError::Sqlite(_))));
        assert_eq!(next_id(&store), 7);
        assert_eq!(db::count_rows(store.conn(), "students").expect("count"), 0);
    }

    #[test]
    fn manual_path_bypasses_counter_and_allows_duplicates() {
        let ws = temp_dir("trackedu-alloc-manual");
        let store = open(&ws);
        seed(
            &store,
            IdScheme {
                use_scheme: false,
                prefix: "STU-".into(),
                next_id: 40,
            },
        );

        let a = create_student(&store, &draft("Erin"), Some(" M-1 ")).expect("create");
        assert_eq!(a.source, IdSource::Manual);
        assert_eq!(a.student.student_id, " M-1 ");
        let stored = db::get_student(store.conn(), &a.student.id)
            .expect("query")
            .expect("student");
        assert_eq!(stored.student_id, " M-1 ");
        let b = create_student(&store, &draft("Finn"), Some(" M-1 ")).expect("duplicate");
        assert_eq!(b.student.student_id, " M-1 ");
        assert_eq!(next_id(&store), 40);

        let e = create_student(&store, &draft("Gail"), Some("  ")).unwrap_err();
        assert!(matches!(e, AllocError::StudentIdRequired));
    }

    #[test]
    fn scheme_path_ignores_requested_id() {
        let ws = temp_dir("trackedu-alloc-ignore");
        let store = open(&ws);
        seed(&store, scheme("STU-", 101));

        let c = create_student(&store, &draft("Hana"), Some("CUSTOM")).expect("create");
        assert_eq!(c.source, IdSource::Scheme);
        assert_eq!(c.student.student_id, "STU-101");
    }

    #[test]
    fn no_scheme_record_means_manual_path() {
        let ws = temp_dir("trackedu-alloc-noscheme");
        let store = open(&ws);
        store
            .conn()
            .execute(
                "INSERT INTO classes(id, name, teacher, created_at) VALUES('c1', 'Batch A', '', 'x')",
                [],
            )
            .expect("seed class");

        let c = create_student(&store, &draft("Ivan"), Some("X9")).expect("create");
        assert_eq!(c.source, IdSource::Manual);
        assert!(store.id_scheme().expect("read").is_none());
    }
}
