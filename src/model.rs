use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key of the singleton scheme document in the `config` table.
pub const ID_SCHEME_KEY: &str = "studentIdScheme";

/// Singleton configuration record controlling automatic student ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdScheme {
    pub use_scheme: bool,
    pub prefix: String,
    pub next_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    #[error("prefix is required when useScheme is true")]
    EmptyPrefix,
    #[error("nextId must be at least 1")]
    NextIdTooSmall,
    #[error("nextId must not decrease (current {current}, requested {requested})")]
    NextIdDecreased { current: u64, requested: u64 },
}

impl IdScheme {
    /// What the admin form shows before any scheme has been saved.
    pub fn default_form() -> Self {
        Self {
            use_scheme: true,
            prefix: String::new(),
            next_id: 1,
        }
    }

    pub fn validate(&self) -> Result<(), SchemeError> {
        if self.next_id < 1 {
            return Err(SchemeError::NextIdTooSmall);
        }
        if self.use_scheme && self.prefix.trim().is_empty() {
            return Err(SchemeError::EmptyPrefix);
        }
        Ok(())
    }

    /// Validate a replacement for `current`. The counter only moves forward.
    pub fn validate_replacing(&self, current: Option<&IdScheme>) -> Result<(), SchemeError> {
        self.validate()?;
        if let Some(cur) = current {
            if self.next_id < cur.next_id {
                return Err(SchemeError::NextIdDecreased {
                    current: cur.next_id,
                    requested: self.next_id,
                });
            }
        }
        Ok(())
    }

    pub fn display_id(&self, n: u64) -> String {
        format!("{}{}", self.prefix, n)
    }

    pub fn preview(&self) -> Option<String> {
        if self.use_scheme && !self.prefix.trim().is_empty() {
            Some(self.display_id(self.next_id))
        } else {
            None
        }
    }
}

/// Caller-supplied part of a student record. The human-facing id is decided
/// separately (scheme or manual).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentDraft {
    pub name: String,
    pub class_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub dob: Option<String>,
}

impl StudentDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;
        if self.class_id.trim().is_empty() {
            return Err("classId is required".into());
        }
        if !is_plausible_email(&self.email) {
            return Err("invalid email".into());
        }
        if let Some(dob) = self.dob.as_deref() {
            parse_date(dob)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub class_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Which path produced a student's human-facing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    Scheme,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub teacher: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub class_id: String,
    /// `None` when students point at a class that no longer exists.
    pub class_name: Option<String>,
    pub students: Vec<Student>,
}

/// Bucket students under their class. Known classes come first in the order
/// given, then dangling class ids in lexical order.
pub fn group_by_class(classes: &[ClassRecord], students: Vec<Student>) -> Vec<ClassGroup> {
    let mut buckets: BTreeMap<String, Vec<Student>> = BTreeMap::new();
    for s in students {
        buckets.entry(s.class_id.clone()).or_default().push(s);
    }

    let mut out = Vec::with_capacity(classes.len() + buckets.len());
    for c in classes {
        out.push(ClassGroup {
            class_id: c.id.clone(),
            class_name: Some(c.name.clone()),
            students: buckets.remove(&c.id).unwrap_or_default(),
        });
    }
    for (class_id, students) in buckets {
        out.push(ClassGroup {
            class_id,
            class_name: None,
            students,
        });
    }
    out
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().chars().count() < 2 {
        return Err("name must have at least 2 letters".into());
    }
    Ok(())
}

/// Same acceptance as `^\S+@\S+$`.
pub fn is_plausible_email(s: &str) -> bool {
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return false;
    }
    let len = s.len();
    s.char_indices()
        .any(|(i, ch)| ch == '@' && i > 0 && i + 1 < len)
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date (expected YYYY-MM-DD): {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, class_id: &str) -> Student {
        Student {
            id: id.into(),
            student_id: format!("S-{}", id),
            name: format!("Student {}", id),
            class_id: class_id.into(),
            email: "a@b".into(),
            phone: None,
            dob: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: None,
        }
    }

    #[test]
    fn scheme_requires_prefix_only_when_enabled() {
        let mut s = IdScheme {
            use_scheme: true,
            prefix: "  ".into(),
            next_id: 5,
        };
        assert_eq!(s.validate(), Err(SchemeError::EmptyPrefix));
        s.use_scheme = false;
        assert_eq!(s.validate(), Ok(()));
        s.next_id = 0;
        assert_eq!(s.validate(), Err(SchemeError::NextIdTooSmall));
    }

    #[test]
    fn scheme_counter_never_moves_backwards() {
        let current = IdScheme {
            use_scheme: true,
            prefix: "STU-".into(),
            next_id: 101,
        };
        let lower = IdScheme {
            next_id: 100,
            ..current.clone()
        };
        assert_eq!(
            lower.validate_replacing(Some(&current)),
            Err(SchemeError::NextIdDecreased {
                current: 101,
                requested: 100
            })
        );
        let same = current.clone();
        assert!(same.validate_replacing(Some(&current)).is_ok());
        assert!(lower.validate_replacing(None).is_ok());
    }

    #[test]
    fn display_id_concatenates_verbatim() {
        let s = IdScheme {
            use_scheme: true,
            prefix: "STU-".into(),
            next_id: 101,
        };
        assert_eq!(s.display_id(101), "STU-101");
        assert_eq!(s.preview().as_deref(), Some("STU-101"));

        let off = IdScheme {
            use_scheme: false,
            ..s
        };
        assert_eq!(off.preview(), None);
    }

    #[test]
    fn scheme_document_uses_camel_case() {
        let s: IdScheme =
            serde_json::from_str(r#"{"useScheme":true,"prefix":"X","nextId":7}"#).expect("parse");
        assert_eq!(s.next_id, 7);
        assert!(serde_json::from_str::<IdScheme>(r#"{"useScheme":true,"prefix":"X"}"#).is_err());
        assert!(
            serde_json::from_str::<IdScheme>(r#"{"useScheme":true,"prefix":"X","nextId":-1}"#)
                .is_err()
        );
    }

    #[test]
    fn email_check_matches_console_rule() {
        assert!(is_plausible_email("a@b"));
        assert!(is_plausible_email("first.last@school.edu"));
        assert!(!is_plausible_email("@b"));
        assert!(!is_plausible_email("a@"));
        assert!(!is_plausible_email("a b@c"));
        assert!(!is_plausible_email("nobody"));
    }

    #[test]
    fn draft_validation() {
        let mut d = StudentDraft {
            name: "Al".into(),
            class_id: "c1".into(),
            email: "al@x.org".into(),
            phone: None,
            dob: Some("2012-04-30".into()),
        };
        assert!(d.validate().is_ok());
        d.dob = Some("30/04/2012".into());
        assert!(d.validate().is_err());
        d.dob = None;
        d.name = "A".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn grouping_keeps_empty_classes_and_dangling_ids() {
        let classes = vec![
            ClassRecord {
                id: "c2".into(),
                name: "Batch A".into(),
                teacher: String::new(),
            },
            ClassRecord {
                id: "c1".into(),
                name: "Batch B".into(),
                teacher: String::new(),
            },
        ];
        let groups = group_by_class(
            &classes,
            vec![student("1", "c1"), student("2", "gone"), student("3", "c1")],
        );
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].class_id, "c2");
        assert!(groups[0].students.is_empty());
        assert_eq!(groups[1].students.len(), 2);
        assert_eq!(groups[2].class_id, "gone");
        assert_eq!(groups[2].class_name, None);
    }
}
