//! # Catalog
//!
//! Per-candidate content: pages, polls and quizzes.
//!
//! Loaded once from a JSON file at startup (and again when the platform admin
//! asks for a reload). Everything the server accepts from visitors is resolved
//! against this structure, so a poll id, quiz id or option that is not in the
//! catalog is simply unknown.
//!
//! ## Format
//! ```json
//! {
//!   "candidates": [{
//!     "slug": "kandidat-a",
//!     "name": "Kandidat A",
//!     "admin": { "user": "a", "password": "secret" },
//!     "pages": [{
//!       "slug": "kinder",
//!       "theme": "Kinder & Familie",
//!       "poll": { "id": "p1", "question": "?", "options": ["A", "B"] },
//!       "quiz": {
//!         "id": "q1", "question": "?", "options": ["A", "B"],
//!         "correct": "B", "explainCorrect": "..."
//!       }
//!     }]
//!   }]
//! }
//! ```
use std::{collections::HashMap, fs, path::Path};

use thiserror::Error;

pub mod content;
pub mod validate;

use content::{Candidate, Document, Page, Poll, Quiz};
pub use validate::{MAX_PAGE_LEN, is_valid_slug};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid slug {0:?}")]
    InvalidSlug(String),

    #[error("Duplicate candidate {0}")]
    DuplicateCandidate(String),

    #[error("Duplicate page {page} for {candidate}")]
    DuplicatePage { candidate: String, page: String },

    #[error("Duplicate poll/quiz id {id} for {candidate}")]
    DuplicateContentId { candidate: String, id: String },

    #[error("Invalid {kind} {id:?} for {candidate}: {reason}")]
    InvalidContent {
        candidate: String,
        kind: &'static str,
        id: String,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct Catalog {
    candidates: HashMap<String, Candidate>,
    order: Vec<String>,
}

impl Catalog {
    pub fn from_document(document: Document) -> Result<Self, CatalogError> {
        validate::validate_document(&document)?;

        let order = document
            .candidates
            .iter()
            .map(|candidate| candidate.slug.clone())
            .collect();

        let candidates = document
            .candidates
            .into_iter()
            .map(|candidate| (candidate.slug.clone(), candidate))
            .collect();

        Ok(Self { candidates, order })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_document(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.candidates.contains_key(slug)
    }

    pub fn candidate(&self, slug: &str) -> Option<&Candidate> {
        self.candidates.get(slug)
    }

    /// Candidates in document order.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.order.iter().filter_map(|slug| self.candidates.get(slug))
    }

    pub fn page(&self, slug: &str, page: &str) -> Option<&Page> {
        self.candidate(slug)?.pages.iter().find(|p| p.slug == page)
    }

    pub fn poll(&self, slug: &str, page: &str, poll_id: &str) -> Option<&Poll> {
        self.page(slug, page)?
            .poll
            .as_ref()
            .filter(|poll| poll.id == poll_id)
    }

    pub fn quiz(&self, slug: &str, page: &str, quiz_id: &str) -> Option<&Quiz> {
        self.page(slug, page)?
            .quiz
            .as_ref()
            .filter(|quiz| quiz.id == quiz_id)
    }

    pub fn polls<'a>(&'a self, slug: &str) -> Vec<(&'a Page, &'a Poll)> {
        self.candidate(slug)
            .map(|candidate| {
                candidate
                    .pages
                    .iter()
                    .filter_map(|page| page.poll.as_ref().map(|poll| (page, poll)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn quizzes<'a>(&'a self, slug: &str) -> Vec<(&'a Page, &'a Quiz)> {
        self.candidate(slug)
            .map(|candidate| {
                candidate
                    .pages
                    .iter()
                    .filter_map(|page| page.quiz.as_ref().map(|quiz| (page, quiz)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let data = fs::read_to_string(path)?;

    Catalog::from_json(&data)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"{
        "candidates": [
            {
                "slug": "kandidat-a",
                "name": "Kandidat A",
                "admin": { "user": "a", "password": "pw-a" },
                "pages": [
                    {
                        "slug": "kinder",
                        "theme": "Kinder",
                        "poll": {
                            "id": "p1",
                            "question": "Was zuerst?",
                            "options": ["A", "B", "C", "D"]
                        },
                        "quiz": {
                            "id": "q1",
                            "question": "Wie viele?",
                            "options": ["1", "2", "3"],
                            "correct": "2",
                            "explainCorrect": "Zwei."
                        }
                    },
                    { "slug": "umwelt", "theme": "Umwelt" }
                ]
            },
            {
                "slug": "kandidat-b",
                "name": "Kandidat B",
                "admin": { "user": "b", "password": "pw-b" }
            }
        ]
    }"#;

    fn sample() -> Catalog {
        Catalog::from_json(SAMPLE).unwrap()
    }

    fn with_first_page(edit: impl FnOnce(&mut serde_json::Value)) -> Result<Catalog, CatalogError> {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        edit(&mut value["candidates"][0]["pages"][0]);
        Catalog::from_json(&value.to_string())
    }

    #[test]
    fn test_lookups() {
        let catalog = sample();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("kandidat-b"));
        assert!(!catalog.contains("kandidat-c"));

        let poll = catalog.poll("kandidat-a", "kinder", "p1").unwrap();
        assert!(poll.has_option("C"));
        assert!(!poll.has_option("E"));

        let quiz = catalog.quiz("kandidat-a", "kinder", "q1").unwrap();
        assert!(quiz.is_correct("2"));
        assert_eq!(quiz.explain_correct, "Zwei.");
    }

    #[test]
    fn test_lookups_fail_closed() {
        let catalog = sample();

        assert!(catalog.poll("kandidat-a", "umwelt", "p1").is_none());
        assert!(catalog.poll("kandidat-b", "kinder", "p1").is_none());
        assert!(catalog.poll("kandidat-a", "kinder", "q1").is_none());
        assert!(catalog.quiz("kandidat-a", "kinder", "p1").is_none());
        assert!(catalog.quiz("missing", "kinder", "q1").is_none());
    }

    #[test]
    fn test_candidates_keep_document_order() {
        let catalog = sample();
        let slugs: Vec<_> = catalog.candidates().map(|c| c.slug.as_str()).collect();

        assert_eq!(slugs, ["kandidat-a", "kandidat-b"]);
        assert_eq!(catalog.polls("kandidat-a").len(), 1);
        assert!(catalog.quizzes("kandidat-b").is_empty());
    }

    #[test]
    fn test_rejects_correct_answer_outside_options() {
        let result = with_first_page(|page| page["quiz"]["correct"] = "9".into());

        assert!(matches!(result, Err(CatalogError::InvalidContent { kind: "quiz", .. })));
    }

    #[test]
    fn test_rejects_duplicate_options() {
        let result = with_first_page(|page| {
            page["poll"]["options"] = serde_json::json!(["A", "A"]);
        });

        assert!(matches!(result, Err(CatalogError::InvalidContent { kind: "poll", .. })));
    }

    #[test]
    fn test_rejects_shared_poll_and_quiz_id() {
        let result = with_first_page(|page| page["quiz"]["id"] = "p1".into());

        assert!(matches!(result, Err(CatalogError::DuplicateContentId { .. })));
    }

    #[test]
    fn test_rejects_duplicate_candidates() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value["candidates"][1]["slug"] = "kandidat-a".into();

        let result = Catalog::from_json(&value.to_string());
        assert!(matches!(result, Err(CatalogError::DuplicateCandidate(_))));
    }

    #[test]
    fn test_rejects_reserved_candidate_slug() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value["candidates"][1]["slug"] = "platform".into();

        let result = Catalog::from_json(&value.to_string());
        assert!(matches!(result, Err(CatalogError::InvalidSlug(slug)) if slug == "platform"));
    }

    #[test]
    fn test_rejects_bad_page_slug() {
        let result = with_first_page(|page| page["slug"] = "Kinder Seite".into());

        assert!(matches!(result, Err(CatalogError::InvalidSlug(_))));
    }

    #[test]
    fn test_admin_password_is_not_debug_printed() {
        let catalog = sample();
        let debug = format!("{:?}", catalog.candidate("kandidat-a").unwrap().admin);

        assert!(!debug.contains("pw-a"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        assert!(matches!(
            load_catalog(file.path().with_extension("missing")),
            Err(CatalogError::Io(_))
        ));
    }
}
