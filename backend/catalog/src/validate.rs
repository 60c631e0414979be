use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::{
    CatalogError,
    content::{Candidate, Document},
};

pub const MAX_SLUG_LEN: usize = 64;
pub const MAX_PAGE_LEN: usize = 50;
pub const MAX_CONTENT_ID_LEN: usize = 50;
pub const MAX_OPTION_LEN: usize = 200;

/// Path segments the server routes itself under `/api/`.
pub const RESERVED_SLUGS: [&str; 2] = ["platform", "health"];

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("slug pattern compiles"));

/// Lowercase ASCII letters, digits and dashes, not starting with a dash.
pub fn is_valid_slug(input: &str) -> bool {
    input.len() <= MAX_SLUG_LEN && SLUG.is_match(input)
}

pub fn validate_document(document: &Document) -> Result<(), CatalogError> {
    let mut slugs = HashSet::new();

    for candidate in &document.candidates {
        if !is_valid_slug(&candidate.slug) || RESERVED_SLUGS.contains(&candidate.slug.as_str()) {
            return Err(CatalogError::InvalidSlug(candidate.slug.clone()));
        }

        if !slugs.insert(candidate.slug.as_str()) {
            return Err(CatalogError::DuplicateCandidate(candidate.slug.clone()));
        }

        validate_candidate(candidate)?;
    }

    Ok(())
}

fn validate_candidate(candidate: &Candidate) -> Result<(), CatalogError> {
    let mut pages = HashSet::new();
    // polls and quizzes share one id namespace per candidate
    let mut ids = HashSet::new();

    for page in &candidate.pages {
        if page.slug.len() > MAX_PAGE_LEN || !is_valid_slug(&page.slug) {
            return Err(CatalogError::InvalidSlug(page.slug.clone()));
        }

        if !pages.insert(page.slug.as_str()) {
            return Err(CatalogError::DuplicatePage {
                candidate: candidate.slug.clone(),
                page: page.slug.clone(),
            });
        }

        if let Some(poll) = &page.poll {
            check_id(candidate, &mut ids, &poll.id)?;
            check_options(candidate, "poll", &poll.id, &poll.options)?;
        }

        if let Some(quiz) = &page.quiz {
            check_id(candidate, &mut ids, &quiz.id)?;
            check_options(candidate, "quiz", &quiz.id, &quiz.options)?;

            if !quiz.has_option(&quiz.correct) {
                return Err(invalid(
                    candidate,
                    "quiz",
                    &quiz.id,
                    format!("correct answer {:?} is not an option", quiz.correct),
                ));
            }
        }
    }

    Ok(())
}

fn check_id<'a>(
    candidate: &Candidate,
    ids: &mut HashSet<&'a str>,
    id: &'a str,
) -> Result<(), CatalogError> {
    if id.is_empty() || id.len() > MAX_CONTENT_ID_LEN {
        return Err(invalid(
            candidate,
            "content id",
            id,
            format!("length must be 1..={MAX_CONTENT_ID_LEN}"),
        ));
    }

    if !ids.insert(id) {
        return Err(CatalogError::DuplicateContentId {
            candidate: candidate.slug.clone(),
            id: id.to_string(),
        });
    }

    Ok(())
}

fn check_options(
    candidate: &Candidate,
    kind: &'static str,
    id: &str,
    options: &[String],
) -> Result<(), CatalogError> {
    if options.is_empty() {
        return Err(invalid(candidate, kind, id, "no options".to_string()));
    }

    let mut seen = HashSet::new();
    for option in options {
        if option.is_empty() || option.len() > MAX_OPTION_LEN {
            return Err(invalid(
                candidate,
                kind,
                id,
                format!("option length must be 1..={MAX_OPTION_LEN}"),
            ));
        }

        if !seen.insert(option.as_str()) {
            return Err(invalid(
                candidate,
                kind,
                id,
                format!("duplicate option {option:?}"),
            ));
        }
    }

    Ok(())
}

fn invalid(candidate: &Candidate, kind: &'static str, id: &str, reason: String) -> CatalogError {
    CatalogError::InvalidContent {
        candidate: candidate.slug.clone(),
        kind,
        id: id.to_string(),
        reason,
    }
}
