//! # Engagement service
//!
//! One inbound event runs through:
//!
//! 1. catalog resolution (tenant, page, poll/quiz, option)
//! 2. geolocation of the raw address
//! 3. pseudo-identity for the address and the event's UTC day
//! 4. ledger append on the blocking pool, bounded by the storage timeout
//!
//! The raw address is dropped after steps 2 and 3.
use std::sync::{Arc, PoisonError, RwLock};

use catalog::{Catalog, MAX_PAGE_LEN};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::{task::spawn_blocking, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    aggregate::{
        Aggregator, Count, Dashboard, DailyCount, Dimension, Period, PlatformOverview, PollResults,
        QuizResults,
    },
    config::Policy,
    geo::{GeoError, Geolocator},
    identity::IdentityHasher,
    ledger::{
        FeedbackRecord, Ledger, LedgerError, PollVoteRecord, QuizAnswerRecord, ResetCounts, Scope,
        Stamp, VisitRecord,
    },
};

pub const MAX_USER_AGENT_CHARS: usize = 120;
pub const MAX_REFERRER_CHARS: usize = 500;

/// Where an event came from. Only lives for the duration of one request.
#[derive(Debug, Clone)]
pub struct Origin {
    pub address: String,
    pub user_agent: String,
    pub at: DateTime<Utc>,
}

impl Origin {
    pub fn now(address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_agent: user_agent.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizOutcome {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: String,
    pub results: QuizResults,
}

pub struct Engagement {
    ledger: Ledger,
    catalog: RwLock<Arc<Catalog>>,
    geo: Arc<Geolocator>,
    hasher: IdentityHasher,
    policy: Policy,
}

impl Engagement {
    pub fn new(
        ledger: Ledger,
        catalog: Catalog,
        geo: Arc<Geolocator>,
        hasher: IdentityHasher,
        policy: Policy,
    ) -> Self {
        Self {
            ledger,
            catalog: RwLock::new(Arc::new(catalog)),
            geo,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace_catalog(&self, catalog: Catalog) {
        info!("Catalog replaced, {} candidates", catalog.len());
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }

    pub fn geolocator(&self) -> &Geolocator {
        &self.geo
    }

    pub fn reload_geolocation(&self) -> Result<bool, GeoError> {
        self.geo.reload()
    }

    pub async fn record_visit(
        &self,
        slug: &str,
        page: &str,
        referrer: Option<&str>,
        origin: &Origin,
    ) -> Result<(), LedgerError> {
        let catalog = self.catalog();
        require_tenant(&catalog, slug)?;
        let page = require_page(page)?;

        let referrer = match referrer.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) if r.chars().count() > MAX_REFERRER_CHARS => {
                return Err(LedgerError::InvalidInput(format!(
                    "referrer longer than {MAX_REFERRER_CHARS} characters"
                )));
            }
            r => r.map(str::to_string),
        };

        let record = VisitRecord {
            stamp: self.stamp(slug, page, origin),
            user_agent: origin.user_agent.chars().take(MAX_USER_AGENT_CHARS).collect(),
            referrer,
        };

        self.blocking(move |ledger| ledger.append_visit(&record)).await?;
        debug!(slug = %slug, page = %page, "Recorded visit");

        Ok(())
    }

    pub async fn record_poll_vote(
        &self,
        slug: &str,
        page: &str,
        poll_id: &str,
        option: &str,
        origin: &Origin,
    ) -> Result<PollResults, LedgerError> {
        let catalog = self.catalog();
        require_tenant(&catalog, slug)?;

        let poll = catalog
            .poll(slug, page, poll_id)
            .ok_or_else(|| {
                LedgerError::InvalidInput(format!("unknown poll {poll_id} on page {page}"))
            })?;

        if !poll.has_option(option) {
            return Err(LedgerError::InvalidInput(format!("unknown option for poll {poll_id}")));
        }

        let record = PollVoteRecord {
            stamp: self.stamp(slug, page, origin),
            poll_id: poll_id.to_string(),
            option: option.to_string(),
        };

        let (slug, page, poll) = (slug.to_string(), page.to_string(), poll.clone());
        let today = origin.at.date_naive();

        let results = self
            .blocking(move |ledger| {
                ledger.append_poll_vote(&record)?;
                Aggregator::new(ledger, today).poll_results(&slug, &page, &poll)
            })
            .await?;

        debug!(poll = %poll_id, total = results.total, "Recorded poll vote");
        Ok(results)
    }

    pub async fn poll_results(
        &self,
        slug: &str,
        page: &str,
        poll_id: &str,
    ) -> Result<PollResults, LedgerError> {
        let catalog = self.catalog();
        require_tenant(&catalog, slug)?;

        let poll = catalog
            .poll(slug, page, poll_id)
            .ok_or_else(|| {
                LedgerError::InvalidInput(format!("unknown poll {poll_id} on page {page}"))
            })?
            .clone();

        let (slug, page) = (slug.to_string(), page.to_string());
        let today = Utc::now().date_naive();

        self.blocking(move |ledger| {
            Aggregator::new(ledger, today).poll_results(&slug, &page, &poll)
        })
        .await
    }

    pub async fn record_quiz_answer(
        &self,
        slug: &str,
        page: &str,
        quiz_id: &str,
        option: &str,
        origin: &Origin,
    ) -> Result<QuizOutcome, LedgerError> {
        let catalog = self.catalog();
        require_tenant(&catalog, slug)?;

        let quiz = catalog
            .quiz(slug, page, quiz_id)
            .ok_or_else(|| {
                LedgerError::InvalidInput(format!("unknown quiz {quiz_id} on page {page}"))
            })?
            .clone();

        if !quiz.has_option(option) {
            return Err(LedgerError::InvalidInput(format!("unknown option for quiz {quiz_id}")));
        }

        let is_correct = quiz.is_correct(option);
        let record = QuizAnswerRecord {
            stamp: self.stamp(slug, page, origin),
            quiz_id: quiz_id.to_string(),
            option: option.to_string(),
            is_correct,
        };

        let unique = self.policy.unique_quiz_answers;
        let (slug, page) = (slug.to_string(), page.to_string());
        let today = origin.at.date_naive();
        let correct_answer = quiz.correct.clone();
        let explanation = quiz.explain_correct.clone();

        let results = self
            .blocking(move |ledger| {
                ledger.append_quiz_answer(&record, unique)?;
                Aggregator::new(ledger, today).quiz_results(&slug, &page, &quiz)
            })
            .await?;

        debug!(quiz = %quiz_id, is_correct, "Recorded quiz answer");
        Ok(QuizOutcome {
            is_correct,
            correct_answer,
            explanation,
            results,
        })
    }

    /// Returns how many messages the sender has left today.
    pub async fn record_feedback(
        &self,
        slug: &str,
        page: &str,
        message: &str,
        origin: &Origin,
    ) -> Result<u32, LedgerError> {
        let catalog = self.catalog();
        require_tenant(&catalog, slug)?;
        let page = require_page(page)?;

        let message = message.trim();
        let max_chars = self.policy.feedback_max_chars;
        if message.is_empty() {
            return Err(LedgerError::InvalidInput("feedback is empty".to_string()));
        }
        if message.chars().count() > max_chars {
            return Err(LedgerError::InvalidInput(format!(
                "feedback longer than {max_chars} characters"
            )));
        }

        let record = FeedbackRecord {
            stamp: self.stamp(slug, page, origin),
            message: message.to_string(),
        };
        let limit = self.policy.feedback_daily_limit;

        let remaining = self
            .blocking(move |ledger| ledger.append_feedback(&record, limit))
            .await
            .inspect_err(|e| {
                if matches!(e, LedgerError::RateLimited { .. }) {
                    info!(slug = %slug, "Feedback limit reached");
                }
            })?;

        debug!(slug = %slug, remaining, "Recorded feedback");
        Ok(remaining)
    }

    pub async fn dashboard(
        &self,
        slug: &str,
        period: Period,
        today: NaiveDate,
    ) -> Result<Dashboard, LedgerError> {
        let catalog = self.catalog();
        let slug = slug.to_string();

        self.blocking(move |ledger| {
            Aggregator::new(ledger, today).dashboard(&catalog, &slug, period)
        })
        .await
    }

    pub async fn daily_series(
        &self,
        scope: Scope,
        days: u32,
        today: NaiveDate,
    ) -> Result<Vec<DailyCount>, LedgerError> {
        self.require_scope(&scope)?;

        self.blocking(move |ledger| Aggregator::new(ledger, today).daily_series(&scope, days))
            .await
    }

    pub async fn top_locations(
        &self,
        scope: Scope,
        dimension: Dimension,
        limit: usize,
        period: Period,
        today: NaiveDate,
    ) -> Result<Vec<Count>, LedgerError> {
        self.require_scope(&scope)?;

        self.blocking(move |ledger| {
            Aggregator::new(ledger, today).top_locations(&scope, dimension, limit, period)
        })
        .await
    }

    pub async fn platform_overview(
        &self,
        period: Period,
        today: NaiveDate,
    ) -> Result<PlatformOverview, LedgerError> {
        let catalog = self.catalog();

        self.blocking(move |ledger| {
            Aggregator::new(ledger, today).platform_overview(&catalog, period)
        })
        .await
    }

    /// Irreversible. A tenant reset also works for slugs that only exist in
    /// the ledger anymore.
    pub async fn reset(&self, scope: Scope) -> Result<ResetCounts, LedgerError> {
        let counts = self.blocking(move |ledger| ledger.reset(&scope)).await?;

        warn!(
            visits = counts.visits,
            poll_votes = counts.poll_votes,
            quiz_answers = counts.quiz_answers,
            feedback = counts.feedback,
            "Analytics reset"
        );

        Ok(counts)
    }

    fn require_scope(&self, scope: &Scope) -> Result<(), LedgerError> {
        match scope.slug() {
            Some(slug) => require_tenant(&self.catalog(), slug),
            None => Ok(()),
        }
    }

    fn stamp(&self, slug: &str, page: &str, origin: &Origin) -> Stamp {
        Stamp {
            at: origin.at,
            tenant: slug.to_string(),
            page: page.to_string(),
            location: self.geo.resolve(&origin.address),
            identity: self.hasher.derive(&origin.address, origin.at.date_naive()),
        }
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.ledger.clone();
        let task = spawn_blocking(move || job(&ledger));

        match timeout(self.policy.storage_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LedgerError::Task(e.to_string())),
            Err(_) => {
                warn!("Ledger call exceeded {:?}", self.policy.storage_timeout);
                Err(LedgerError::Transient("storage timeout".to_string()))
            }
        }
    }
}

fn require_tenant(catalog: &Catalog, slug: &str) -> Result<(), LedgerError> {
    if catalog.contains(slug) {
        Ok(())
    } else {
        Err(LedgerError::UnknownTenant(slug.to_string()))
    }
}

fn require_page(page: &str) -> Result<&str, LedgerError> {
    let page = page.trim();

    if page.is_empty() || page.chars().count() > MAX_PAGE_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "page must be 1 to {MAX_PAGE_LEN} characters"
        )));
    }

    Ok(page)
}
