//! # Aggregation
//!
//! Read-only statistics over the ledger for the candidate dashboard and the
//! platform overview.
//!
//! ## Definitions
//!
//! - **Period**: the trailing N days including today (UTC), or all time.
//! - **Unique visitors**: distinct pseudo-identities *per day*, summed over the
//!   days of the period. A visitor who returns the next day counts again; the
//!   identity rotates at midnight so nothing else is possible.
//! - **Percentages**: one decimal place. Zero votes means zero everywhere.
//! - **Ordering**: counts descending, ties by value ascending.
//! - **Most common wrong answer**: highest count among incorrect answers, ties
//!   go to the option listed first in the catalog.
use std::collections::{BTreeMap, BTreeSet};

use catalog::{
    Catalog,
    content::{Poll, Quiz},
};
use chrono::{Days, NaiveDate};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::ledger::{Ledger, LedgerError, Scope, day_key};

pub const TOP_LOCATIONS: usize = 20;
pub const RECENT_FEEDBACK: usize = 100;
pub const MAX_PERIOD_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days(u32),
    AllTime,
}

impl Period {
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Days(days) => Some(first_day(today, *days)),
            Period::AllTime => None,
        }
    }

    fn start_key(&self, today: NaiveDate) -> Option<String> {
        self.start(today).map(day_key)
    }
}

fn first_day(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    City,
    Region,
    Country,
}

impl Dimension {
    fn column(&self) -> &'static str {
        match self {
            Dimension::City => "city",
            Dimension::Region => "region",
            Dimension::Country => "country",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub visits: u64,
    pub unique_visitors: u64,
    pub poll_votes: u64,
    pub quiz_answers: u64,
    pub feedback: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub visits: u64,
    pub unique: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionCount {
    pub option: String,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResults {
    pub poll_id: String,
    pub page: String,
    pub total: u64,
    pub options: Vec<OptionCount>,
}

impl PollResults {
    pub fn option(&self, option: &str) -> Option<&OptionCount> {
        self.options.iter().find(|o| o.option == option)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizResults {
    pub quiz_id: String,
    pub page: String,
    pub total: u64,
    pub correct: u64,
    /// `correct / total`, 0 without answers.
    pub correct_rate: f64,
    pub options: Vec<OptionCount>,
    pub most_common_wrong: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEntry {
    pub ts: String,
    pub page: String,
    pub message: String,
    pub city: String,
    pub region: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub slug: String,
    pub period_days: Option<u32>,
    pub totals: Totals,
    pub unique_today: u64,
    pub per_page: Vec<Count>,
    pub top_cities: Vec<Count>,
    pub top_regions: Vec<Count>,
    pub top_countries: Vec<Count>,
    pub daily: Vec<DailyCount>,
    pub polls: Vec<PollResults>,
    pub quizzes: Vec<QuizResults>,
    pub feedback: Vec<FeedbackEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantTotals {
    pub slug: String,
    pub in_catalog: bool,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformOverview {
    pub period_days: Option<u32>,
    pub totals: Totals,
    pub tenants: Vec<TenantTotals>,
}

pub fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

fn ratio(count: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { count as f64 / total as f64 }
}

pub struct Aggregator<'a> {
    ledger: &'a Ledger,
    today: NaiveDate,
}

impl<'a> Aggregator<'a> {
    pub fn new(ledger: &'a Ledger, today: NaiveDate) -> Self {
        Self { ledger, today }
    }

    pub fn totals(&self, scope: &Scope, period: Period) -> Result<Totals, LedgerError> {
        let slug = scope.slug();
        let start = period.start_key(self.today);

        self.ledger.read(|conn| {
            Ok(Totals {
                visits: count_rows(conn, "visits", slug, start.as_deref())?,
                unique_visitors: conn.query_row(
                    "SELECT COUNT(*) FROM (
                         SELECT DISTINCT day, identity FROM visits
                         WHERE (?1 IS NULL OR tenant = ?1) AND (?2 IS NULL OR day >= ?2)
                     )",
                    params![slug, start],
                    |row| row.get(0),
                )?,
                poll_votes: count_rows(conn, "poll_votes", slug, start.as_deref())?,
                quiz_answers: count_rows(conn, "quiz_answers", slug, start.as_deref())?,
                feedback: count_rows(conn, "feedback", slug, start.as_deref())?,
            })
        })
    }

    pub fn unique_today(&self, scope: &Scope) -> Result<u64, LedgerError> {
        let slug = scope.slug();
        let today = day_key(self.today);

        self.ledger.read(|conn| {
            conn.query_row(
                "SELECT COUNT(DISTINCT identity) FROM visits
                 WHERE (?1 IS NULL OR tenant = ?1) AND day = ?2",
                params![slug, today],
                |row| row.get(0),
            )
        })
    }

    /// Exactly `days` entries (at most [`MAX_PERIOD_DAYS`]), oldest first,
    /// ending today.
    pub fn daily_series(
        &self,
        scope: &Scope,
        days: u32,
    ) -> Result<Vec<DailyCount>, LedgerError> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let days = days.min(MAX_PERIOD_DAYS);

        let slug = scope.slug();
        let start = first_day(self.today, days);

        let rows: BTreeMap<String, (u64, u64)> = self.ledger.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT day, COUNT(*), COUNT(DISTINCT identity) FROM visits
                 WHERE (?1 IS NULL OR tenant = ?1) AND day >= ?2 AND day <= ?3
                 GROUP BY day",
            )?;

            stmt.query_map(params![slug, day_key(start), day_key(self.today)], |row| {
                Ok((row.get(0)?, (row.get(1)?, row.get(2)?)))
            })?
            .collect()
        })?;

        Ok(start
            .iter_days()
            .take_while(|day| *day <= self.today)
            .map(|day| {
                let (visits, unique) = rows.get(&day_key(day)).copied().unwrap_or_default();
                DailyCount { day, visits, unique }
            })
            .collect())
    }

    pub fn top_locations(
        &self,
        scope: &Scope,
        dimension: Dimension,
        limit: usize,
        period: Period,
    ) -> Result<Vec<Count>, LedgerError> {
        let column = dimension.column();

        self.grouped_counts(
            &format!(
                "SELECT {column}, COUNT(*) AS cnt FROM visits
                 WHERE (?1 IS NULL OR tenant = ?1) AND (?2 IS NULL OR day >= ?2)
                 GROUP BY {column} ORDER BY cnt DESC, {column} ASC LIMIT ?3"
            ),
            scope,
            period,
            limit,
        )
    }

    pub fn page_breakdown(&self, scope: &Scope, period: Period) -> Result<Vec<Count>, LedgerError> {
        self.grouped_counts(
            "SELECT page, COUNT(*) AS cnt FROM visits
             WHERE (?1 IS NULL OR tenant = ?1) AND (?2 IS NULL OR day >= ?2)
             GROUP BY page ORDER BY cnt DESC, page ASC LIMIT ?3",
            scope,
            period,
            usize::MAX,
        )
    }

    fn grouped_counts(
        &self,
        sql: &str,
        scope: &Scope,
        period: Period,
        limit: usize,
    ) -> Result<Vec<Count>, LedgerError> {
        let slug = scope.slug();
        let start = period.start_key(self.today);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.ledger.read(|conn| {
            let mut stmt = conn.prepare(sql)?;

            stmt.query_map(params![slug, start, limit], |row| {
                Ok(Count {
                    value: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect()
        })
    }

    pub fn poll_results(
        &self,
        slug: &str,
        page: &str,
        poll: &Poll,
    ) -> Result<PollResults, LedgerError> {
        let counts = self.ledger.read(|conn| {
            option_counts(
                conn,
                "SELECT option, COUNT(*) FROM poll_votes
                 WHERE tenant = ?1 AND page = ?2 AND poll_id = ?3 GROUP BY option",
                params![slug, page, poll.id],
            )
        })?;

        let total = counts.values().sum();

        Ok(PollResults {
            poll_id: poll.id.clone(),
            page: page.to_string(),
            total,
            options: ordered_options(&poll.options, &counts, total),
        })
    }

    pub fn quiz_results(
        &self,
        slug: &str,
        page: &str,
        quiz: &Quiz,
    ) -> Result<QuizResults, LedgerError> {
        let counts = self.ledger.read(|conn| {
            option_counts(
                conn,
                "SELECT option, COUNT(*) FROM quiz_answers
                 WHERE tenant = ?1 AND page = ?2 AND quiz_id = ?3 GROUP BY option",
                params![slug, page, quiz.id],
            )
        })?;

        // stored flag, not the current catalog answer
        let wrong = self.ledger.read(|conn| {
            option_counts(
                conn,
                "SELECT option, COUNT(*) FROM quiz_answers
                 WHERE tenant = ?1 AND page = ?2 AND quiz_id = ?3 AND is_correct = 0
                 GROUP BY option",
                params![slug, page, quiz.id],
            )
        })?;

        let total = counts.values().sum();
        let correct = total - wrong.values().sum::<u64>();
        let options = ordered_options(&quiz.options, &counts, total);

        let mut most_common_wrong: Option<(&str, u64)> = None;
        for option in &options {
            let count = wrong.get(&option.option).copied().unwrap_or(0);
            if count > 0 && most_common_wrong.is_none_or(|(_, best)| count > best) {
                most_common_wrong = Some((option.option.as_str(), count));
            }
        }

        Ok(QuizResults {
            quiz_id: quiz.id.clone(),
            page: page.to_string(),
            total,
            correct,
            correct_rate: ratio(correct, total),
            most_common_wrong: most_common_wrong.map(|(option, _)| option.to_string()),
            options,
        })
    }

    pub fn recent_feedback(
        &self,
        slug: &str,
        period: Period,
        limit: usize,
    ) -> Result<Vec<FeedbackEntry>, LedgerError> {
        let start = period.start_key(self.today);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.ledger.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ts, page, message, city, region, country FROM feedback
                 WHERE tenant = ?1 AND (?2 IS NULL OR day >= ?2)
                 ORDER BY ts DESC, id DESC LIMIT ?3",
            )?;

            stmt.query_map(params![slug, start, limit], |row| {
                Ok(FeedbackEntry {
                    ts: row.get(0)?,
                    page: row.get(1)?,
                    message: row.get(2)?,
                    city: row.get(3)?,
                    region: row.get(4)?,
                    country: row.get(5)?,
                })
            })?
            .collect()
        })
    }

    pub fn dashboard(
        &self,
        catalog: &Catalog,
        slug: &str,
        period: Period,
    ) -> Result<Dashboard, LedgerError> {
        if !catalog.contains(slug) {
            return Err(LedgerError::UnknownTenant(slug.to_string()));
        }

        let scope = Scope::tenant(slug);
        let series_days = match period {
            Period::Days(days) => days,
            Period::AllTime => MAX_PERIOD_DAYS,
        };

        let polls = catalog
            .polls(slug)
            .into_iter()
            .map(|(page, poll)| self.poll_results(slug, &page.slug, poll))
            .collect::<Result<_, _>>()?;

        let quizzes = catalog
            .quizzes(slug)
            .into_iter()
            .map(|(page, quiz)| self.quiz_results(slug, &page.slug, quiz))
            .collect::<Result<_, _>>()?;

        Ok(Dashboard {
            slug: slug.to_string(),
            period_days: match period {
                Period::Days(days) => Some(days),
                Period::AllTime => None,
            },
            totals: self.totals(&scope, period)?,
            unique_today: self.unique_today(&scope)?,
            per_page: self.page_breakdown(&scope, period)?,
            top_cities: self.top_locations(&scope, Dimension::City, TOP_LOCATIONS, period)?,
            top_regions: self.top_locations(&scope, Dimension::Region, TOP_LOCATIONS, period)?,
            top_countries: self.top_locations(&scope, Dimension::Country, TOP_LOCATIONS, period)?,
            daily: self.daily_series(&scope, series_days)?,
            polls,
            quizzes,
            feedback: self.recent_feedback(slug, period, RECENT_FEEDBACK)?,
        })
    }

    /// Catalog candidates first, in catalog order, then any slug that only
    /// exists in the ledger.
    pub fn platform_overview(
        &self,
        catalog: &Catalog,
        period: Period,
    ) -> Result<PlatformOverview, LedgerError> {
        let recorded: BTreeSet<String> = self.ledger.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tenant FROM visits UNION SELECT tenant FROM poll_votes
                 UNION SELECT tenant FROM quiz_answers UNION SELECT tenant FROM feedback",
            )?;

            stmt.query_map([], |row| row.get(0))?.collect()
        })?;

        let slugs = catalog
            .candidates()
            .map(|c| (c.slug.clone(), true))
            .chain(
                recorded
                    .into_iter()
                    .filter(|slug| !catalog.contains(slug))
                    .map(|slug| (slug, false)),
            );

        let mut tenants = Vec::new();
        for (slug, in_catalog) in slugs {
            let totals = self.totals(&Scope::Tenant(slug.clone()), period)?;
            tenants.push(TenantTotals {
                slug,
                in_catalog,
                totals,
            });
        }

        Ok(PlatformOverview {
            period_days: match period {
                Period::Days(days) => Some(days),
                Period::AllTime => None,
            },
            totals: self.totals(&Scope::All, period)?,
            tenants,
        })
    }
}

fn count_rows(
    conn: &Connection,
    table: &str,
    slug: Option<&str>,
    start: Option<&str>,
) -> rusqlite::Result<u64> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {table}
             WHERE (?1 IS NULL OR tenant = ?1) AND (?2 IS NULL OR day >= ?2)"
        ),
        params![slug, start],
        |row| row.get(0),
    )
}

fn option_counts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;

    stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect()
}

/// Configured options in catalog order, then options that were removed from
/// the catalog but still have votes, alphabetically.
fn ordered_options(
    configured: &[String],
    counts: &BTreeMap<String, u64>,
    total: u64,
) -> Vec<OptionCount> {
    let leftovers = counts
        .keys()
        .filter(|option| !configured.contains(option));

    configured
        .iter()
        .chain(leftovers)
        .map(|option| {
            let count = counts.get(option).copied().unwrap_or(0);
            OptionCount {
                option: option.clone(),
                count,
                percent: percent(count, total),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geo::Location,
        ledger::tests::{at, feedback, quiz, visit, vote},
    };

    const CATALOG: &str = r#"{
        "candidates": [{
            "slug": "kandidat-a",
            "name": "Kandidat A",
            "admin": { "user": "a", "password": "pw" },
            "pages": [{
                "slug": "kinder",
                "poll": { "id": "p1", "question": "?", "options": ["A", "B", "C", "D"] },
                "quiz": { "id": "q1", "question": "?", "options": ["1", "2", "3"], "correct": "2" }
            }]
        }]
    }"#;

    fn today() -> NaiveDate {
        at(10, 12).date_naive()
    }

    fn catalog() -> Catalog {
        Catalog::from_json(CATALOG).unwrap()
    }

    fn poll(catalog: &Catalog) -> &Poll {
        catalog.poll("kandidat-a", "kinder", "p1").unwrap()
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(2, 3), 66.7);
        assert_eq!(percent(3, 3), 100.0);
    }

    #[test]
    fn test_poll_results_without_votes() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();

        let results = Aggregator::new(&ledger, today())
            .poll_results("kandidat-a", "kinder", poll(&catalog))
            .unwrap();

        assert_eq!(results.total, 0);
        assert_eq!(results.options.len(), 4);
        assert!(results.options.iter().all(|o| o.count == 0 && o.percent == 0.0));
    }

    #[test]
    fn test_poll_results_sum_to_hundred() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();

        for (who, option) in [("h1", "A"), ("h2", "B"), ("h3", "C")] {
            ledger.append_poll_vote(&vote("kandidat-a", who, option, at(10, 9))).unwrap();
        }
        ledger.append_poll_vote(&vote("kandidat-b", "h4", "D", at(10, 9))).unwrap();

        let results = Aggregator::new(&ledger, today())
            .poll_results("kandidat-a", "kinder", poll(&catalog))
            .unwrap();

        assert_eq!(results.total, 3);
        assert_eq!(results.option("D").unwrap().count, 0);
        let sum: f64 = results.options.iter().map(|o| o.percent).sum();
        assert!((sum - 100.0).abs() <= 0.2, "{sum}");
    }

    #[test]
    fn test_poll_results_keep_removed_options() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();

        ledger.append_poll_vote(&vote("kandidat-a", "h1", "Z", at(10, 9))).unwrap();

        let results = Aggregator::new(&ledger, today())
            .poll_results("kandidat-a", "kinder", poll(&catalog))
            .unwrap();

        let options: Vec<_> = results.options.iter().map(|o| o.option.as_str()).collect();
        assert_eq!(options, ["A", "B", "C", "D", "Z"]);
        assert_eq!(results.option("Z").unwrap().percent, 100.0);
    }

    #[test]
    fn test_quiz_results() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();
        let quiz_config = catalog.quiz("kandidat-a", "kinder", "q1").unwrap();
        let aggregator = Aggregator::new(&ledger, today());

        let empty = aggregator.quiz_results("kandidat-a", "kinder", quiz_config).unwrap();
        assert_eq!(empty.correct_rate, 0.0);
        assert_eq!(empty.most_common_wrong, None);

        for (who, option) in [("h1", "2"), ("h2", "3"), ("h3", "1"), ("h4", "2")] {
            let record = quiz("kandidat-a", who, option, option == "2", at(10, 9));
            ledger.append_quiz_answer(&record, false).unwrap();
        }

        let results = aggregator.quiz_results("kandidat-a", "kinder", quiz_config).unwrap();
        assert_eq!(results.total, 4);
        assert_eq!(results.correct, 2);
        assert_eq!(results.correct_rate, 0.5);
        // "1" and "3" tie, "1" comes first in the catalog
        assert_eq!(results.most_common_wrong.as_deref(), Some("1"));
    }

    #[test]
    fn test_quiz_all_correct_has_no_wrong_answer() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();
        let quiz_config = catalog.quiz("kandidat-a", "kinder", "q1").unwrap();

        ledger.append_quiz_answer(&quiz("kandidat-a", "h1", "2", true, at(10, 9)), false).unwrap();

        let results = Aggregator::new(&ledger, today())
            .quiz_results("kandidat-a", "kinder", quiz_config)
            .unwrap();
        assert_eq!(results.correct_rate, 1.0);
        assert_eq!(results.most_common_wrong, None);
    }

    #[test]
    fn test_quiz_results_follow_stored_correctness() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();
        let quiz_config = catalog.quiz("kandidat-a", "kinder", "q1").unwrap();

        // recorded while "3" was the correct answer, the catalog now says "2"
        let answers = [("h1", "3", true), ("h2", "3", true), ("h3", "1", false)];
        for (who, option, is_correct) in answers {
            let record = quiz("kandidat-a", who, option, is_correct, at(10, 9));
            ledger.append_quiz_answer(&record, false).unwrap();
        }

        let results = Aggregator::new(&ledger, today())
            .quiz_results("kandidat-a", "kinder", quiz_config)
            .unwrap();
        assert_eq!(results.correct, 2);
        assert_eq!(results.most_common_wrong.as_deref(), Some("1"));
    }

    #[test]
    fn test_daily_series_is_capped() {
        let ledger = Ledger::in_memory().unwrap();

        let series = Aggregator::new(&ledger, today())
            .daily_series(&Scope::All, u32::MAX)
            .unwrap();

        assert_eq!(series.len(), MAX_PERIOD_DAYS as usize);
        assert_eq!(series.last().unwrap().day, today());
    }

    #[test]
    fn test_daily_series_zero_filled() {
        let ledger = Ledger::in_memory().unwrap();

        ledger.append_visit(&visit("kandidat-a", "home", "h1", at(5, 9))).unwrap();
        ledger.append_visit(&visit("kandidat-a", "home", "h1", at(5, 10))).unwrap();
        ledger.append_visit(&visit("kandidat-a", "home", "h2", at(10, 8))).unwrap();
        // outside the window
        ledger.append_visit(&visit("kandidat-a", "home", "h2", at(1, 8))).unwrap();

        let series = Aggregator::new(&ledger, today())
            .daily_series(&Scope::tenant("kandidat-a"), 7)
            .unwrap();

        assert_eq!(series.len(), 7);
        assert_eq!(series[0].day, at(4, 0).date_naive());
        assert_eq!(series[6].day, today());
        assert!(series.windows(2).all(|w| w[0].day < w[1].day));

        assert_eq!((series[1].visits, series[1].unique), (2, 1));
        assert_eq!((series[6].visits, series[6].unique), (1, 1));
        let quiet: u64 = [0, 2, 3, 4, 5].iter().map(|&i| series[i].visits).sum();
        assert_eq!(quiet, 0);
    }

    #[test]
    fn test_daily_series_empty_ledger() {
        let ledger = Ledger::in_memory().unwrap();
        let aggregator = Aggregator::new(&ledger, today());

        for days in [7, 30, 90] {
            let series = aggregator.daily_series(&Scope::All, days).unwrap();
            assert_eq!(series.len(), days as usize);
            assert!(series.iter().all(|d| d.visits == 0));
        }
    }

    #[test]
    fn test_totals_unique_per_day_summed() {
        let ledger = Ledger::in_memory().unwrap();

        // h1 twice on day 9 and once on day 10, h2 once on day 10
        ledger.append_visit(&visit("kandidat-a", "home", "h1", at(9, 9))).unwrap();
        ledger.append_visit(&visit("kandidat-a", "kinder", "h1", at(9, 10))).unwrap();
        ledger.append_visit(&visit("kandidat-a", "home", "h1", at(10, 9))).unwrap();
        ledger.append_visit(&visit("kandidat-a", "home", "h2", at(10, 9))).unwrap();
        ledger.append_visit(&visit("kandidat-b", "home", "h1", at(10, 9))).unwrap();
        ledger.append_feedback(&feedback("kandidat-a", "home", "h1", at(10, 9)), 3).unwrap();

        let aggregator = Aggregator::new(&ledger, today());
        let totals = aggregator.totals(&Scope::tenant("kandidat-a"), Period::Days(30)).unwrap();

        assert_eq!(totals.visits, 4);
        assert_eq!(totals.unique_visitors, 3);
        assert_eq!(totals.feedback, 1);
        assert_eq!(totals.poll_votes, 0);

        let today_only = aggregator.totals(&Scope::tenant("kandidat-a"), Period::Days(1)).unwrap();
        assert_eq!(today_only.visits, 2);

        assert_eq!(aggregator.totals(&Scope::All, Period::AllTime).unwrap().visits, 5);
        assert_eq!(aggregator.unique_today(&Scope::tenant("kandidat-a")).unwrap(), 2);
    }

    #[test]
    fn test_top_locations_ordering() {
        let ledger = Ledger::in_memory().unwrap();
        let cities = ["Köln", "Bonn", "Köln", "Aachen", "Bonn", "unknown"];

        for (i, city) in cities.iter().enumerate() {
            let mut record = visit("kandidat-a", "home", &format!("h{i}"), at(10, 9));
            record.stamp.location = Location::new(city, "NRW", "Germany");
            ledger.append_visit(&record).unwrap();
        }

        let aggregator = Aggregator::new(&ledger, today());
        let scope = Scope::tenant("kandidat-a");
        let top = aggregator
            .top_locations(&scope, Dimension::City, 3, Period::Days(30))
            .unwrap();

        let values: Vec<_> = top.iter().map(|c| (c.value.as_str(), c.count)).collect();
        assert_eq!(values, [("Bonn", 2), ("Köln", 2), ("Aachen", 1)]);

        let countries = aggregator
            .top_locations(&scope, Dimension::Country, 20, Period::Days(30))
            .unwrap();
        assert_eq!(countries, [Count { value: "Germany".to_string(), count: 6 }]);
    }

    #[test]
    fn test_dashboard_and_overview() {
        let ledger = Ledger::in_memory().unwrap();
        let catalog = catalog();

        ledger.append_visit(&visit("kandidat-a", "kinder", "h1", at(10, 9))).unwrap();
        ledger.append_poll_vote(&vote("kandidat-a", "h1", "A", at(10, 9))).unwrap();
        ledger.append_feedback(&feedback("kandidat-a", "kinder", "h1", at(10, 9)), 3).unwrap();
        ledger.append_visit(&visit("retired", "home", "h1", at(10, 9))).unwrap();

        let aggregator = Aggregator::new(&ledger, today());
        let dashboard = aggregator.dashboard(&catalog, "kandidat-a", Period::Days(7)).unwrap();

        assert_eq!(dashboard.totals.visits, 1);
        assert_eq!(dashboard.daily.len(), 7);
        assert_eq!(dashboard.polls[0].total, 1);
        assert_eq!(dashboard.quizzes[0].total, 0);
        assert_eq!(dashboard.feedback[0].message, "Mehr Radwege bitte");
        assert_eq!(dashboard.per_page[0].value, "kinder");

        assert!(matches!(
            aggregator.dashboard(&catalog, "retired", Period::Days(7)),
            Err(LedgerError::UnknownTenant(_))
        ));

        let overview = aggregator.platform_overview(&catalog, Period::AllTime).unwrap();
        let slugs: Vec<_> = overview
            .tenants
            .iter()
            .map(|t| (t.slug.as_str(), t.in_catalog))
            .collect();
        assert_eq!(slugs, [("kandidat-a", true), ("retired", false)]);
        assert_eq!(overview.totals.visits, 2);
    }
}
