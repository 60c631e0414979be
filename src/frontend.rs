//! # Frontend Specifications
//!
//! What the micro-site pages send and get back. All bodies are JSON.
//!
//! ## Overall Payloads
//!
//! ### Visit
//! `POST /api/{slug}/event/visit`
//! - `{ "page": "kinder", "ref": "https://..." }`, `ref` optional, max 500 chars
//! - Sent once per page load, never deduplicated
//!
//! ### Poll Vote
//! `POST /api/{slug}/poll/vote`
//! - `{ "page": "kinder", "poll_id": "p1", "option": "B" }`
//! - 200 `{ "ok": true, "results": {...} }`
//! - 409 `{ "ok": false, "error": "already_voted", "results": {...} }`
//! - Both carry results so the page can show the bars either way
//!
//! ### Quiz Answer
//! `POST /api/{slug}/quiz/answer`
//! - `{ "page": "kinder", "quiz_id": "q1", "option": "2" }`
//! - 200 `{ "ok": true, "outcome": { "is_correct", "correct_answer", "explanation", "results" } }`
//!
//! ### Feedback
//! `POST /api/{slug}/feedback`
//! - `{ "page": "kinder", "message": "..." }`, 1 to 1000 chars after trimming
//! - 200 `{ "ok": true, "remaining_today": 2 }`
//! - 429 once the daily limit is used up, hide the form until tomorrow
//!
//! ### Errors
//! `{ "ok": false, "error": "<kind>", "message": "..." }`
//! - `invalid_input` 400, `unknown_tenant` 404, `already_voted`/`already_answered` 409
//! - `rate_limited` 429
//! - `transient_storage_failure` 503 with `Retry-After: 1`, safe to resend once
//!
//!
//!
//! ## Local Storage
//!
//! - Remember voted polls and answered quizzes per slug to skip the form on reload
//! - Purely cosmetic, a cleared storage just means the next vote gets a 409
//!
//!
//!
//! ## Admin Dashboard
//!
//! - Browser Basic auth prompt, credentials from the candidate's catalog entry
//! - `GET /api/{slug}/admin/stats?period=30` returns everything the dashboard renders
//! - Period selector: 7, 30, 90, 365 days
//! - Charts: `daily` (visits + unique), `top_cities`/`top_regions`/`top_countries`
//! - "Reset analytics" asks twice, then `POST /api/{slug}/admin/reset`
