//! Core data model for flight-search orchestration
//!
//! Request shapes, date-pair expansion, per-worker results, and the
//! request-level aggregate that progressive analyses are computed over.

use chrono::{Duration as ChronoDuration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Inbound search request.
///
/// `fixed` searches a single date pair; `flexible` explores every trip of
/// `trip_duration` days that starts inside the given month.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "search_mode", rename_all = "lowercase")]
pub enum SearchRequest {
    Fixed {
        from: String,
        to: String,
        dep_date: NaiveDate,
        ret_date: NaiveDate,
    },
    Flexible {
        from: String,
        to: String,
        /// Zero-based month (0 = January), matching the JS-style wire format.
        month: u32,
        year: i32,
        trip_duration: i64,
    },
}

impl SearchRequest {
    /// Origin airport / city code.
    #[must_use]
    pub fn from(&self) -> &str {
        match self {
            Self::Fixed { from, .. } | Self::Flexible { from, .. } => from,
        }
    }

    /// Destination airport / city code.
    #[must_use]
    pub fn to(&self) -> &str {
        match self {
            Self::Fixed { to, .. } | Self::Flexible { to, .. } => to,
        }
    }
}

/// Errors produced while validating or expanding a [`SearchRequest`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid month {0} (expected 0..=11)")]
    InvalidMonth(u32),

    #[error("invalid trip duration {0} (must be at least 1 day)")]
    InvalidTripDuration(i64),

    #[error("invalid date in request: {0}")]
    InvalidDate(String),

    #[error("return date {ret} precedes departure date {dep}")]
    ReturnBeforeDeparture { dep: NaiveDate, ret: NaiveDate },
}

/// One `(dep_date, ret_date)` combination to be searched by one worker.
///
/// `pair_id` is the 1-based enumeration index and is stable for the
/// lifetime of the request, including worker retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePair {
    pub pair_id: u32,
    pub dep_date: NaiveDate,
    pub ret_date: NaiveDate,
}

/// Number of days in the (0-based) month of the given year.
///
/// # Arguments
/// * `month0` - Zero-based month index (0 = January)
/// * `year` - Calendar year
pub fn days_in_month(month0: u32, year: i32) -> Result<i64, RequestError> {
    if month0 > 11 {
        return Err(RequestError::InvalidMonth(month0));
    }
    let first = NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .ok_or_else(|| RequestError::InvalidDate(format!("{year}-{}", month0 + 1)))?;
    let next_first = if month0 == 11 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month0 + 2, 1)
    }
    .ok_or_else(|| RequestError::InvalidDate(format!("{year}-{}", month0 + 2)))?;
    Ok((next_first - first).num_days())
}

/// Expand a request into its ordered sequence of date pairs.
///
/// Fixed requests yield exactly one pair. Flexible requests enumerate
/// `start_day` in `[1, days_in_month - trip_duration]`, with the return
/// date computed by calendar arithmetic. A trip duration that does not fit
/// in the month yields an empty sequence, not an error.
pub fn expand_date_pairs(request: &SearchRequest) -> Result<Vec<DatePair>, RequestError> {
    match request {
        SearchRequest::Fixed {
            dep_date, ret_date, ..
        } => {
            if ret_date < dep_date {
                return Err(RequestError::ReturnBeforeDeparture {
                    dep: *dep_date,
                    ret: *ret_date,
                });
            }
            Ok(vec![DatePair {
                pair_id: 1,
                dep_date: *dep_date,
                ret_date: *ret_date,
            }])
        }
        SearchRequest::Flexible {
            month,
            year,
            trip_duration,
            ..
        } => {
            if *trip_duration < 1 {
                return Err(RequestError::InvalidTripDuration(*trip_duration));
            }
            let days = days_in_month(*month, *year)?;
            let last_start = days - trip_duration;
            let mut pairs = Vec::new();
            for start_day in 1..=last_start.max(0) {
                let dep_date = NaiveDate::from_ymd_opt(*year, month + 1, start_day as u32)
                    .ok_or_else(|| {
                        RequestError::InvalidDate(format!("{year}-{}-{start_day}", month + 1))
                    })?;
                let ret_date = dep_date + ChronoDuration::days(*trip_duration);
                pairs.push(DatePair {
                    pair_id: pairs.len() as u32 + 1,
                    dep_date,
                    ret_date,
                });
            }
            Ok(pairs)
        }
    }
}

/// A single flight row as extracted from a results page.
///
/// `price` is the original display string from the page; numeric comparison
/// goes through [`parse_price`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub airline: String,
    pub price: String,
    pub duration: String,
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stops: Option<String>,
    #[serde(rename = "type", default = "round_trip")]
    pub trip_type: String,
}

fn round_trip() -> String {
    "round_trip".to_string()
}

impl Flight {
    /// Numeric value of the price string, if parseable.
    #[must_use]
    pub fn parsed_price(&self) -> Option<f64> {
        parse_price(&self.price)
    }
}

/// Parse a display price ("$1,234", "CA$ 987.50", "1.234 €") into a number.
///
/// Strips everything except digits, separators, and the decimal point; a
/// trailing two-digit group after a sole separator is treated as cents.
/// Returns `None` when no digits are present.
#[must_use]
pub fn parse_price(raw: &str) -> Option<f64> {
    static DIGITS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\d[\d,.]*").expect("price regex is valid"));
    let matched = DIGITS.find(raw)?.as_str();
    // Treat commas as thousands separators; keep the last '.' as decimal.
    let cleaned: String = match matched.rfind('.') {
        Some(dot) if matched.len() - dot <= 3 => {
            let (int_part, frac) = matched.split_at(dot);
            let int_clean: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{int_clean}{frac}")
        }
        _ => matched.chars().filter(char::is_ascii_digit).collect(),
    };
    cleaned.parse().ok()
}

/// Error taxonomy for worker and request failures.
///
/// These are kinds, not error types: each terminal failure is reported to
/// the subscriber as a kind plus a human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing credentials or invalid configuration. Fatal to the request.
    Configuration,
    /// Circuit breaker rejected a session creation without calling out.
    BreakerOpen,
    /// Transient provider failure (timeout / network / 5xx).
    ProviderTransient,
    /// Permanent provider failure (auth rejection, malformed response).
    ProviderPermanent,
    /// Page load exceeded its navigation ceiling.
    NavigationTimeout,
    /// Readiness probe infrastructure failure.
    ProbeError,
    /// CAPTCHA iteration cap hit or sidecar unreachable.
    CaptchaUnsolved,
    /// LLM returned unparseable structured output.
    ExtractParse,
    /// Worker exceeded its wall deadline.
    WorkerTimeout,
    /// Any uncaught failure escaping a worker.
    Orchestrator,
}

impl FailureKind {
    /// Whether the outer per-worker retry policy should try again.
    #[must_use]
    pub fn worker_retryable(self) -> bool {
        matches!(self, Self::ProviderTransient | Self::WorkerTimeout)
    }
}

/// Terminal failure of a worker, as seen by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = serde_json::to_string(&self.kind).unwrap_or_default();
        write!(f, "{}: {}", kind.trim_matches('"'), self.message)
    }
}

/// Result of one worker's lifetime. A worker produces at most one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub pair_id: u32,
    pub dep_date: NaiveDate,
    pub ret_date: NaiveDate,
    pub flights: Vec<Flight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheapest_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<WorkerFailure>,
}

impl WorkerResult {
    /// Build a successful result, computing `cheapest_price` numerically
    /// while preserving the original display string.
    #[must_use]
    pub fn completed(pair: &DatePair, flights: Vec<Flight>) -> Self {
        let cheapest_price = flights
            .iter()
            .filter_map(|f| f.parsed_price().map(|p| (p, f.price.clone())))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, original)| original);
        Self {
            pair_id: pair.pair_id,
            dep_date: pair.dep_date,
            ret_date: pair.ret_date,
            flights,
            cheapest_price,
            failure: None,
        }
    }
}

/// Ordered collection of successful results for one request.
///
/// Insertion order is completion order; `pair_id` allows consumers to
/// reorder stably. `completed` counts successes, `processed` counts
/// successes plus final failures.
#[derive(Debug, Default)]
pub struct Aggregate {
    results: Vec<WorkerResult>,
    completed: usize,
    processed: usize,
}

impl Aggregate {
    /// Record a successful worker result.
    pub fn record_success(&mut self, result: WorkerResult) {
        self.results.push(result);
        self.completed += 1;
        self.processed += 1;
    }

    /// Record a terminal worker failure (no result retained).
    pub fn record_failure(&mut self) {
        self.processed += 1;
    }

    #[must_use]
    pub fn results(&self) -> &[WorkerResult] {
        &self.results
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.processed - self.completed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Cheapest option surfaced by an analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheapestOption {
    #[serde(default)]
    pub dep_date: Option<NaiveDate>,
    #[serde(default)]
    pub ret_date: Option<NaiveDate>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// One observed pricing trend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub observation: String,
    pub impact: String,
}

/// LLM-synthesized (or deterministically derived) digest of the aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub cheapest_option: CheapestOption,
    #[serde(default)]
    pub trends: Vec<Trend>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub is_partial: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flexible(month: u32, year: i32, trip_duration: i64) -> SearchRequest {
        SearchRequest::Flexible {
            from: "YVR".into(),
            to: "DEL".into(),
            month,
            year,
            trip_duration,
        }
    }

    #[test]
    fn fixed_request_yields_single_pair() {
        let req = SearchRequest::Fixed {
            from: "SFO".into(),
            to: "JFK".into(),
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date"),
            ret_date: NaiveDate::from_ymd_opt(2025, 6, 22).expect("valid date"),
        };
        let pairs = expand_date_pairs(&req).expect("expansion succeeds");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].pair_id, 1);
    }

    #[test]
    fn flexible_expansion_november_25_days() {
        // November 2025 has 30 days; a 25-day trip leaves start days 1..=5.
        let pairs = expand_date_pairs(&flexible(10, 2025, 25)).expect("expansion succeeds");
        assert_eq!(pairs.len(), 5);
        assert_eq!(
            pairs[0].dep_date,
            NaiveDate::from_ymd_opt(2025, 11, 1).expect("valid date")
        );
        assert_eq!(
            pairs[0].ret_date,
            NaiveDate::from_ymd_opt(2025, 11, 26).expect("valid date")
        );
        // Last return date stays inside the month here; rollover is covered below.
        assert_eq!(
            pairs[4].ret_date,
            NaiveDate::from_ymd_opt(2025, 11, 30).expect("valid date")
        );
        // pair_id is the stable 1-based enumeration index
        for (i, p) in pairs.iter().enumerate() {
            assert_eq!(p.pair_id, i as u32 + 1);
        }
    }

    #[test]
    fn flexible_expansion_count_matches_formula() {
        for (month, year, duration) in [(0u32, 2025, 7i64), (1, 2024, 14), (5, 2025, 29)] {
            let days = days_in_month(month, year).expect("valid month");
            let pairs = expand_date_pairs(&flexible(month, year, duration)).expect("expands");
            assert_eq!(pairs.len() as i64, (days - duration).max(0));
        }
    }

    #[test]
    fn trip_longer_than_month_yields_no_pairs() {
        let pairs = expand_date_pairs(&flexible(10, 2025, 30)).expect("expansion succeeds");
        assert!(pairs.is_empty());
        let pairs = expand_date_pairs(&flexible(10, 2025, 45)).expect("expansion succeeds");
        assert!(pairs.is_empty());
    }

    #[test]
    fn month_filling_trip_returns_on_the_last_day() {
        // December 2025, 30-day trip: only start day 1 fits, returning on
        // December 31. A 28-day trip in 28-day February yields zero pairs.
        let pairs = expand_date_pairs(&flexible(11, 2025, 30)).expect("expansion succeeds");
        assert_eq!(pairs.len(), 1);
        assert_eq!(
            pairs[0].ret_date,
            NaiveDate::from_ymd_opt(2025, 12, 31).expect("valid date")
        );
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert!(matches!(
            expand_date_pairs(&flexible(10, 2025, 0)),
            Err(RequestError::InvalidTripDuration(0))
        ));
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(matches!(
            days_in_month(12, 2025),
            Err(RequestError::InvalidMonth(12))
        ));
    }

    #[test]
    fn price_parsing_strips_currency_and_separators() {
        assert_eq!(parse_price("$1,234"), Some(1234.0));
        assert_eq!(parse_price("CA$ 987.50"), Some(987.5));
        assert_eq!(parse_price("1,234.56 total"), Some(1234.56));
        assert_eq!(parse_price("€450"), Some(450.0));
        assert_eq!(parse_price("free"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn cheapest_price_is_numeric_min_with_original_string() {
        let pair = DatePair {
            pair_id: 3,
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"),
            ret_date: NaiveDate::from_ymd_opt(2025, 6, 8).expect("valid date"),
        };
        let flights = vec![
            Flight {
                airline: "AC".into(),
                price: "$1,100".into(),
                duration: "9h".into(),
                route: "SFO-JFK".into(),
                stops: None,
                trip_type: "round_trip".into(),
            },
            Flight {
                airline: "UA".into(),
                price: "$980".into(),
                duration: "11h".into(),
                route: "SFO-JFK".into(),
                stops: Some("1 stop".into()),
                trip_type: "round_trip".into(),
            },
        ];
        let result = WorkerResult::completed(&pair, flights);
        // "$980" < "$1,100" numerically even though the string compare disagrees
        assert_eq!(result.cheapest_price.as_deref(), Some("$980"));
    }

    #[test]
    fn aggregate_counters_track_success_and_failure() {
        let pair = DatePair {
            pair_id: 1,
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"),
            ret_date: NaiveDate::from_ymd_opt(2025, 6, 8).expect("valid date"),
        };
        let mut agg = Aggregate::default();
        agg.record_success(WorkerResult::completed(&pair, vec![]));
        agg.record_failure();
        assert_eq!(agg.completed(), 1);
        assert_eq!(agg.processed(), 2);
        assert_eq!(agg.failed(), 1);
        assert_eq!(agg.results().len(), 1);
    }

    #[test]
    fn search_request_round_trips_through_json() {
        let json = r#"{"search_mode":"flexible","from":"YVR","to":"DEL","month":10,"year":2025,"trip_duration":25}"#;
        let req: SearchRequest = serde_json::from_str(json).expect("parses");
        assert_eq!(req.from(), "YVR");
        match req {
            SearchRequest::Flexible { month, .. } => assert_eq!(month, 10),
            SearchRequest::Fixed { .. } => panic!("expected flexible"),
        }
    }
}
