//! Natural-language question → MongoDB aggregation pipeline.
//!
//! Classification is a keyword match over the lower-cased question,
//! evaluated against [`RULES`] in order. The first rule with a matching
//! keyword wins; a question matching nothing gets
//! [`Intent::ActiveVehicles`]. Rule order is part of the contract: "most
//! vehicles today" is a [`Intent::Today`] question, not a
//! [`Intent::Busiest`] one.
//!
//! | # | Keywords | Intent | `$limit` |
//! |---|----------|--------|----------|
//! | 1 | `last 7 days`, `past week` | [`Intent::LastWeek`] | 100 |
//! | 2 | `last 30 days`, `past month` | [`Intent::LastMonth`] | 100 |
//! | 3 | `today` | [`Intent::Today`] | 100 |
//! | 4 | `yesterday` | [`Intent::Yesterday`] | 100 |
//! | 5 | `busiest`, `most` | [`Intent::Busiest`] | 10 |
//! | 6 | `duration`, `stayed`, `longer` | [`Intent::LongStay`] | 100 |
//! | 7 | `area` | [`Intent::Area`] | 100 |
//! | – | (none) | [`Intent::ActiveVehicles`] | 50 |
//!
//! Stages are built as opaque JSON and passed through to the datastore.
//! Dates use Extended JSON (`{"$date": "<RFC 3339>"}`).

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// Duration threshold used when the question does not name one.
pub const DEFAULT_LONG_STAY_HOURS: i64 = 2;

/// Upper bound on any `$limit` stage produced here.
pub const MAX_LIMIT: u64 = 100;

static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(?:hours?|hrs?)\b").expect("hours regex is valid")
});

/// What the question is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    LastWeek,
    LastMonth,
    Today,
    Yesterday,
    Busiest,
    LongStay,
    Area,
    ActiveVehicles,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::LastWeek => "last_week",
            Intent::LastMonth => "last_month",
            Intent::Today => "today",
            Intent::Yesterday => "yesterday",
            Intent::Busiest => "busiest",
            Intent::LongStay => "long_stay",
            Intent::Area => "area",
            Intent::ActiveVehicles => "active_vehicles",
        }
    }

    /// The `$limit` this intent's pipeline ends with.
    pub fn limit(&self) -> u64 {
        match self {
            Intent::Busiest => 10,
            Intent::ActiveVehicles => 50,
            _ => MAX_LIMIT,
        }
    }

    /// Build the pipeline for this intent as of `now`.
    pub fn pipeline<Tz: TimeZone>(&self, question_lower: &str, now: &DateTime<Tz>) -> Vec<Value> {
        let now_fixed = now.fixed_offset();
        let mut stages = Vec::new();

        match self {
            Intent::LastWeek => {
                stages.push(entries_since(now_fixed - TimeDelta::days(7)));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::LastMonth => {
                stages.push(entries_since(now_fixed - TimeDelta::days(30)));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::Today => {
                stages.push(entries_since(at_local(now, start_of(now.date_naive()))));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::Yesterday => {
                let day = (now_fixed - TimeDelta::days(1)).date_naive();
                let start = at_local(now, start_of(day));
                let end = at_local(now, end_of(day));
                stages.push(json!({
                    "$match": { "entryTime": { "$gte": mongo_date(&start), "$lte": mongo_date(&end) } }
                }));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::Busiest => {
                stages.extend(join_areas());
                stages.push(json!({
                    "$group": {
                        "_id": "$area.name",
                        "count": { "$sum": 1 },
                        "area": { "$first": "$area" }
                    }
                }));
                stages.push(json!({ "$sort": { "count": -1 } }));
            }
            Intent::LongStay => {
                let threshold_ms = long_stay_hours(question_lower) * 60 * 60 * 1000;
                stages.push(json!({ "$match": { "entryTime": { "$exists": true } } }));
                stages.push(json!({
                    "$addFields": { "duration": { "$subtract": [mongo_date(&now_fixed), "$entryTime"] } }
                }));
                stages.push(json!({ "$match": { "duration": { "$gt": threshold_ms } } }));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::Area => {
                stages.extend(join_areas());
                stages.push(newest_first());
            }
            Intent::ActiveVehicles => {
                stages.push(json!({ "$match": { "isActive": true } }));
                stages.extend(join_areas());
                stages.push(newest_first());
            }
        }

        stages.push(json!({ "$limit": self.limit() }));
        stages
    }
}

/// One classification rule: any keyword present selects the intent.
#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: &'static [&'static str],
}

impl IntentRule {
    pub fn matches(&self, question_lower: &str) -> bool {
        self.keywords.iter().any(|k| question_lower.contains(k))
    }
}

/// Classification rules in evaluation order.
pub const RULES: [IntentRule; 7] = [
    IntentRule {
        intent: Intent::LastWeek,
        keywords: &["last 7 days", "past week"],
    },
    IntentRule {
        intent: Intent::LastMonth,
        keywords: &["last 30 days", "past month"],
    },
    IntentRule {
        intent: Intent::Today,
        keywords: &["today"],
    },
    IntentRule {
        intent: Intent::Yesterday,
        keywords: &["yesterday"],
    },
    IntentRule {
        intent: Intent::Busiest,
        keywords: &["busiest", "most"],
    },
    IntentRule {
        intent: Intent::LongStay,
        keywords: &["duration", "stayed", "longer"],
    },
    IntentRule {
        intent: Intent::Area,
        keywords: &["area"],
    },
];

/// A translated question, serialized in the investigate endpoint's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryIntentResult {
    #[serde(rename = "mongoQuery")]
    pub pipeline: Vec<Value>,
    /// Always `true`: the field tells clients to present the result as an
    /// assistant answer, whichever path produced it.
    #[serde(rename = "aiGenerated")]
    pub ai_generated: bool,
    #[serde(rename = "aiResponse")]
    pub explanation: String,
    #[serde(skip)]
    pub intent: Intent,
}

/// Pick the intent for a question.
pub fn classify(question: &str) -> Intent {
    let lower = question.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lower))
        .map(|rule| rule.intent)
        .unwrap_or(Intent::ActiveVehicles)
}

/// Translate a question using the local clock.
pub fn translate(question: &str) -> QueryIntentResult {
    translate_at(question, &Local::now())
}

/// Translate a question as of `now`.
pub fn translate_at<Tz: TimeZone>(question: &str, now: &DateTime<Tz>) -> QueryIntentResult {
    let lower = question.to_lowercase();
    let intent = classify(question);
    let pipeline = intent.pipeline(&lower, now);

    tracing::debug!(intent = intent.name(), stages = pipeline.len(), "question translated");

    QueryIntentResult {
        pipeline,
        ai_generated: true,
        explanation: format!("Generated MongoDB query for: {}", question),
        intent,
    }
}

fn long_stay_hours(question_lower: &str) -> i64 {
    HOURS_RE
        .captures(question_lower)
        .and_then(|c| c[1].parse::<i64>().ok())
        .filter(|h| *h <= 24 * 365)
        .unwrap_or(DEFAULT_LONG_STAY_HOURS)
}

fn join_areas() -> [Value; 2] {
    [
        json!({
            "$lookup": { "from": "areas", "localField": "areaId", "foreignField": "_id", "as": "area" }
        }),
        json!({ "$unwind": "$area" }),
    ]
}

fn newest_first() -> Value {
    json!({ "$sort": { "entryTime": -1 } })
}

fn entries_since(since: DateTime<FixedOffset>) -> Value {
    json!({ "$match": { "entryTime": { "$gte": mongo_date(&since) } } })
}

fn mongo_date(dt: &DateTime<FixedOffset>) -> Value {
    json!({ "$date": dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, false) })
}

fn start_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn end_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN))
}

/// Resolve a wall-clock time in `now`'s zone. Times skipped by a DST jump
/// fall back to `now`'s current offset.
fn at_local<Tz: TimeZone>(now: &DateTime<Tz>, naive: NaiveDateTime) -> DateTime<FixedOffset> {
    match now.timezone().from_local_datetime(&naive).earliest() {
        Some(dt) => dt.fixed_offset(),
        None => {
            let offset = now.offset().fix();
            let utc = naive - TimeDelta::seconds(offset.local_minus_utc() as i64);
            DateTime::from_naive_utc_and_offset(utc, offset)
        }
    }
}
