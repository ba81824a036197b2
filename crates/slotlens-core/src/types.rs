//! Core domain types for SlotLens.
//!
//! These types mirror the wire schema of the booking back end: camelCase
//! JSON field names, SCREAMING_SNAKE_CASE tags for the closed sum types,
//! and opaque string identifiers scoped per entity kind.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares an opaque string identifier newtype for one entity kind.
///
/// Fresh ids are uuid-v4 strings; any string round-trips so that ids
/// minted elsewhere (fixtures, an external booking UI) stay usable.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a practice.
    PracticeId
);
string_id!(
    /// Unique identifier for a rule set (one version of a practice's configuration).
    RuleSetId
);
string_id!(
    /// Unique identifier for a practitioner.
    PractitionerId
);
string_id!(
    /// Unique identifier for a location.
    LocationId
);
string_id!(
    /// Unique identifier for an appointment type.
    AppointmentTypeId
);
string_id!(
    /// Unique identifier for a base schedule row.
    BaseScheduleId
);
string_id!(
    /// Unique identifier for a rule node (root or condition node).
    RuleNodeId
);
string_id!(
    /// Unique identifier for an appointment.
    AppointmentId
);

/// A wall-clock time of day with minute precision, the "HH:MM" wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    /// Builds a time of day from hours and minutes. Returns `None` for
    /// values outside 00:00..=23:59.
    pub fn new(hours: u16, minutes: u16) -> Option<Self> {
        if hours > 23 || minutes > 59 {
            return None;
        }
        Some(Self(hours * 60 + minutes))
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes >= 24 * 60 {
            return None;
        }
        Some(Self(minutes))
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {s:?}"))?;
        let hours: u16 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minutes: u16 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        Self::new(hours, minutes).ok_or_else(|| format!("time out of range: {s:?}"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Root of ownership: a single medical practice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Practice {
    pub id: PracticeId,
    pub name: String,
    /// Points at the saved rule set currently used for production booking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_active_rule_set_id: Option<RuleSetId>,
}

/// One version of a practice's scheduling configuration.
///
/// Saved rule sets are immutable; at most one unsaved draft exists per
/// practice. `parent_version` links the version DAG and always points at a
/// saved set (or is `None` for the initial version).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub id: RuleSetId,
    pub practice_id: PracticeId,
    pub version: u32,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<RuleSetId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Practitioner {
    pub id: PractitionerId,
    pub practice_id: PracticeId,
    pub rule_set_id: RuleSetId,
    /// The entity this row was deep-copied from in the parent rule set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PractitionerId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    pub practice_id: PracticeId,
    pub rule_set_id: RuleSetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<LocationId>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentType {
    pub id: AppointmentTypeId,
    pub practice_id: PracticeId,
    pub rule_set_id: RuleSetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AppointmentTypeId>,
    pub name: String,
    pub duration_minutes: u32,
    /// Non-empty; every member belongs to the same rule set as this row.
    pub allowed_practitioner_ids: BTreeSet<PractitionerId>,
}

/// A pause inside a base schedule's working window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakTime {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

/// A weekly recurring working window for one practitioner at one location.
///
/// `day_of_week` uses 0 = Sunday .. 6 = Saturday, matching the string
/// values of the DAY_OF_WEEK condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaseSchedule {
    pub id: BaseScheduleId,
    pub practice_id: PracticeId,
    pub rule_set_id: RuleSetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BaseScheduleId>,
    pub practitioner_id: PractitionerId,
    pub location_id: LocationId,
    pub day_of_week: u8,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub break_times: Vec<BreakTime>,
}

/// Node kind of a stored condition-tree node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "NOT")]
    Not,
    #[serde(rename = "CONDITION")]
    Condition,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Not => "NOT",
            Self::Condition => "CONDITION",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed taxonomy of leaf condition kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    Practitioner,
    Location,
    AppointmentType,
    PractitionerTag,
    ClientType,
    DayOfWeek,
    DateRange,
    TimeRange,
    DaysAhead,
    ConcurrentCount,
    DailyCapacity,
}

impl ConditionType {
    pub const ALL: [Self; 11] = [
        Self::Practitioner,
        Self::Location,
        Self::AppointmentType,
        Self::PractitionerTag,
        Self::ClientType,
        Self::DayOfWeek,
        Self::DateRange,
        Self::TimeRange,
        Self::DaysAhead,
        Self::ConcurrentCount,
        Self::DailyCapacity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Practitioner => "PRACTITIONER",
            Self::Location => "LOCATION",
            Self::AppointmentType => "APPOINTMENT_TYPE",
            Self::PractitionerTag => "PRACTITIONER_TAG",
            Self::ClientType => "CLIENT_TYPE",
            Self::DayOfWeek => "DAY_OF_WEEK",
            Self::DateRange => "DATE_RANGE",
            Self::TimeRange => "TIME_RANGE",
            Self::DaysAhead => "DAYS_AHEAD",
            Self::ConcurrentCount => "CONCURRENT_COUNT",
            Self::DailyCapacity => "DAILY_CAPACITY",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a leaf condition; compatibility with the
/// condition type is enforced by the validator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Is,
    IsNot,
    Equals,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl ConditionOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Is => "IS",
            Self::IsNot => "IS_NOT",
            Self::Equals => "EQUALS",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation scope for CONCURRENT_COUNT and DAILY_CAPACITY.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionScope {
    PerPractitioner,
    Global,
}

impl ConditionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerPractitioner => "per-practitioner",
            Self::Global => "global",
        }
    }
}

/// One stored row of a condition tree.
///
/// A *rule* is the subtree under an `is_root = true` row; the root carries
/// `enabled` and owns exactly one child (the actual tree root). Non-root
/// rows carry `node_type`, and CONDITION leaves additionally carry the
/// condition payload. `value_ids` stays an untyped string sequence whose
/// interpretation depends on `condition_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleNode {
    pub id: RuleNodeId,
    pub practice_id: PracticeId,
    pub rule_set_id: RuleSetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_condition_id: Option<RuleNodeId>,
    pub child_order: u32,
    pub is_root: bool,
    /// The rule's origin in the parent rule set, if this set was forked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_from_id: Option<RuleNodeId>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<ConditionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ConditionOperator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ConditionScope>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// A booked appointment. Read-only to the engine; only the aggregate
/// conditions (CONCURRENT_COUNT, DAILY_CAPACITY) look at these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub practice_id: PracticeId,
    pub practitioner_id: PractitionerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_type_id: Option<AppointmentTypeId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_simulation: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Blocked,
}

/// A candidate appointment-time window produced by the generator.
///
/// Starts out AVAILABLE; the evaluator flips it to BLOCKED and records the
/// first root rule whose tree evaluated true for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub practitioner_id: PractitionerId,
    pub location_id: LocationId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by_rule_id: Option<RuleNodeId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientContext {
    pub is_new: bool,
}

/// The booking request context evaluated alongside each candidate slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingContext {
    pub patient: PatientContext,
    /// Mandatory: determines the slot duration.
    pub appointment_type_id: AppointmentTypeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_simulation: bool,
}

/// An inclusive range of practice-local civil dates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Iterates the contained dates in ascending order (inclusive).
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let start = self.start;
        let end = self.end;
        start
            .iter_days()
            .take_while(move |d| *d <= end)
    }
}
