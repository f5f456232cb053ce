use serde::{Deserialize, Serialize};

use crate::protocol::error::Result;

/// How a plan schedules its invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Run once, as soon as possible.
    #[default]
    None,
    /// Run once at `plan_time`.
    Time,
    /// Repeat every `plan_value` seconds.
    Second,
    /// Repeat every `plan_value` minutes.
    Minute,
    /// Repeat every `plan_value` hours.
    Hour,
    /// Repeat every `plan_value` days.
    Day,
    /// Run on weekday `plan_value` (0 = Sunday).
    Week,
    /// Run on day `plan_value` of the month.
    Month,
}

/// A deferred invocation submitted instead of an immediate call.
///
/// Serialized as JSON into the `Plan` frame.
///
/// # Example
///
/// ```
/// use zeronet_common::protocol::plan::{PlanType, ZeroPlan};
///
/// let plan = ZeroPlan::repeat(PlanType::Minute, 5, 10).with_description("refresh cache");
/// let json = plan.to_json().unwrap();
/// assert!(json.contains("\"plan_type\":\"minute\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ZeroPlan {
    pub plan_type: PlanType,
    /// Interval or calendar value, depending on `plan_type`.
    pub plan_value: i32,
    /// Repeat count; negative means forever.
    pub plan_repet: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Run missed occurrences after a pause instead of skipping them.
    #[serde(default)]
    pub no_skip: bool,
    /// Unix timestamp (seconds) for [`PlanType::Time`] plans.
    #[serde(default)]
    pub plan_time: i64,
}

impl ZeroPlan {
    /// A one-shot plan at a unix timestamp.
    pub fn at(plan_time: i64) -> Self {
        Self {
            plan_type: PlanType::Time,
            plan_repet: 1,
            plan_time,
            ..Default::default()
        }
    }

    /// A repeating plan.
    pub fn repeat(plan_type: PlanType, plan_value: i32, plan_repet: i32) -> Self {
        Self {
            plan_type,
            plan_value,
            plan_repet,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_no_skip(mut self, no_skip: bool) -> Self {
        self.no_skip = no_skip;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
