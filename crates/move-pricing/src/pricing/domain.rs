use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier wrapper for pricing rules. Caller-assigned, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed rule taxonomy. Every mapping over categories must match exhaustively
/// so a new category is a compile error, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    BasePricing,
    CrewAdjustments,
    WeightVolume,
    Distance,
    Timing,
    SpecialItems,
    LocationHandicaps,
    AdditionalServices,
}

impl RuleCategory {
    pub const fn label(self) -> &'static str {
        match self {
            RuleCategory::BasePricing => "base_pricing",
            RuleCategory::CrewAdjustments => "crew_adjustments",
            RuleCategory::WeightVolume => "weight_volume",
            RuleCategory::Distance => "distance",
            RuleCategory::Timing => "timing",
            RuleCategory::SpecialItems => "special_items",
            RuleCategory::LocationHandicaps => "location_handicaps",
            RuleCategory::AdditionalServices => "additional_services",
        }
    }
}

/// Service types an estimate can be requested for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    LocalMove,
    LongDistanceMove,
    OfficeMove,
    PackingOnly,
    StorageMove,
}

impl ServiceType {
    pub const fn label(self) -> &'static str {
        match self {
            ServiceType::LocalMove => "local_move",
            ServiceType::LongDistanceMove => "long_distance_move",
            ServiceType::OfficeMove => "office_move",
            ServiceType::PackingOnly => "packing_only",
            ServiceType::StorageMove => "storage_move",
        }
    }
}

/// Comparison operators available to rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl ConditionOperator {
    /// Set operators compare against `values` rather than a single `value`.
    pub const fn requires_values(self) -> bool {
        matches!(self, ConditionOperator::In | ConditionOperator::NotIn)
    }

    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            ConditionOperator::Gt
                | ConditionOperator::Gte
                | ConditionOperator::Lt
                | ConditionOperator::Lte
        )
    }

    pub const fn is_textual(self) -> bool {
        matches!(
            self,
            ConditionOperator::Contains
                | ConditionOperator::StartsWith
                | ConditionOperator::EndsWith
        )
    }
}

/// Closed operand type for condition comparisons. Keeping this tagged lets the
/// validator reject impossible operator/operand pairings up front instead of
/// discovering them mid-calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Flag(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
    List(Vec<ConditionValue>),
}

impl ConditionValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            ConditionValue::Flag(_) => "boolean",
            ConditionValue::Number(_) => "number",
            ConditionValue::Date(_) => "date",
            ConditionValue::Text(_) => "text",
            ConditionValue::List(_) => "list",
        }
    }
}

/// One predicate over the input context. All conditions on a rule must match
/// (logical AND) for the rule to fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ConditionValue>>,
}

/// Deterministic mutations a matched rule applies to the calculation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddFixed,
    AddPercentage,
    SubtractFixed,
    SubtractPercentage,
    Multiply,
    SetFixed,
    SetPercentage,
}

/// One accumulator mutation, applied in list order when the owning rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub amount: f64,
    pub target_field: String,
    #[serde(default)]
    pub description: String,
    /// Optional intra-rule guard of the shape `"<field> <op> <literal>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Three-part monotonically increasing rule version, serialized as `"x.y.z"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuleVersion {
    pub const fn initial() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }

    pub const fn bump_patch(self) -> Self {
        Self {
            patch: self.patch + 1,
            ..self
        }
    }
}

impl fmt::Display for RuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("rule version must have the shape x.y.z, found '{0}'")]
pub struct RuleVersionParseError(pub String);

impl FromStr for RuleVersion {
    type Err = RuleVersionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.splitn(3, '.');
        let mut component = || {
            parts
                .next()
                .and_then(|part| part.parse::<u32>().ok())
                .ok_or_else(|| RuleVersionParseError(raw.to_string()))
        };
        let major = component()?;
        let minor = component()?;
        let patch = component()?;
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl Serialize for RuleVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Operator identity attached to administrative changes for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_name: "system".to_string(),
        }
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::system()
    }
}

/// The unit of pricing logic: a named, versioned condition/action pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub category: RuleCategory,
    pub priority: u16,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub is_active: bool,
    pub applicable_services: BTreeSet<ServiceType>,
    pub version: RuleVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Whether the validity window covers `as_of`. A rule outside its window
    /// never matches regardless of conditions.
    pub fn window_covers(&self, as_of: NaiveDate) -> bool {
        if let Some(effective) = self.effective_date {
            if as_of < effective {
                return false;
            }
        }
        if let Some(expiry) = self.expiry_date {
            if as_of > expiry {
                return false;
            }
        }
        true
    }

    /// Screening filter applied before any condition is evaluated.
    pub fn applies_to(&self, service: ServiceType, as_of: NaiveDate) -> bool {
        self.is_active
            && self.deleted_at.is_none()
            && self.applicable_services.contains(&service)
            && self.window_covers(as_of)
    }
}

/// Authoring payload for a new rule; the service stamps version and audit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub category: RuleCategory,
    pub priority: u16,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub applicable_services: BTreeSet<ServiceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

impl RuleDraft {
    pub fn into_rule(self, actor: &Actor, now: DateTime<Utc>) -> Rule {
        Rule {
            id: self.id,
            name: self.name,
            description: self.description,
            notes: self.notes,
            category: self.category,
            priority: self.priority,
            conditions: self.conditions,
            actions: self.actions,
            is_active: self.is_active,
            applicable_services: self.applicable_services,
            version: RuleVersion::initial(),
            effective_date: self.effective_date,
            expiry_date: self.expiry_date,
            deleted_at: None,
            created_by: actor.user_id.clone(),
            updated_by: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update payload; absent fields keep their current value. Activation
/// state is toggled through its own lifecycle operation, not through updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicable_services: Option<BTreeSet<ServiceType>>,
    /// An absent field keeps the current date; an explicit `null` clears it.
    #[serde(
        default,
        deserialize_with = "clearable_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "clearable_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_date: Option<Option<NaiveDate>>,
}

// Wraps the parsed value one level so a present-but-null field survives
// deserialization instead of collapsing into "absent".
fn clearable_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NaiveDate>::deserialize(deserializer).map(Some)
}

/// Seasonal demand period resolved before evaluation begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalPeriod {
    Low,
    #[default]
    Standard,
    Peak,
}

impl SeasonalPeriod {
    pub const fn label(self) -> &'static str {
        match self {
            SeasonalPeriod::Low => "low",
            SeasonalPeriod::Standard => "standard",
            SeasonalPeriod::Peak => "peak",
        }
    }
}

/// Qualitative access rating for a pickup or delivery address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDifficulty {
    #[default]
    Easy,
    Moderate,
    Hard,
}

impl AccessDifficulty {
    pub const fn label(self) -> &'static str {
        match self {
            AccessDifficulty::Easy => "easy",
            AccessDifficulty::Moderate => "moderate",
            AccessDifficulty::Hard => "hard",
        }
    }
}

/// Access descriptors for one address involved in the move.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessProfile {
    #[serde(default)]
    pub floor_level: u8,
    #[serde(default)]
    pub has_elevator: bool,
    #[serde(default)]
    pub stairs_count: u16,
    #[serde(default)]
    pub access_difficulty: AccessDifficulty,
    #[serde(default)]
    pub narrow_hallways: bool,
}

impl AccessProfile {
    fn resolve(&self, field: &str) -> Option<ConditionValue> {
        match field {
            "floorLevel" => Some(ConditionValue::Number(f64::from(self.floor_level))),
            "hasElevator" => Some(ConditionValue::Flag(self.has_elevator)),
            "stairsCount" => Some(ConditionValue::Number(f64::from(self.stairs_count))),
            "accessDifficulty" => Some(ConditionValue::Text(
                self.access_difficulty.label().to_string(),
            )),
            "narrowHallways" => Some(ConditionValue::Flag(self.narrow_hallways)),
            _ => None,
        }
    }
}

/// The fully-resolved factual basis for one price calculation. Every field is
/// derived from caller-supplied data before evaluation; nothing here reads
/// wall-clock state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputContext {
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub move_date: NaiveDate,
    #[serde(default)]
    pub base_price: f64,
    #[serde(default)]
    pub base_labor_cost: f64,
    #[serde(default)]
    pub total_weight_kg: f64,
    #[serde(default)]
    pub total_volume_m3: f64,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub crew_size: u8,
    #[serde(default)]
    pub is_weekend: bool,
    #[serde(default)]
    pub is_holiday: bool,
    #[serde(default)]
    pub season: SeasonalPeriod,
    #[serde(default)]
    pub special_items: BTreeMap<String, u32>,
    #[serde(default)]
    pub pickup_access: AccessProfile,
    #[serde(default)]
    pub delivery_access: AccessProfile,
}

impl InputContext {
    /// Walk a dot-addressed path into the context. A missing path yields
    /// `None`, which is itself a legitimate comparison operand.
    pub fn resolve(&self, path: &str) -> Option<ConditionValue> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match (head, rest) {
            ("serviceType", None) => {
                Some(ConditionValue::Text(self.service_type.label().to_string()))
            }
            ("moveDate", None) => Some(ConditionValue::Date(self.move_date)),
            ("basePrice", None) => Some(ConditionValue::Number(self.base_price)),
            ("baseLaborCost", None) => Some(ConditionValue::Number(self.base_labor_cost)),
            ("totalWeightKg", None) => Some(ConditionValue::Number(self.total_weight_kg)),
            ("totalVolumeM3", None) => Some(ConditionValue::Number(self.total_volume_m3)),
            ("distanceKm", None) => Some(ConditionValue::Number(self.distance_km)),
            ("crewSize", None) => Some(ConditionValue::Number(f64::from(self.crew_size))),
            ("isWeekend", None) => Some(ConditionValue::Flag(self.is_weekend)),
            ("isHoliday", None) => Some(ConditionValue::Flag(self.is_holiday)),
            ("season", None) => Some(ConditionValue::Text(self.season.label().to_string())),
            ("specialItems", Some(item)) => self
                .special_items
                .get(item)
                .map(|count| ConditionValue::Number(f64::from(*count))),
            ("pickupAccess", Some(field)) => self.pickup_access.resolve(field),
            ("deliveryAccess", Some(field)) => self.delivery_access.resolve(field),
            _ => None,
        }
    }
}

/// Contribution of one matched rule to the estimate, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    pub rule_id: RuleId,
    pub price_impact: f64,
}

/// One executed action with its resulting delta, kept for tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedAction {
    pub target_field: String,
    pub description: String,
    pub delta: f64,
}

/// Provenance block proving the calculation is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationMetadata {
    pub calculated_at: DateTime<Utc>,
    pub deterministic: bool,
    pub verification_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Frozen output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub applied_rules: Vec<AppliedRule>,
    pub totals: BTreeMap<String, f64>,
    pub metadata: CalculationMetadata,
}

impl CalculationResult {
    pub fn total(&self, field: &str) -> f64 {
        self.totals.get(field).copied().unwrap_or(0.0)
    }
}

/// Lifecycle transitions recorded in the append-only history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
    Activated,
    Deactivated,
    Imported,
    Exported,
}

/// Old/new pair for one changed field in an update diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Append-only audit record; never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub rule_id: RuleId,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, FieldChange>,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Named snapshot of the active rule set, taken before destructive bulk replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBackup {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub rule_count: usize,
    pub rules: Vec<Rule>,
}

/// Format version written into export documents.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Portable document round-tripping the whole rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub rules_count: usize,
    pub rules: Vec<Rule>,
}
