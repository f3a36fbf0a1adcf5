use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use super::errors::PipelineError;

/// The five workflow stages, in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Orders,
    Call,
    Booking,
    Archive,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Pending,
        Stage::Orders,
        Stage::Call,
        Stage::Booking,
        Stage::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Orders => "orders",
            Stage::Call => "call",
            Stage::Booking => "booking",
            Stage::Archive => "archive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Stage::Pending),
            "orders" => Ok(Stage::Orders),
            "call" => Ok(Stage::Call),
            "booking" => Ok(Stage::Booking),
            "archive" => Ok(Stage::Archive),
            other => Err(PipelineError::Validation {
                reason: format!("Unknown stage '{other}'"),
            }),
        }
    }
}

/// Per-part procurement status. A VIN group promotes only when every member
/// is `Arrived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    Pending,
    Ordered,
    Backordered,
    Arrived,
}

impl PartStatus {
    pub const ALL: [PartStatus; 4] = [
        PartStatus::Pending,
        PartStatus::Ordered,
        PartStatus::Backordered,
        PartStatus::Arrived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartStatus::Pending => "Pending",
            PartStatus::Ordered => "Ordered",
            PartStatus::Backordered => "Backordered",
            PartStatus::Arrived => "Arrived",
        }
    }
}

impl fmt::Display for PartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PartStatus::Pending),
            "ordered" => Ok(PartStatus::Ordered),
            "backordered" => Ok(PartStatus::Backordered),
            "arrived" => Ok(PartStatus::Arrived),
            other => Err(PipelineError::Validation {
                reason: format!("Unknown part status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairType {
    Warranty,
    CustomerPay,
    Internal,
}

impl fmt::Display for RepairType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairType::Warranty => "warranty",
            RepairType::CustomerPay => "customer-pay",
            RepairType::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl FromStr for RepairType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warranty" => Ok(RepairType::Warranty),
            "customer-pay" | "customer_pay" | "customerpay" => Ok(RepairType::CustomerPay),
            "internal" => Ok(RepairType::Internal),
            other => Err(PipelineError::Validation {
                reason: format!("Unknown repair type '{other}'"),
            }),
        }
    }
}

/// Grouping key for VIN aggregation: trimmed and case-folded.
pub fn normalize_vin(vin: &str) -> String {
    vin.trim().to_ascii_uppercase()
}

// 17 characters from the VIN alphabet (no I, O, Q).
fn vin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-HJ-NPR-Z0-9]{17}$").unwrap())
}

/// Warranty repairs are not offered at or above this odometer reading.
pub const WARRANTY_MILEAGE_LIMIT: u32 = 100_000;

/// One service order, or one part-line of a multi-part order. Several
/// records sharing a VIN within a stage form a VIN group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub vin: String,
    pub customer_name: String,
    pub part_status: PartStatus,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_type: Option<RepairType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl OrderRecord {
    pub fn new(vin: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vin: vin.into(),
            customer_name: customer_name.into(),
            part_status: PartStatus::Pending,
            stage: Stage::Pending,
            mileage: None,
            repair_type: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: PartStatus) -> Self {
        self.part_status = status;
        self
    }

    pub fn with_mileage(mut self, mileage: u32) -> Self {
        self.mileage = Some(mileage);
        self
    }

    pub fn with_repair_type(mut self, repair_type: RepairType) -> Self {
        self.repair_type = Some(repair_type);
        self
    }

    /// Schema and domain rules, checked before any mutation is applied.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.customer_name.trim().is_empty() {
            return Err(PipelineError::Validation {
                reason: "Customer name must not be empty".to_string(),
            });
        }
        let vin = normalize_vin(&self.vin);
        if !vin_pattern().is_match(&vin) {
            return Err(PipelineError::Validation {
                reason: format!(
                    "VIN '{}' must be 17 characters (letters except I/O/Q, digits)",
                    self.vin.trim()
                ),
            });
        }
        if let (Some(mileage), Some(RepairType::Warranty)) = (self.mileage, self.repair_type) {
            if mileage >= WARRANTY_MILEAGE_LIMIT {
                return Err(PipelineError::Validation {
                    reason: format!(
                        "Warranty repair not available at {mileage} miles (limit {WARRANTY_MILEAGE_LIMIT})"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Optional-field merge patch for `StageRegistry::update`. Absent fields
/// leave the record untouched; metadata entries are merged key by key.
/// A record's stage is never patched, only moved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    pub vin: Option<String>,
    pub customer_name: Option<String>,
    pub part_status: Option<PartStatus>,
    pub mileage: Option<u32>,
    pub repair_type: Option<RepairType>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RecordPatch {
    pub fn status(status: PartStatus) -> Self {
        Self {
            part_status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_vin(mut self, vin: impl Into<String>) -> Self {
        self.vin = Some(vin.into());
        self
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: PartStatus) -> Self {
        self.part_status = Some(status);
        self
    }

    pub fn with_mileage(mut self, mileage: u32) -> Self {
        self.mileage = Some(mileage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vin.is_none()
            && self.customer_name.is_none()
            && self.part_status.is_none()
            && self.mileage.is_none()
            && self.repair_type.is_none()
            && self.metadata.is_empty()
    }

    pub fn apply(&self, record: &mut OrderRecord) {
        if let Some(vin) = &self.vin {
            record.vin = vin.clone();
        }
        if let Some(name) = &self.customer_name {
            record.customer_name = name.clone();
        }
        if let Some(status) = self.part_status {
            record.part_status = status;
        }
        if let Some(mileage) = self.mileage {
            record.mileage = Some(mileage);
        }
        if let Some(repair_type) = self.repair_type {
            record.repair_type = Some(repair_type);
        }
        for (key, value) in &self.metadata {
            record.metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Canned customer-message template carried in the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsTemplate {
    pub name: String,
    pub body: String,
}

/// Presentation-surface entry appended when the watcher promotes a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub moved: Vec<String>,
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, moved: Vec<String>, actor: Option<String>) -> Self {
        Self {
            message: message.into(),
            moved,
            actor,
            timestamp: Utc::now(),
        }
    }
}
