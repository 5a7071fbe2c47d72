//! Domain entities and the batch lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchType {
    Grain,
    Substrate,
    Bulk,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::Grain => "GRAIN",
            BatchType::Substrate => "SUBSTRATE",
            BatchType::Bulk => "BULK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GRAIN" => Some(BatchType::Grain),
            "SUBSTRATE" => Some(BatchType::Substrate),
            "BULK" => Some(BatchType::Bulk),
            _ => None,
        }
    }

    /// Readable-id prefix: `G`, `S` or `B`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            BatchType::Grain => "G",
            BatchType::Substrate => "S",
            BatchType::Bulk => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchStatus {
    Incubating,
    Ready,
    Sold,
    Contaminated,
    Archived,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Incubating => "INCUBATING",
            BatchStatus::Ready => "READY",
            BatchStatus::Sold => "SOLD",
            BatchStatus::Contaminated => "CONTAMINATED",
            BatchStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INCUBATING" => Some(BatchStatus::Incubating),
            "READY" => Some(BatchStatus::Ready),
            "SOLD" => Some(BatchStatus::Sold),
            "CONTAMINATED" => Some(BatchStatus::Contaminated),
            "ARCHIVED" => Some(BatchStatus::Archived),
            _ => None,
        }
    }

    /// Legal lifecycle transitions. SOLD may revert to INCUBATING or READY
    /// (the sales-report undo path); ARCHIVED is terminal.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Incubating, Ready)
                | (Incubating, Contaminated)
                | (Ready, Sold)
                | (Ready, Incubating)
                | (Ready, Contaminated)
                | (Ready, Archived)
                | (Sold, Archived)
                | (Sold, Incubating)
                | (Sold, Ready)
                | (Contaminated, Archived)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LcStatus {
    Active,
    Exhausted,
    Contaminated,
}

impl LcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LcStatus::Active => "ACTIVE",
            LcStatus::Exhausted => "EXHAUSTED",
            LcStatus::Contaminated => "CONTAMINATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(LcStatus::Active),
            "EXHAUSTED" => Some(LcStatus::Exhausted),
            "CONTAMINATED" => Some(LcStatus::Contaminated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub readable_id: String,
    #[serde(rename = "type")]
    pub batch_type: BatchType,
    pub status: BatchStatus,
    pub strain_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub lc_batch: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub sold_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strain {
    pub id: i64,
    pub name: String,
    pub colonization_days: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidCulture {
    pub id: i64,
    pub readable_id: String,
    pub strain_id: Option<i64>,
    pub strain_name: Option<String>,
    pub status: LcStatus,
    pub volume_ml: Option<f64>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit row. Written on batch creation and every status change,
/// never updated; removed only by the cascade when its batch is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub batch_id: i64,
    pub action_type: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
