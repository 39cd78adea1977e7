//! # Domain Types
//!
//! Core domain types for the Fastag ERP inventory engine.
//!
//! ## Unit Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       FASTag Unit Lifecycle                             │
//! │                                                                         │
//! │                 transfer                 mark sold / correct            │
//! │   ┌──────────┐ ─────────► ┌──────────┐ ─────────► ┌──────────┐         │
//! │   │ in_stock │            │ assigned │            │   sold   │         │
//! │   └──────────┘ ◄───────── └──────────┘            └──────────┘         │
//! │        ▲        to admin        │ re-transfer          │               │
//! │        │                        └──► (new agent)       │               │
//! │        └────────────────────────────────────────────────┘               │
//! │                       revoke (latest ledger row deleted)               │
//! │                                                                         │
//! │   ┌─────────────┐                                                       │
//! │   │ deactivated │ ◄── terminal non-sale end state                      │
//! │   └─────────────┘                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Units are identified by `tag_serial` (the physical barcode). The sales
//! ledger joins on the serial string rather than a surrogate foreign key so
//! that sale corrections can re-point ledger rows between serials.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// =============================================================================
// Unit Status
// =============================================================================

/// The status of an inventory unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Warehouse-held, no agent owner.
    InStock,
    /// Held by exactly one agent.
    Assigned,
    /// Sold; seller recorded in the sales ledger.
    Sold,
    /// Terminal non-sale end state.
    Deactivated,
}

impl UnitStatus {
    /// Returns the storage representation of the status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::InStock => "in_stock",
            UnitStatus::Assigned => "assigned",
            UnitStatus::Sold => "sold",
            UnitStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in_stock" => Ok(UnitStatus::InStock),
            "assigned" => Ok(UnitStatus::Assigned),
            "sold" => Ok(UnitStatus::Sold),
            "deactivated" => Ok(UnitStatus::Deactivated),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        UnitStatus::InStock
    }
}

// =============================================================================
// Bank Mapping Status
// =============================================================================

/// Whether a unit has been registered in the issuing bank's own system.
/// Independent of physical custody: an assigned unit may still be `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BankMappingStatus {
    Pending,
    Done,
}

impl BankMappingStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BankMappingStatus::Pending => "pending",
            BankMappingStatus::Done => "done",
        }
    }
}

impl fmt::Display for BankMappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Purchase Terms
// =============================================================================

/// Payment terms a unit was purchased under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseTerms {
    Credit,
    Paid,
}

// =============================================================================
// Owner Reference
// =============================================================================

/// A transfer endpoint: either the warehouse ("admin" sentinel) or a numeric
/// agent id.
///
/// ## Example
/// ```rust
/// use fastag_core::OwnerRef;
///
/// assert_eq!("admin".parse::<OwnerRef>().unwrap(), OwnerRef::Admin);
/// assert_eq!("7".parse::<OwnerRef>().unwrap(), OwnerRef::Agent(7));
/// assert!("warehouse".parse::<OwnerRef>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerRef {
    /// Warehouse stock (no agent owner).
    Admin,
    /// A specific agent-tier user.
    Agent(i64),
}

impl OwnerRef {
    /// Returns the agent id, or None for the warehouse.
    pub fn agent_id(&self) -> Option<i64> {
        match self {
            OwnerRef::Admin => None,
            OwnerRef::Agent(id) => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, OwnerRef::Admin)
    }

    /// Role label recorded on audit rows.
    pub const fn role_label(&self) -> &'static str {
        match self {
            OwnerRef::Admin => "admin",
            OwnerRef::Agent(_) => "agent",
        }
    }

    /// Parses an owner field, naming the field in the error.
    pub fn parse_field(field: &str, value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::required(field));
        }
        if value.eq_ignore_ascii_case("admin") {
            return Ok(OwnerRef::Admin);
        }
        value
            .parse::<i64>()
            .map(OwnerRef::Agent)
            .map_err(|_| ValidationError::InvalidOwner {
                field: field.to_string(),
                value: value.to_string(),
            })
    }
}

impl FromStr for OwnerRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OwnerRef::parse_field("owner", s)
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::Admin => f.write_str("admin"),
            OwnerRef::Agent(id) => write!(f, "{id}"),
        }
    }
}

impl TryFrom<String> for OwnerRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerRef> for String {
    fn from(value: OwnerRef) -> Self {
        value.to_string()
    }
}

// =============================================================================
// Inventory Unit
// =============================================================================

/// One physical FASTag, tracked by serial.
///
/// Ownership exclusivity: at most one of `assigned_to_agent_id` (agent-tier
/// owner) and `assigned_to` (end-user owner) is non-null at any time, and a
/// sold unit has both cleared. The seller of a sold unit lives in the sales
/// ledger; `sold_by_user_id` here is only a best-effort mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FastagUnit {
    pub id: i64,

    /// Unique barcode string.
    pub tag_serial: String,

    pub bank_name: String,
    pub fastag_class: String,
    pub batch_number: Option<String>,

    /// Owning supplier.
    pub supplier_id: Option<i64>,

    /// Purchase price in paise.
    pub purchase_price: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_type: Option<PurchaseTerms>,

    pub status: UnitStatus,

    /// Agent-tier owner while `status = assigned`.
    pub assigned_to_agent_id: Option<i64>,

    /// End-user owner, only set once the sold path attributes to a user id.
    pub assigned_to: Option<i64>,

    pub assigned_date: Option<NaiveDate>,
    pub assigned_at: Option<DateTime<Utc>>,

    /// None when the deployment's schema predates mapping tracking.
    pub bank_mapping_status: Option<BankMappingStatus>,
    pub bank_login_user_id: Option<i64>,

    /// Last-known seller; the ledger is authoritative.
    pub sold_by_user_id: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FastagUnit {
    /// True once the unit is registered in the issuing bank's system.
    pub fn mapping_done(&self) -> bool {
        self.bank_mapping_status == Some(BankMappingStatus::Done)
    }

    /// The prior owner a sale falls back to when no explicit seller is given:
    /// the end-user owner wins over the agent-tier owner.
    pub fn seller_fallback(&self) -> Option<i64> {
        self.assigned_to.or(self.assigned_to_agent_id)
    }
}

/// Input for unit intake: a new unit entering the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUnit {
    pub tag_serial: String,
    pub bank_name: String,
    pub fastag_class: String,
    pub batch_number: Option<String>,
    pub supplier_id: Option<i64>,
    pub purchase_price: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_type: Option<PurchaseTerms>,
}

// =============================================================================
// Sale Ledger Entry
// =============================================================================

/// One sale event for a serial.
///
/// Bank, class and supplier are frozen copies taken from the unit at sale
/// time (snapshot pattern): later unit edits never rewrite sale history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    pub id: i64,
    pub tag_serial: String,

    /// Customer service case that produced the sale, if any.
    pub ticket_id: Option<i64>,
    pub vehicle_reg_no: Option<String>,

    pub bank_name: Option<String>,
    pub fastag_class: Option<String>,
    pub supplier_id: Option<i64>,

    pub sold_by_user_id: Option<i64>,
    pub sold_by_agent_id: Option<i64>,

    pub payment_to_collect: Option<i64>,
    pub payment_to_send: Option<i64>,
    pub net_value: Option<i64>,
    pub commission_amount: Option<i64>,

    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// The node a ledger row credits: the user-facing seller id wins, the
    /// agent id is the fallback.
    pub fn credited_to(&self) -> Option<i64> {
        self.sold_by_user_id.or(self.sold_by_agent_id)
    }
}

/// Financial fields carried on a ticket-driven sale. All amounts in paise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleFinancials {
    pub payment_to_collect: Option<i64>,
    pub payment_to_send: Option<i64>,
    pub net_value: Option<i64>,
    pub commission_amount: Option<i64>,
}

// =============================================================================
// Agent Node
// =============================================================================

/// A user record participating in the distribution hierarchy.
///
/// `role` stays a raw string here: legacy rows carry shorthands like "tl",
/// use [`AgentRole::parse`] when classification matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AgentNode {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub parent_user_id: Option<i64>,
}

/// Distribution-hierarchy roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Admin,
    Asm,
    Manager,
    TeamLeader,
    Shop,
    Showroom,
    Agent,
    TollAgent,
    Executive,
    ChannelPartner,
    Fse,
    Office,
}

impl AgentRole {
    /// Lenient parse accepting legacy shorthands ("tl" for team-leader).
    pub fn parse(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(AgentRole::Admin),
            "asm" => Some(AgentRole::Asm),
            "manager" => Some(AgentRole::Manager),
            "team-leader" | "tl" => Some(AgentRole::TeamLeader),
            "shop" => Some(AgentRole::Shop),
            "showroom" => Some(AgentRole::Showroom),
            "agent" => Some(AgentRole::Agent),
            "toll-agent" => Some(AgentRole::TollAgent),
            "executive" => Some(AgentRole::Executive),
            "channel-partner" => Some(AgentRole::ChannelPartner),
            "fse" => Some(AgentRole::Fse),
            "office" => Some(AgentRole::Office),
            _ => None,
        }
    }
}

// =============================================================================
// Transfer Audit Record
// =============================================================================

/// One row per unit per transfer operation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferRecord {
    /// UUID v4.
    pub id: String,
    pub tag_serial: String,
    pub from_role: String,
    pub from_user_id: Option<i64>,
    pub to_role: String,
    pub to_user_id: Option<i64>,
    pub bank_name: Option<String>,
    pub fastag_class: Option<String>,
    pub batch_number: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Engine Inputs & Outcomes
// =============================================================================

/// One entry of a bulk transfer call: move the listed serials between owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// "admin" or a numeric agent id.
    pub from_owner: String,
    /// "admin" or a numeric agent id.
    pub to_owner: String,
    pub tag_serials: Vec<String>,
    pub note: Option<String>,
}

/// Filters for the available-units query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableUnitsFilter {
    pub bank_name: String,
    pub fastag_class: String,
    pub supplier_id: Option<i64>,
    /// Restrict to warehouse stock (`Admin`) or one agent's stock.
    pub owner: Option<OwnerRef>,
    pub mapping_status: Option<BankMappingStatus>,
    /// Free-text serial substring.
    pub serial_contains: Option<String>,
    /// Capped at [`crate::MAX_AVAILABLE_UNITS_LIMIT`].
    pub limit: Option<u32>,
}

/// Result of a single class+batch scoped transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transferred_serials: Vec<String>,
}

impl TransferOutcome {
    pub fn transferred(&self) -> u64 {
        self.transferred_serials.len() as u64
    }
}

/// Per-entry result of a bulk transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTransferAssignment {
    pub from_owner: OwnerRef,
    pub to_owner: OwnerRef,
    pub tag_serials: Vec<String>,
}

/// Result of a bulk transfer call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTransferOutcome {
    pub assigned_units: Vec<BulkTransferAssignment>,
}

impl BulkTransferOutcome {
    pub fn total_transferred(&self) -> u64 {
        self.assigned_units
            .iter()
            .map(|a| a.tag_serials.len() as u64)
            .sum()
    }
}

/// Counts returned by the ledger backfill job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSummary {
    pub inserted_from_tickets: u64,
    pub inserted_from_units: u64,
}

// =============================================================================
// Reference Data
// =============================================================================

/// A bank reference row (read-only dimension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Bank {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
