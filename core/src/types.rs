//! Domain types for race slot registration.
//!
//! Inventory is a single finite dimension, `(size, gender)`. A registration
//! group holds one unit of that inventory per runner, first as a reversible
//! hold and then, once paid, as an assignment.

use crate::gateway::GatewayErrorCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Inventory dimension
// ============================================================================

/// A value outside one of the closed enumerations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enumeration was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// Shirt size of a race slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Size {
    /// Extra small
    #[serde(rename = "XS")]
    Xs,
    /// Small
    S,
    /// Medium
    M,
    /// Large
    L,
    /// Extra large
    #[serde(rename = "XL")]
    Xl,
    /// Double extra large
    #[serde(rename = "XXL")]
    Xxl,
}

impl Size {
    /// Every supported size, smallest first.
    pub const ALL: [Self; 6] = [Self::Xs, Self::S, Self::M, Self::L, Self::Xl, Self::Xxl];

    /// Wire/database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Xs => "XS",
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::Xl => "XL",
            Self::Xxl => "XXL",
        }
    }
}

impl FromStr for Size {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "size",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender cut of a race slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Female cut
    #[serde(rename = "F")]
    Female,
    /// Male cut
    #[serde(rename = "M")]
    Male,
}

impl Gender {
    /// Every supported gender cut.
    pub const ALL: [Self; 2] = [Self::Female, Self::Male];

    /// Wire/database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Female => "F",
            Self::Male => "M",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|gender| gender.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "gender",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an inventory row.
///
/// Ordering is total so that multi-row operations can lock rows in a fixed
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    /// Shirt size
    pub size: Size,
    /// Gender cut
    pub gender: Gender,
}

impl InventoryKey {
    /// Create a key.
    #[must_use]
    pub const fn new(size: Size, gender: Gender) -> Self {
        Self { size, gender }
    }
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.size, self.gender)
    }
}

/// Counters of one inventory row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Row identity
    pub key: InventoryKey,
    /// Total units ever available
    pub stock: u32,
    /// Units held by pending/processing groups
    pub reserved: u32,
    /// Units committed to confirmed groups
    pub assigned: u32,
}

impl InventoryItem {
    /// A freshly configured row with nothing held or assigned.
    #[must_use]
    pub const fn new(key: InventoryKey, stock: u32) -> Self {
        Self {
            key,
            stock,
            reserved: 0,
            assigned: 0,
        }
    }

    /// `stock - reserved - assigned`.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.stock.saturating_sub(self.reserved.saturating_add(self.assigned))
    }
}

/// One line of a hold request: `count` units of a single row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldLine {
    /// Row to hold from
    pub key: InventoryKey,
    /// Units to hold
    pub count: u32,
}

impl HoldLine {
    /// Create a hold line.
    #[must_use]
    pub const fn new(key: InventoryKey, count: u32) -> Self {
        Self { key, count }
    }
}

/// Collapse keys into one line per row, ordered by key.
///
/// Zero-count lines are dropped.
#[must_use]
pub fn merge_lines(lines: impl IntoIterator<Item = HoldLine>) -> Vec<HoldLine> {
    let mut merged: BTreeMap<InventoryKey, u32> = BTreeMap::new();
    for line in lines {
        *merged.entry(line.key).or_default() += line.count;
    }
    merged
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(key, count)| HoldLine::new(key, count))
        .collect()
}

/// Token naming the exact lines of one hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldToken(Uuid);

impl HoldToken {
    /// Creates a new random `HoldToken`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `HoldToken` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HoldToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a hold. `Held` is the only state that can change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldState {
    /// Units counted in `reserved`
    Held,
    /// Units moved to `assigned`
    Committed,
    /// Units returned to available
    Released,
}

impl HoldState {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Committed => "committed",
            Self::Released => "released",
        }
    }
}

impl FromStr for HoldState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(Self::Held),
            "committed" => Ok(Self::Committed),
            "released" => Ok(Self::Released),
            _ => Err(UnknownVariant {
                kind: "hold state",
                value: s.to_string(),
            }),
        }
    }
}

/// A hold as recorded by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Token
    pub token: HoldToken,
    /// Exact lines held, one per row
    pub lines: Vec<HoldLine>,
    /// Current state
    pub state: HoldState,
    /// When the hold was taken
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Registration groups
// ============================================================================

/// Generated public code of a registration group.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupCode(String);

impl GroupCode {
    /// Generate a new code (`RG-` + 10 upper-case hex digits).
    #[must_use]
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("RG-{}", &simple[..10]))
    }

    /// Wrap an existing code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Money in integer minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Create from minor units (cents).
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Minor units.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub const fn times(&self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Payment status of a registration group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Group created, inventory held, payment not yet confirmed
    Pending,
    /// Gateway call in flight
    Processing,
    /// Paid; inventory assigned
    Confirmed,
    /// Payment failed; inventory released
    Rejected,
    /// Hold outlived the reservation window; inventory released
    Expired,
}

impl PaymentStatus {
    /// Statuses that still hold inventory.
    pub const OPEN: [Self; 2] = [Self::Pending, Self::Processing];

    /// Statuses that keep an idempotency key bound to their group.
    pub const LIVE: [Self; 3] = [Self::Pending, Self::Processing, Self::Confirmed];

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected | Self::Expired)
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(UnknownVariant {
                kind: "payment status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details of whoever registers the group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    /// Full name
    pub name: String,
    /// Email address (confirmation recipient)
    pub email: String,
    /// Phone number
    pub phone: String,
}

/// One runner of a group; consumes exactly one inventory unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    /// Full name
    pub full_name: String,
    /// National id or passport number, unique within the group
    pub identification: String,
    /// Shirt size
    pub size: Size,
    /// Gender cut
    pub gender: Gender,
    /// Date of birth
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Runner's own email
    #[serde(default)]
    pub email: Option<String>,
}

impl Runner {
    /// Inventory row this runner consumes.
    #[must_use]
    pub const fn key(&self) -> InventoryKey {
        InventoryKey::new(self.size, self.gender)
    }
}

/// Hold lines for a runner list (one unit per runner, merged per row).
#[must_use]
pub fn lines_for(runners: &[Runner]) -> Vec<HoldLine> {
    merge_lines(runners.iter().map(|runner| HoldLine::new(runner.key(), 1)))
}

/// How the group pays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Automated mobile payment through the gateway
    MobilePayment {
        /// Payer's bank selector
        bank_code: String,
        /// Payer's registered phone
        phone: String,
        /// Payer's national id
        payer_id: String,
    },
    /// Manual bank transfer with proof of payment
    BankTransfer {
        /// Transfer reference printed on the receipt
        reference: String,
        /// Handle of the uploaded proof, from the upload service
        #[serde(default)]
        proof_file: Option<String>,
    },
    /// Settled in person at a registration desk
    InPerson {
        /// Desk receipt number
        #[serde(default)]
        receipt: Option<String>,
    },
    /// Comped registration
    Exempt {
        /// Staff member who authorized the exemption
        authorized_by: String,
        /// Why the group is exempt
        reason: String,
    },
}

impl PaymentMethod {
    /// Whether confirming this method requires a gateway call.
    #[must_use]
    pub const fn requires_gateway(&self) -> bool {
        matches!(self, Self::MobilePayment { .. })
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MobilePayment { .. } => "mobile_payment",
            Self::BankTransfer { .. } => "bank_transfer",
            Self::InPerson { .. } => "in_person",
            Self::Exempt { .. } => "exempt",
        }
    }

    /// Client-supplied payment reference, if the method carries one.
    #[must_use]
    pub fn manual_reference(&self) -> Option<&str> {
        match self {
            Self::BankTransfer { reference, .. } => Some(reference.as_str()),
            _ => None,
        }
    }
}

/// A registration attempt and its payment state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationGroup {
    /// Public code
    pub code: GroupCode,
    /// Client-supplied deduplication key
    pub idempotency_key: Option<String>,
    /// Contact details
    pub registrant: Registrant,
    /// Runners, one inventory unit each
    pub runners: Vec<Runner>,
    /// Payment channel and its metadata
    pub payment_method: PaymentMethod,
    /// Current status
    pub status: PaymentStatus,
    /// Hold backing the runners
    pub hold_token: HoldToken,
    /// Amount due
    pub amount: Money,
    /// End of the reservation window
    pub reserved_until: DateTime<Utc>,
    /// Reference of the approved gateway attempt
    pub gateway_reference: Option<String>,
    /// When the group was confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// A confirmation message is still owed
    pub notification_pending: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl RegistrationGroup {
    /// Hold lines matching this group's runners.
    #[must_use]
    pub fn hold_lines(&self) -> Vec<HoldLine> {
        lines_for(&self.runners)
    }

    /// Whether the reservation window has passed at `now`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.reserved_until < now
    }
}

// ============================================================================
// Gateway attempts
// ============================================================================

/// Classified outcome of one gateway attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Provider approved
    Approved,
    /// Provider refused
    Rejected,
    /// Success-shaped response carrying a failure signature
    Ambiguous,
    /// No usable response
    TransportFailure,
}

impl AttemptOutcome {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Ambiguous => "ambiguous",
            Self::TransportFailure => "transport_failure",
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "ambiguous" => Ok(Self::Ambiguous),
            "transport_failure" => Ok(Self::TransportFailure),
            _ => Err(UnknownVariant {
                kind: "attempt outcome",
                value: s.to_string(),
            }),
        }
    }
}

/// Audit record of one gateway call. Never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAttempt {
    /// Reference sent with the call; unique across all attempts
    pub reference: String,
    /// Owning group
    pub group_code: GroupCode,
    /// Raw response body or transport error text
    pub raw_response: String,
    /// Normalized error, if the attempt failed
    pub normalized_error_code: Option<GatewayErrorCode>,
    /// Classified outcome
    pub outcome: AttemptOutcome,
    /// When the attempt completed
    pub created_at: DateTime<Utc>,
}
