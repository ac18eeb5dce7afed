//! Closed vocabularies for assets, movements, requests and approvals.
//!
//! Each enum carries its display metadata (`label`, `color`) and the capability
//! predicates the engines consult. The predicates are the single source for the
//! legal-transition table: the lifecycle engine never hard-codes statuses.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    #[n(0)]
    InStock,
    #[n(1)]
    Assigned,
    #[n(2)]
    InRepair,
    #[n(3)]
    Lost,
    #[n(4)]
    Retired,
    #[n(5)]
    Disposed,
}

impl AssetStatus {
    pub const ALL: [AssetStatus; 6] = [
        AssetStatus::InStock,
        AssetStatus::Assigned,
        AssetStatus::InRepair,
        AssetStatus::Lost,
        AssetStatus::Retired,
        AssetStatus::Disposed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AssetStatus::InStock => "In Stock",
            AssetStatus::Assigned => "Assigned",
            AssetStatus::InRepair => "In Repair",
            AssetStatus::Lost => "Lost",
            AssetStatus::Retired => "Retired",
            AssetStatus::Disposed => "Disposed",
        }
    }
    /// Badge colour used by the dashboard
    pub fn color(self) -> &'static str {
        match self {
            AssetStatus::InStock => "green",
            AssetStatus::Assigned => "blue",
            AssetStatus::InRepair => "orange",
            AssetStatus::Lost => "red",
            AssetStatus::Retired => "gray",
            AssetStatus::Disposed => "dark",
        }
    }
    pub fn can_assign(self) -> bool {
        self == AssetStatus::InStock
    }
    pub fn can_return(self) -> bool {
        self == AssetStatus::Assigned
    }
    pub fn can_transfer(self) -> bool {
        self == AssetStatus::Assigned
    }
    pub fn can_repair(self) -> bool {
        matches!(self, AssetStatus::InStock | AssetStatus::Assigned)
    }
    pub fn can_complete_repair(self) -> bool {
        self == AssetStatus::InRepair
    }
    pub fn can_retire(self) -> bool {
        self != AssetStatus::Disposed
    }
    pub fn can_mark_lost(self) -> bool {
        matches!(self, AssetStatus::InStock | AssetStatus::Assigned)
    }
    pub fn can_mark_found(self) -> bool {
        self == AssetStatus::Lost
    }
    pub fn can_dispose(self) -> bool {
        self == AssetStatus::Retired
    }
    /// `Assigned` is the only status in which an asset has a holder
    pub fn requires_holder(self) -> bool {
        self == AssetStatus::Assigned
    }
    /// Still part of the working inventory
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AssetStatus::InStock | AssetStatus::Assigned | AssetStatus::InRepair
        )
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementType {
    #[n(0)]
    Register,
    #[n(1)]
    Assign,
    #[n(2)]
    Return,
    #[n(3)]
    Transfer,
    #[n(4)]
    Repair,
    #[n(5)]
    RepairComplete,
    #[n(6)]
    Retire,
    #[n(7)]
    Lost,
    #[n(8)]
    Found,
    #[n(9)]
    Dispose,
}

impl MovementType {
    pub fn label(self) -> &'static str {
        match self {
            MovementType::Register => "Registered",
            MovementType::Assign => "Assigned",
            MovementType::Return => "Returned",
            MovementType::Transfer => "Transferred",
            MovementType::Repair => "Sent for Repair",
            MovementType::RepairComplete => "Repair Completed",
            MovementType::Retire => "Retired",
            MovementType::Lost => "Reported Lost",
            MovementType::Found => "Found",
            MovementType::Dispose => "Disposed",
        }
    }
    pub fn color(self) -> &'static str {
        match self {
            MovementType::Register | MovementType::Found => "green",
            MovementType::Assign | MovementType::Transfer => "blue",
            MovementType::Return | MovementType::RepairComplete => "teal",
            MovementType::Repair => "orange",
            MovementType::Lost => "red",
            MovementType::Retire | MovementType::Dispose => "gray",
        }
    }
    /// Movements that change who holds the asset
    pub fn changes_holder(self) -> bool {
        matches!(
            self,
            MovementType::Assign | MovementType::Return | MovementType::Transfer
        )
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    PendingApproval,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
    #[n(5)]
    PendingFulfillment,
    #[n(6)]
    Fulfilled,
    #[n(7)]
    Closed,
    #[n(8)]
    Cancelled,
}

impl RequestStatus {
    pub fn label(self) -> &'static str {
        match self {
            RequestStatus::Draft => "Draft",
            RequestStatus::Submitted => "Submitted",
            RequestStatus::PendingApproval => "Pending Approval",
            RequestStatus::Approved => "Approved",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::PendingFulfillment => "Pending Fulfillment",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Closed => "Closed",
            RequestStatus::Cancelled => "Cancelled",
        }
    }
    pub fn color(self) -> &'static str {
        match self {
            RequestStatus::Draft => "gray",
            RequestStatus::Submitted | RequestStatus::PendingApproval => "yellow",
            RequestStatus::Approved | RequestStatus::PendingFulfillment => "blue",
            RequestStatus::Fulfilled | RequestStatus::Closed => "green",
            RequestStatus::Rejected => "red",
            RequestStatus::Cancelled => "dark",
        }
    }
    /// No further workflow transitions are accepted, with the single
    /// exception of closing a fulfilled request.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Fulfilled
                | RequestStatus::Closed
                | RequestStatus::Cancelled
                | RequestStatus::Rejected
        )
    }
    pub fn can_edit(self) -> bool {
        self == RequestStatus::Draft
    }
    pub fn can_submit(self) -> bool {
        self == RequestStatus::Draft
    }
    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            RequestStatus::Draft | RequestStatus::Submitted | RequestStatus::PendingApproval
        )
    }
    pub fn can_decide(self) -> bool {
        self == RequestStatus::PendingApproval
    }
    pub fn can_fulfill(self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::PendingFulfillment
        )
    }
    pub fn can_close(self) -> bool {
        self == RequestStatus::Fulfilled
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[n(0)]
    New,
    #[n(1)]
    Return,
    #[n(2)]
    Repair,
    #[n(3)]
    Transfer,
}

impl RequestType {
    pub fn label(self) -> &'static str {
        match self {
            RequestType::New => "New Asset",
            RequestType::Return => "Return",
            RequestType::Repair => "Repair",
            RequestType::Transfer => "Transfer",
        }
    }
    pub fn color(self) -> &'static str {
        match self {
            RequestType::New => "blue",
            RequestType::Return => "teal",
            RequestType::Repair => "orange",
            RequestType::Transfer => "purple",
        }
    }
    /// Every item must name the concrete asset it concerns
    pub fn requires_specific_asset(self) -> bool {
        self != RequestType::New
    }
    pub fn requires_transfer_target(self) -> bool {
        self == RequestType::Transfer
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
    /// Materialised in the chain but not yet decidable
    #[n(0)]
    Queued,
    #[n(1)]
    Pending,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
}

impl ApprovalStatus {
    pub fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Queued => "Queued",
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
        }
    }
    pub fn color(self) -> &'static str {
        match self {
            ApprovalStatus::Queued => "gray",
            ApprovalStatus::Pending => "yellow",
            ApprovalStatus::Approved => "green",
            ApprovalStatus::Rejected => "red",
        }
    }
    pub fn is_decided(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    #[n(0)]
    Approve,
    #[n(1)]
    Reject,
}
