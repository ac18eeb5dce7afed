use crate::status::{AssetStatus, RequestStatus, RequestType};

/// Malformed input, reported against the field that caused it
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("asset tag {0:?} may only contain ASCII letters, digits, '-' and '_'")]
    InvalidTag(String),
    #[error("asset tag {0} is already registered")]
    DuplicateTag(String),
    #[error("line {line}: quantity must be at least 1")]
    InvalidQuantity { line: u32 },
    #[error("line {line}: a category or a specific asset is required")]
    MissingCategory { line: u32 },
    #[error("line {line}: this request type needs a specific asset")]
    MissingAsset { line: u32 },
    #[error("line {line}: transfer requests need a transfer target")]
    MissingTransferTarget { line: u32 },
    #[error("line {line}: {asset_tag} is referenced more than once")]
    DuplicateAsset { line: u32, asset_tag: String },
    #[error("line {line}: expected {expected} asset(s), got {provided}")]
    AllocationMismatch {
        line: u32,
        expected: u32,
        provided: usize,
    },
    #[error("{0} already holds this asset")]
    TransferToSameHolder(String),
    #[error("line {line}: {asset_tag} is not held by the requester")]
    NotHeldByRequester { line: u32, asset_tag: String },
    #[error("line {line}: {asset_tag} is a {actual}, expected {expected}")]
    CategoryMismatch {
        line: u32,
        asset_tag: String,
        expected: String,
        actual: String,
    },
    #[error("line {line}: the item names {expected}, not {provided}")]
    AssetMismatch {
        line: u32,
        expected: String,
        provided: String,
    },
    #[error("line {0} does not exist on this request")]
    UnknownLine(u32),
    #[error("expected a {expected:?} request, got {actual:?}")]
    RequestTypeMismatch {
        expected: RequestType,
        actual: RequestType,
    },
    #[error("warranty expiry precedes the purchase date")]
    WarrantyBeforePurchase,
    #[error("no approver could be resolved for {0}")]
    NoApprover(String),
}

impl ValidationError {
    /// The input field this error is reported against
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::InvalidTag(_) | ValidationError::DuplicateTag(_) => "tag",
            ValidationError::InvalidQuantity { .. } => "quantity",
            ValidationError::MissingCategory { .. } => "category",
            ValidationError::MissingAsset { .. }
            | ValidationError::DuplicateAsset { .. }
            | ValidationError::NotHeldByRequester { .. }
            | ValidationError::AssetMismatch { .. } => "asset_tag",
            ValidationError::CategoryMismatch { .. } => "category",
            ValidationError::UnknownLine(_) => "line",
            ValidationError::RequestTypeMismatch { .. } => "request_type",
            ValidationError::MissingTransferTarget { .. }
            | ValidationError::TransferToSameHolder(_) => "transfer_to",
            ValidationError::AllocationMismatch { .. } => "allocation",
            ValidationError::WarrantyBeforePurchase => "warranty_expiry",
            ValidationError::NoApprover(_) => "approvers",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("cannot {action} asset {tag} while it is {status}")]
    InvalidTransition {
        tag: String,
        status: AssetStatus,
        action: &'static str,
    },
    #[error("request {request_id} is {status} and accepts no further changes")]
    RequestClosed {
        request_id: String,
        status: RequestStatus,
    },
    #[error("cannot {operation} request {request_id} while it is {status}")]
    InvalidRequestState {
        request_id: String,
        status: RequestStatus,
        operation: &'static str,
    },
    #[error("{approver} is not the current approver of {request_id}")]
    NotCurrentApprover {
        request_id: String,
        approver: String,
    },
    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },
    #[error("fulfillment of {request_id} failed at line {line}: {reason}")]
    FulfillmentFailed {
        request_id: String,
        line: u32,
        reason: Box<WorkflowError>,
    },
    #[error("request {0} has no items")]
    EmptyItems(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(String),
}

impl WorkflowError {
    /// Stable code surfaced at the request/response boundary
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::RequestClosed { .. } => "REQUEST_CLOSED",
            WorkflowError::InvalidRequestState { .. } => "INVALID_REQUEST_STATE",
            WorkflowError::NotCurrentApprover { .. } => "NOT_CURRENT_APPROVER",
            WorkflowError::Unauthorized { .. } => "UNAUTHORIZED",
            WorkflowError::FulfillmentFailed { .. } => "FULFILLMENT_FAILED",
            WorkflowError::EmptyItems(_) => "EMPTY_ITEMS",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::Validation(_) => "VALIDATION_ERROR",
            WorkflowError::Config(_) => "CONFIG_ERROR",
            WorkflowError::Storage(_) => "STORAGE_ERROR",
            WorkflowError::Codec(_) => "CODEC_ERROR",
        }
    }
    /// Errors the caller can fix and re-issue; the rest are operator problems
    pub fn is_user_correctable(&self) -> bool {
        !matches!(
            self,
            WorkflowError::Config(_) | WorkflowError::Storage(_) | WorkflowError::Codec(_)
        )
    }
}

impl From<sled::transaction::TransactionError<WorkflowError>> for WorkflowError {
    fn from(value: sled::transaction::TransactionError<WorkflowError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => WorkflowError::Storage(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = WorkflowError::InvalidTransition {
            tag: "LAPTOP-001".into(),
            status: AssetStatus::InStock,
            action: "return",
        };
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(
            err.to_string(),
            "cannot return asset LAPTOP-001 while it is In Stock"
        );

        let err: WorkflowError = ValidationError::MissingField("name").into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn validation_errors_name_their_field() {
        assert_eq!(ValidationError::MissingField("name").field(), "name");
        assert_eq!(
            ValidationError::MissingTransferTarget { line: 1 }.field(),
            "transfer_to"
        );
    }
}
