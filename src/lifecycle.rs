//! Asset lifecycle engine.
//!
//! `apply` is the only place asset status, holder and location change. It is
//! pure: it returns the next asset state together with the movement describing
//! the change, and the service commits both in one transaction.
//!
//! | action          | from                    | to          | holder                     |
//! |-----------------|-------------------------|-------------|----------------------------|
//! | assign          | in stock                | assigned    | set                        |
//! | return          | assigned                | in stock    | cleared, location set      |
//! | transfer        | assigned                | assigned    | replaced                   |
//! | repair          | in stock, assigned      | in repair   | moved to prior holder      |
//! | repair complete | in repair               | in stock    | -                          |
//! | retire          | anything but disposed   | retired     | cleared                    |
//! | mark lost       | in stock, assigned      | lost        | moved to prior holder      |
//! | mark found      | lost                    | in stock    | -                          |
//! | dispose         | retired                 | disposed    | -                          |
use crate::asset::Asset;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::movement::AssetMovement;
use crate::status::{AssetStatus, MovementType};
use crate::types::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetAction {
    Assign { user: String },
    Return { location: Option<String> },
    Transfer { user: String },
    Repair,
    RepairComplete,
    Retire,
    MarkLost,
    MarkFound,
    Dispose,
}

impl AssetAction {
    pub fn name(&self) -> &'static str {
        match self {
            AssetAction::Assign { .. } => "assign",
            AssetAction::Return { .. } => "return",
            AssetAction::Transfer { .. } => "transfer",
            AssetAction::Repair => "repair",
            AssetAction::RepairComplete => "complete repair of",
            AssetAction::Retire => "retire",
            AssetAction::MarkLost => "mark lost",
            AssetAction::MarkFound => "mark found",
            AssetAction::Dispose => "dispose",
        }
    }
    pub fn movement_type(&self) -> MovementType {
        match self {
            AssetAction::Assign { .. } => MovementType::Assign,
            AssetAction::Return { .. } => MovementType::Return,
            AssetAction::Transfer { .. } => MovementType::Transfer,
            AssetAction::Repair => MovementType::Repair,
            AssetAction::RepairComplete => MovementType::RepairComplete,
            AssetAction::Retire => MovementType::Retire,
            AssetAction::MarkLost => MovementType::Lost,
            AssetAction::MarkFound => MovementType::Found,
            AssetAction::Dispose => MovementType::Dispose,
        }
    }
    /// Whether this action is legal from `status`
    pub fn permitted_from(&self, status: AssetStatus) -> bool {
        match self {
            AssetAction::Assign { .. } => status.can_assign(),
            AssetAction::Return { .. } => status.can_return(),
            AssetAction::Transfer { .. } => status.can_transfer(),
            AssetAction::Repair => status.can_repair(),
            AssetAction::RepairComplete => status.can_complete_repair(),
            AssetAction::Retire => status.can_retire(),
            AssetAction::MarkLost => status.can_mark_lost(),
            AssetAction::MarkFound => status.can_mark_found(),
            AssetAction::Dispose => status.can_dispose(),
        }
    }
    fn target_status(&self) -> AssetStatus {
        match self {
            AssetAction::Assign { .. } | AssetAction::Transfer { .. } => AssetStatus::Assigned,
            AssetAction::Return { .. }
            | AssetAction::RepairComplete
            | AssetAction::MarkFound => AssetStatus::InStock,
            AssetAction::Repair => AssetStatus::InRepair,
            AssetAction::Retire => AssetStatus::Retired,
            AssetAction::MarkLost => AssetStatus::Lost,
            AssetAction::Dispose => AssetStatus::Disposed,
        }
    }
}

/// Who is acting, why, and on behalf of which request
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub actor: String,
    pub notes: Option<String>,
    pub request_id: Option<String>,
}

impl TransitionContext {
    pub fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            ..Self::default()
        }
    }
    pub fn with_notes(mut self, notes: Option<&str>) -> Self {
        self.notes = notes.map(str::to_string);
        self
    }
    pub fn for_request(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub asset: Asset,
    pub movement: AssetMovement,
}

/// Computes the next state of `asset` under `action`.
///
/// The returned movement has no ledger position yet; the recorder assigns it
/// when the transition is committed.
pub fn apply(asset: &Asset, action: &AssetAction, ctx: &TransitionContext) -> Result<Transition> {
    let from = asset.status;
    if !action.permitted_from(from) {
        return Err(WorkflowError::InvalidTransition {
            tag: asset.tag.clone(),
            status: from,
            action: action.name(),
        });
    }

    let mut next = asset.clone();
    next.status = action.target_status();

    match action {
        AssetAction::Assign { user } => {
            let user = required_user(user)?;
            next.current_holder = Some(user);
            next.prior_holder = None;
        }
        AssetAction::Return { location } => {
            next.current_holder = None;
            if let Some(location) = location {
                next.current_location = Some(location.clone());
            }
        }
        AssetAction::Transfer { user } => {
            let user = required_user(user)?;
            if asset.current_holder.as_deref() == Some(user.as_str()) {
                return Err(ValidationError::TransferToSameHolder(user).into());
            }
            next.current_holder = Some(user);
        }
        AssetAction::Repair | AssetAction::MarkLost => {
            if let Some(holder) = next.current_holder.take() {
                next.prior_holder = Some(holder);
            }
        }
        AssetAction::Retire => {
            next.current_holder = None;
        }
        AssetAction::RepairComplete | AssetAction::MarkFound | AssetAction::Dispose => {}
    }

    let now = TimeStamp::new();
    next.updated_at = now.clone();
    debug_assert!(next.is_consistent(), "status and holder diverged");

    let movement = AssetMovement {
        asset_tag: asset.tag.clone(),
        sequence: 0,
        movement_type: action.movement_type(),
        from_status: Some(from),
        to_status: next.status,
        from_holder: asset.current_holder.clone(),
        to_holder: next.current_holder.clone(),
        from_location: asset.current_location.clone(),
        to_location: next.current_location.clone(),
        performed_by: ctx.actor.clone(),
        request_id: ctx.request_id.clone(),
        notes: ctx.notes.clone(),
        recorded_at: now,
        prev_digest: None,
    };

    Ok(Transition {
        asset: next,
        movement,
    })
}

/// The movement that opens a freshly registered asset's ledger
pub fn registration(asset: &Asset, ctx: &TransitionContext) -> AssetMovement {
    AssetMovement {
        asset_tag: asset.tag.clone(),
        sequence: 0,
        movement_type: MovementType::Register,
        from_status: None,
        to_status: asset.status,
        from_holder: None,
        to_holder: None,
        from_location: None,
        to_location: asset.current_location.clone(),
        performed_by: ctx.actor.clone(),
        request_id: None,
        notes: ctx.notes.clone(),
        recorded_at: asset.registered_at.clone(),
        prev_digest: None,
    }
}

fn required_user(user: &str) -> Result<String> {
    let user = user.trim();
    if user.is_empty() {
        return Err(ValidationError::MissingField("user").into());
    }
    Ok(user.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetDetails;

    fn laptop() -> Asset {
        AssetDetails::new()
            .set_tag("LAPTOP-001")
            .set_name("ThinkPad T14")
            .set_category("laptop")
            .set_location("store")
            .validate_and_finalise()
            .unwrap()
    }

    fn ctx() -> TransitionContext {
        TransitionContext::new("admin")
    }

    fn run(asset: &Asset, action: AssetAction) -> Result<Asset> {
        apply(asset, &action, &ctx()).map(|t| t.asset)
    }

    #[test]
    fn assign_transfer_return() {
        let asset = laptop();

        let t = apply(
            &asset,
            &AssetAction::Assign {
                user: "user-42".into(),
            },
            &ctx(),
        )
        .unwrap();
        assert_eq!(t.asset.status(), AssetStatus::Assigned);
        assert_eq!(t.asset.current_holder(), Some("user-42"));
        assert_eq!(t.movement.movement_type, MovementType::Assign);
        assert_eq!(t.movement.to_status, AssetStatus::Assigned);
        assert_eq!(t.movement.from_holder, None);

        let t = apply(
            &t.asset,
            &AssetAction::Transfer {
                user: "user-7".into(),
            },
            &ctx(),
        )
        .unwrap();
        assert_eq!(t.asset.current_holder(), Some("user-7"));
        assert_eq!(t.movement.from_holder.as_deref(), Some("user-42"));

        let t = apply(
            &t.asset,
            &AssetAction::Return {
                location: Some("HQ".into()),
            },
            &ctx(),
        )
        .unwrap();
        assert_eq!(t.asset.status(), AssetStatus::InStock);
        assert_eq!(t.asset.current_holder(), None);
        assert_eq!(t.asset.current_location(), Some("HQ"));
        assert_eq!(t.movement.from_location.as_deref(), Some("store"));
    }

    #[test]
    fn return_from_stock_is_invalid() {
        let err = run(&laptop(), AssetAction::Return { location: None }).unwrap_err();
        match err {
            WorkflowError::InvalidTransition { status, action, .. } => {
                assert_eq!(status, AssetStatus::InStock);
                assert_eq!(action, "return");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn repair_keeps_prior_holder() {
        let assigned = run(
            &laptop(),
            AssetAction::Assign {
                user: "user-42".into(),
            },
        )
        .unwrap();
        let in_repair = run(&assigned, AssetAction::Repair).unwrap();
        assert_eq!(in_repair.status(), AssetStatus::InRepair);
        assert_eq!(in_repair.current_holder(), None);
        assert_eq!(in_repair.prior_holder(), Some("user-42"));

        let repaired = run(&in_repair, AssetAction::RepairComplete).unwrap();
        assert_eq!(repaired.status(), AssetStatus::InStock);
        assert_eq!(repaired.prior_holder(), Some("user-42"));

        let reassigned = run(
            &repaired,
            AssetAction::Assign {
                user: "user-42".into(),
            },
        )
        .unwrap();
        assert_eq!(reassigned.prior_holder(), None);
    }

    #[test]
    fn lost_and_found() {
        let lost = run(&laptop(), AssetAction::MarkLost).unwrap();
        assert_eq!(lost.status(), AssetStatus::Lost);
        assert!(run(&lost, AssetAction::Assign { user: "u".into() }).is_err());
        let found = run(&lost, AssetAction::MarkFound).unwrap();
        assert_eq!(found.status(), AssetStatus::InStock);
    }

    #[test]
    fn retire_then_dispose_is_final() {
        let assigned = run(
            &laptop(),
            AssetAction::Assign {
                user: "user-42".into(),
            },
        )
        .unwrap();
        let retired = run(&assigned, AssetAction::Retire).unwrap();
        assert_eq!(retired.current_holder(), None);
        let disposed = run(&retired, AssetAction::Dispose).unwrap();
        assert_eq!(disposed.status(), AssetStatus::Disposed);
        assert!(run(&disposed, AssetAction::Retire).is_err());
        assert!(run(&disposed, AssetAction::MarkFound).is_err());
    }

    #[test]
    fn transfer_to_current_holder_is_rejected() {
        let assigned = run(
            &laptop(),
            AssetAction::Assign {
                user: "user-42".into(),
            },
        )
        .unwrap();
        let err = run(
            &assigned,
            AssetAction::Transfer {
                user: "user-42".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn assign_requires_a_user() {
        let err = run(&laptop(), AssetAction::Assign { user: "  ".into() }).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn movement_carries_request_link() {
        let ctx = TransitionContext::new("admin")
            .with_notes(Some("onboarding"))
            .for_request("req_1abc");
        let t = apply(
            &laptop(),
            &AssetAction::Assign {
                user: "user-42".into(),
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(t.movement.request_id.as_deref(), Some("req_1abc"));
        assert_eq!(t.movement.notes.as_deref(), Some("onboarding"));
        assert_eq!(t.movement.performed_by, "admin");
    }
}
