//! Property-based tests for the asset lifecycle and its movement ledger
//!
//! Arbitrary sequences of lifecycle actions are thrown at a freshly registered
//! asset, most of them illegal for the status the asset happens to be in. The
//! state machine must refuse those without side effects and keep the holder
//! consistent with the status for the ones it accepts.

use proptest::prelude::*;
use std::sync::Arc;
use asset_lifecycle::{
    asset::{Asset, AssetDetails},
    lifecycle::{self, AssetAction, TransitionContext},
    movement,
    status::AssetStatus,
    store::{Store, abort},
};
use tempfile::tempdir;

// These property tests cover:
//
// 1. Holder consistency - ASSIGNED if and only if a holder is present
// 2. Refusals are pure - an illegal action never changes the asset
// 3. Disposal is final - nothing is accepted once DISPOSED
// 4. Ledger growth - one entry per accepted action, never fewer
// 5. Ledger integrity - the digest chain always verifies against the head
//
// What these tests DON'T cover (deliberately):
//
// - Requests and approvals (see approval_chain_property_tests.rs)
// - Authorization (handled by the service layer)
//

/// Strategy to generate any lifecycle action
fn action_strategy() -> impl Strategy<Value = AssetAction> {
    let user = prop::sample::select(vec!["alice", "bob", "carol"]);
    prop_oneof![
        user.clone().prop_map(|u| AssetAction::Assign { user: u.to_string() }),
        user.prop_map(|u| AssetAction::Transfer { user: u.to_string() }),
        prop::option::of(Just("Store room".to_string()))
            .prop_map(|location| AssetAction::Return { location }),
        Just(AssetAction::Repair),
        Just(AssetAction::RepairComplete),
        Just(AssetAction::Retire),
        Just(AssetAction::MarkLost),
        Just(AssetAction::MarkFound),
        Just(AssetAction::Dispose),
    ]
}

fn new_asset() -> Asset {
    AssetDetails::new()
        .set_tag("LAPTOP-001")
        .set_name("ThinkPad")
        .set_category("laptop")
        .validate_and_finalise()
        .expect("valid asset details")
}

proptest! {
    #[test]
    fn holder_tracks_status(actions in prop::collection::vec(action_strategy(), 0..40)) {
        let ctx = TransitionContext::new("admin");
        let mut asset = new_asset();

        for action in &actions {
            match lifecycle::apply(&asset, action, &ctx) {
                Ok(transition) => {
                    prop_assert_eq!(transition.movement.from_status, Some(asset.status()));
                    prop_assert_eq!(transition.movement.to_status, transition.asset.status());
                    asset = transition.asset;
                }
                Err(err) => {
                    prop_assert!(!action.permitted_from(asset.status()) || err.code() == "VALIDATION_ERROR");
                }
            }
            prop_assert!(asset.is_consistent());
            prop_assert_eq!(
                asset.status() == AssetStatus::Assigned,
                asset.current_holder().is_some()
            );
        }
    }

    #[test]
    fn refused_actions_change_nothing(
        actions in prop::collection::vec(action_strategy(), 1..30),
        probe in action_strategy(),
    ) {
        let ctx = TransitionContext::new("admin");
        let mut asset = new_asset();
        for action in &actions {
            if let Ok(transition) = lifecycle::apply(&asset, action, &ctx) {
                asset = transition.asset;
            }
        }

        let before = asset.clone();
        if lifecycle::apply(&asset, &probe, &ctx).is_err() {
            prop_assert_eq!(asset, before);
        }
    }

    #[test]
    fn disposed_is_final(actions in prop::collection::vec(action_strategy(), 0..20)) {
        let ctx = TransitionContext::new("admin");
        let mut asset = new_asset();
        for action in [AssetAction::Retire, AssetAction::Dispose] {
            asset = lifecycle::apply(&asset, &action, &ctx).expect("retire then dispose").asset;
        }

        for action in &actions {
            prop_assert!(lifecycle::apply(&asset, action, &ctx).is_err());
        }
        prop_assert_eq!(asset.status(), AssetStatus::Disposed);
    }
}

proptest! {
    // each case opens a sled database
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ledger_grows_with_every_accepted_action(
        actions in prop::collection::vec(action_strategy(), 0..25)
    ) {
        let dir = tempdir().expect("tempdir");
        let db = sled::open(dir.path().join("ledger.db")).expect("open sled");
        let store = Store::new(Arc::new(db)).expect("open trees");
        let ctx = TransitionContext::new("admin");

        let asset = new_asset();
        store
            .transaction(|tx| {
                let mut asset = asset.clone();
                let opening = lifecycle::registration(&asset, &ctx);
                tx.commit_movement(&mut asset, opening)?;
                Ok(())
            })
            .expect("register");

        let mut expected = 1usize;
        for action in &actions {
            let accepted = store.transaction(|tx| {
                let current = tx.require_asset("LAPTOP-001")?;
                let transition = lifecycle::apply(&current, action, &ctx).or_else(abort)?;
                let mut next = transition.asset;
                tx.commit_movement(&mut next, transition.movement)?;
                Ok(())
            });
            if accepted.is_ok() {
                expected += 1;
            }

            let ledger = store.movements("LAPTOP-001").expect("read ledger");
            prop_assert_eq!(ledger.len(), expected);
        }

        let stored = store.asset("LAPTOP-001").expect("read asset").expect("asset exists");
        let ledger = store.movements("LAPTOP-001").expect("read ledger");
        prop_assert_eq!(stored.movement_count() as usize, ledger.len());

        let report = movement::verify_chain(stored.ledger_head(), &ledger).expect("verify");
        prop_assert!(report.intact);
        prop_assert_eq!(report.first_break, None);
    }
}
