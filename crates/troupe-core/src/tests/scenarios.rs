//! End-to-end trigger scenarios.
//!
//! These tests drive whole contexts through their triggers and check:
//! - the money-transfer scenario for every casting strategy
//! - guaranteed cleanup on body failure and panic
//! - facade dispatch order and unsupported operations
//! - wrapper forwarding
//! - OnInit contexts and role reassignment

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::behavior::{BehaviorKind, BehaviorSet};
use crate::casting::RoleWrapper;
use crate::context::{ApplyPolicy, ContextClass};
use crate::error::RoleError;
use crate::negotiator::Negotiator;
use crate::player::{downcast_player, same_player, PlayerRef};

use super::helpers::{
    account, balance_of, init_tracing, plain_wallet, transfer_class, Account, Wallet,
};

const KINDS: [BehaviorKind; 3] = [
    BehaviorKind::Mixin,
    BehaviorKind::Wrapper,
    BehaviorKind::Facade,
];

fn assert_unchanged(before: &[PlayerRef], after: &[PlayerRef]) {
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after) {
        assert!(same_player(b, a), "binding changed: {b:?} -> {a:?}");
    }
}

// =============================================================================
// Money Transfer
// =============================================================================

#[test]
fn transfer_moves_one_unit_for_every_kind() {
    init_tracing();

    for source_kind in KINDS {
        for destination_kind in KINDS {
            let (source, destination) = (account(10), account(0));
            let mut ctx = transfer_class(source_kind, destination_kind, ApplyPolicy::OnTrigger)
                .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
                .unwrap();

            ctx.trigger("transfer", &[]).unwrap();

            assert_eq!(balance_of(&source), 9, "{source_kind}/{destination_kind}");
            assert_eq!(balance_of(&destination), 1, "{source_kind}/{destination_kind}");

            // Accessors hand back the plain objects.
            assert!(same_player(ctx.role("source").unwrap(), &source));
            assert!(same_player(ctx.role("destination").unwrap(), &destination));
            assert!(ctx.role_as::<Account>("source").is_some());
            assert!(source.castable().unwrap().cast_sets().is_empty());
            assert!(destination.castable().unwrap().cast_sets().is_empty());
            assert!(ctx.negotiators().is_empty());
            assert!(!ctx.is_applied());
        }
    }
}

#[test]
fn transfer_with_wallets_uses_wrappers_and_facades() {
    let (source, destination) = (plain_wallet(10), plain_wallet(0));
    let mut ctx = transfer_class(
        BehaviorKind::Wrapper,
        BehaviorKind::Facade,
        ApplyPolicy::OnTrigger,
    )
    .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
    .unwrap();

    assert_eq!(ctx.trigger("transfer", &[json!(4)]).unwrap(), json!(4));
    assert_eq!(balance_of(&source), 6);
    assert_eq!(balance_of(&destination), 4);
    assert!(ctx.role_as::<Wallet>("source").is_some());
    assert!(ctx.role_as::<Wallet>("destination").is_some());
}

#[test]
fn repeated_triggers_reuse_the_same_bindings() {
    let (source, destination) = (account(10), plain_wallet(0));
    let mut ctx = transfer_class(
        BehaviorKind::Mixin,
        BehaviorKind::Wrapper,
        ApplyPolicy::OnTrigger,
    )
    .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
    .unwrap();

    for _ in 0..3 {
        ctx.trigger("transfer", &[]).unwrap();
    }
    assert_eq!(balance_of(&source), 7);
    assert_eq!(balance_of(&destination), 3);
    assert!(ctx.is_role("source", &source));
    assert!(ctx.is_role("destination", &destination));
}

#[test]
fn mixin_on_plain_wallet_passes_through() {
    let (source, destination) = (plain_wallet(10), account(0));
    let mut ctx = transfer_class(
        BehaviorKind::Mixin,
        BehaviorKind::Mixin,
        ApplyPolicy::OnTrigger,
    )
    .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
    .unwrap();
    let before = ctx.roles().snapshot();

    // The wallet never gained `transfer_out`.
    let err = ctx.trigger("transfer", &[]).unwrap_err();
    assert!(matches!(err, RoleError::NoMethod { player: "Wallet", ref operation } if operation == "transfer_out"));

    assert_unchanged(&before, &ctx.roles().snapshot());
    assert_eq!(balance_of(&source), 10);
}

#[test]
fn unregistered_behavior_passes_through() {
    let class = ContextClass::builder("Lookup")
        .plain_role("holder")
        .trigger("peek", |ctx, _| {
            let holder = ctx.role("holder")?;
            Ok(json!(downcast_player::<Wallet>(holder).is_some()))
        })
        .build()
        .unwrap();
    let wallet = plain_wallet(3);
    let mut ctx = class.instantiate(vec![PlayerRef::clone(&wallet)]).unwrap();

    assert_eq!(ctx.trigger("peek", &[]).unwrap(), json!(true));
}

// =============================================================================
// Guaranteed Cleanup
// =============================================================================

#[test]
fn body_failure_propagates_after_cleanup() {
    for kind in KINDS {
        let (source, destination) = (account(10), account(0));
        let mut ctx = transfer_class(kind, kind, ApplyPolicy::OnTrigger)
            .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
            .unwrap();
        let before = ctx.roles().snapshot();

        let err = ctx.trigger("fail_after_transfer", &[]).unwrap_err();
        match err {
            RoleError::Failed(inner) => assert_eq!(inner.to_string(), "boom"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_unchanged(&before, &ctx.roles().snapshot());
        assert!(!ctx.is_applied());
        assert!(ctx.negotiators().is_empty());
        assert!(source.castable().unwrap().cast_sets().is_empty());
        // The body's side effects are not rolled back.
        assert_eq!(balance_of(&source), 9);
    }
}

#[test]
fn operation_failure_keeps_its_kind() {
    let (source, destination) = (account(0), account(0));
    let mut ctx = transfer_class(
        BehaviorKind::Facade,
        BehaviorKind::Facade,
        ApplyPolicy::OnTrigger,
    )
    .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
    .unwrap();

    let err = ctx.trigger("transfer", &[]).unwrap_err();
    let RoleError::Failed(inner) = err else {
        panic!("expected the debit failure");
    };
    assert!(inner.to_string().starts_with("insufficient funds"));
    assert!(ctx.is_role("source", &source));
}

#[test]
fn engine_errors_from_body_are_not_rewrapped() {
    let class = ContextClass::builder("Strict")
        .role("clerk", BehaviorSet::facade("Clerk"))
        .trigger("shred", |ctx, _| ctx.send("clerk", "shred", &[]))
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![plain_wallet(1)]).unwrap();

    let err = ctx.trigger("shred", &[]).unwrap_err();
    assert!(err.is_unsupported());
    assert!(matches!(err, RoleError::Unsupported { ref role, ref operation } if role == "clerk" && operation == "shred"));
}

#[test]
fn panic_in_body_still_removes_roles() {
    let class = ContextClass::builder("Explosive")
        .role("source", BehaviorSet::wrapper("Source"))
        .role("auditor", BehaviorSet::facade("Auditor"))
        .trigger("explode", |_, _| panic!("kaboom"))
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![plain_wallet(1), account(2)]).unwrap();
    let before = ctx.roles().snapshot();

    let outcome = catch_unwind(AssertUnwindSafe(|| ctx.trigger("explode", &[])));
    assert!(outcome.is_err());

    assert_unchanged(&before, &ctx.roles().snapshot());
    assert!(!ctx.is_applied());
    assert!(ctx.negotiators().is_empty());
}

// =============================================================================
// Facade Roles
// =============================================================================

fn audit_class() -> Arc<ContextClass> {
    ContextClass::builder("Audit")
        .plain_role("source")
        .role(
            "auditor",
            BehaviorSet::facade("Auditor")
                .define("inspect", |call, _| {
                    let seen = call.send("source", "balance", &[])?;
                    let own = call.send_self("balance", &[])?;
                    Ok(json!({ "source": seen, "own": own }))
                })
                .define("balance", |_, _| Ok(json!("shadowed"))),
        )
        .trigger("inspect", |ctx, _| ctx.send("auditor", "inspect", &[]))
        .trigger("balance", |ctx, _| ctx.send("auditor", "balance", &[]))
        .trigger("shred", |ctx, _| ctx.send("auditor", "shred", &[]))
        .build()
        .unwrap()
}

#[test]
fn facade_operation_reaches_sibling_roles() {
    let mut ctx = audit_class()
        .instantiate(vec![plain_wallet(7), plain_wallet(2)])
        .unwrap();

    let report = ctx.trigger("inspect", &[]).unwrap();
    assert_eq!(report, json!({ "source": 7, "own": 2 }));
}

#[test]
fn facade_prefers_native_operations() {
    let mut ctx = audit_class()
        .instantiate(vec![plain_wallet(7), plain_wallet(2)])
        .unwrap();

    assert_eq!(ctx.trigger("balance", &[]).unwrap(), json!(2));
}

#[test]
fn facade_unsupported_operation_names_role() {
    let mut ctx = audit_class()
        .instantiate(vec![plain_wallet(7), plain_wallet(2)])
        .unwrap();

    let err = ctx.trigger("shred", &[]).unwrap_err();
    assert_eq!(err.to_string(), "role `auditor` does not support operation `shred`");
}

#[test]
fn facade_leaves_player_untouched() {
    let auditor = account(2);
    let mut ctx = audit_class()
        .instantiate(vec![plain_wallet(7), PlayerRef::clone(&auditor)])
        .unwrap();

    ctx.trigger("inspect", &[]).unwrap();
    assert!(auditor.castable().unwrap().cast_sets().is_empty());
    assert!(!auditor.responds_to("inspect"));
}

#[test]
fn escaped_negotiator_is_detached() {
    let escaped: Arc<Mutex<Option<PlayerRef>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&escaped);
    let class = ContextClass::builder("Leaky")
        .role(
            "auditor",
            BehaviorSet::facade("Auditor").define("wave", |_, _| Ok(json!("hi"))),
        )
        .trigger("leak", move |ctx, _| {
            let negotiator = PlayerRef::clone(ctx.role("auditor")?);
            let answer = negotiator.call("wave", &[], ctx)?;
            *slot.lock() = Some(negotiator);
            Ok(answer)
        })
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![plain_wallet(1)]).unwrap();

    assert_eq!(ctx.trigger("leak", &[]).unwrap(), json!("hi"));

    let negotiator = escaped.lock().take().unwrap();
    assert!(downcast_player::<Negotiator>(&negotiator).is_some());
    let err = negotiator.call("wave", &[], &ctx).unwrap_err();
    assert!(matches!(err, RoleError::Detached { ref role } if role == "auditor"));
}

#[test]
fn negotiator_rejects_foreign_context() {
    let class = ContextClass::builder("Owned")
        .role(
            "auditor",
            BehaviorSet::facade("Auditor").define("wave", |_, _| Ok(json!("hi"))),
        )
        .apply(ApplyPolicy::OnInit)
        .build()
        .unwrap();
    let first = class.instantiate(vec![plain_wallet(1)]).unwrap();
    let second = class.instantiate(vec![plain_wallet(1)]).unwrap();

    let negotiator = first.role("auditor").unwrap();
    assert_eq!(negotiator.call("wave", &[], &first).unwrap(), json!("hi"));
    assert!(matches!(
        negotiator.call("wave", &[], &second),
        Err(RoleError::Detached { .. })
    ));
}

// =============================================================================
// Wrapper Roles
// =============================================================================

#[test]
fn wrapper_forwards_unmatched_calls() {
    let wallet = plain_wallet(5);
    let direct = PlayerRef::clone(&wallet);
    let class = ContextClass::builder("Forwarding")
        .role(
            "source",
            BehaviorSet::wrapper("Source").define("double", |call, _| {
                let balance = call.send_self("balance", &[])?;
                Ok(json!(balance.as_i64().unwrap_or_default() * 2))
            }),
        )
        .trigger("compare", move |ctx, _| {
            let wrapped = ctx.role("source")?;
            let is_wrapper = downcast_player::<RoleWrapper>(wrapped).is_some();
            let through_role = ctx.send("source", "balance", &[])?;
            let owner = ctx.send("source", "owner", &[])?;
            let native = direct.call("balance", &[], ctx)?;
            let doubled = ctx.send("source", "double", &[])?;
            Ok(json!([is_wrapper, through_role == native, owner, doubled]))
        })
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![PlayerRef::clone(&wallet)]).unwrap();

    assert_eq!(
        ctx.trigger("compare", &[]).unwrap(),
        json!([true, true, "wallet", 10])
    );
    assert!(same_player(ctx.role("source").unwrap(), &wallet));
}

#[test]
fn wrapper_missing_operation_reports_player() {
    let class = ContextClass::builder("Forwarding")
        .role("source", BehaviorSet::wrapper("Source"))
        .trigger("fly", |ctx, _| ctx.send("source", "fly", &[]))
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![plain_wallet(5)]).unwrap();

    let err = ctx.trigger("fly", &[]).unwrap_err();
    assert!(matches!(err, RoleError::NoMethod { player: "Wallet", .. }));
}

// =============================================================================
// OnInit Contexts
// =============================================================================

#[test]
fn on_init_keeps_roles_across_triggers() {
    let (source, destination) = (plain_wallet(10), account(0));
    let mut ctx = transfer_class(
        BehaviorKind::Wrapper,
        BehaviorKind::Mixin,
        ApplyPolicy::OnInit,
    )
    .instantiate(vec![PlayerRef::clone(&source), PlayerRef::clone(&destination)])
    .unwrap();
    let applied = ctx.roles().snapshot();

    ctx.trigger("transfer", &[]).unwrap();
    ctx.trigger("transfer", &[]).unwrap();

    assert_unchanged(&applied, &ctx.roles().snapshot());
    assert!(ctx.is_applied());
    assert!(!ctx.is_role("source", &source));
    assert_eq!(balance_of(&source), 8);
    assert_eq!(balance_of(&destination), 2);

    drop(ctx);
    assert!(destination.castable().unwrap().cast_sets().is_empty());
}

#[test]
fn reassign_on_init_discards_negotiator() {
    let class = ContextClass::builder("Reassign")
        .role(
            "auditor",
            BehaviorSet::facade("Auditor").define("wave", |call, _| call.send_self("owner", &[])),
        )
        .apply(ApplyPolicy::OnInit)
        .build()
        .unwrap();
    let (first, second) = (plain_wallet(1), account(2));
    let mut ctx = class.instantiate(vec![PlayerRef::clone(&first)]).unwrap();
    let old_negotiator = PlayerRef::clone(ctx.role("auditor").unwrap());

    let previous = ctx.reassign("auditor", PlayerRef::clone(&second)).unwrap();
    assert!(same_player(&previous, &first));

    let current = ctx.role("auditor").unwrap();
    let negotiator = downcast_player::<Negotiator>(current).unwrap();
    assert!(same_player(negotiator.player(), &second));
    assert_eq!(ctx.send("auditor", "wave", &[]).unwrap(), json!("account"));
    assert_eq!(ctx.negotiators().len(), 1);

    assert!(!same_player(&old_negotiator, current));
    assert!(matches!(
        old_negotiator.call("wave", &[], &ctx),
        Err(RoleError::Detached { .. })
    ));
}

// =============================================================================
// Shared Players
// =============================================================================

#[test]
fn player_shared_between_contexts() {
    let shared = account(10);
    let class = transfer_class(
        BehaviorKind::Mixin,
        BehaviorKind::Wrapper,
        ApplyPolicy::OnTrigger,
    );
    let mut first = class
        .instantiate(vec![PlayerRef::clone(&shared), plain_wallet(0)])
        .unwrap();
    let second = class
        .instantiate(vec![account(5), PlayerRef::clone(&shared)])
        .unwrap();

    first.trigger("transfer", &[json!(3)]).unwrap();

    assert_eq!(balance_of(&shared), 7);
    assert!(first.is_role("source", &shared));
    assert!(second.is_role("destination", &shared));
    assert!(shared.castable().unwrap().cast_sets().is_empty());
}

#[test]
fn trigger_returns_body_value() {
    let class = ContextClass::builder("Echo")
        .trigger("echo", |_, args| Ok(Value::Array(args.to_vec())))
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![]).unwrap();

    assert_eq!(
        ctx.trigger("echo", &[json!(1), json!("two")]).unwrap(),
        json!([1, "two"])
    );
}

#[test]
fn body_can_fail_with_anyhow() {
    let class = ContextClass::builder("Grumpy")
        .trigger("grumble", |_, _| Err(anyhow!("not today").into()))
        .build()
        .unwrap();
    let mut ctx = class.instantiate(vec![]).unwrap();

    let err = ctx.trigger("grumble", &[]).unwrap_err();
    assert_eq!(err.to_string(), "not today");
}
