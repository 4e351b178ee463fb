//! Test players and context factories.
//!
//! - [`Account`]: castable player, accepts mixins
//! - [`Wallet`]: plain player with no cast extension point
//!
//! Both answer `balance`, `credit`, `debit` and `owner` natively.

use std::any::Any;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::behavior::{BehaviorKind, BehaviorSet};
use crate::context::{ApplyPolicy, Context, ContextClass};
use crate::error::{RoleError, RoleResult};
use crate::player::{downcast_player, CastSlots, Castable, Player, PlayerRef};

// =============================================================================
// Test Players
// =============================================================================

/// A castable account.
#[derive(Debug)]
pub struct Account {
    owner: String,
    balance: Mutex<i64>,
    casts: CastSlots,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            owner: owner.to_string(),
            balance: Mutex::new(balance),
            casts: CastSlots::new(),
        }
    }

    pub fn balance(&self) -> i64 {
        *self.balance.lock()
    }
}

/// A plain wallet that cannot take mixins.
#[derive(Debug)]
pub struct Wallet {
    owner: String,
    balance: Mutex<i64>,
}

impl Wallet {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            owner: owner.to_string(),
            balance: Mutex::new(balance),
        }
    }

    pub fn balance(&self) -> i64 {
        *self.balance.lock()
    }
}

const LEDGER_OPS: [&str; 4] = ["balance", "credit", "debit", "owner"];

fn ledger_op(
    owner: &str,
    balance: &Mutex<i64>,
    operation: &str,
    args: &[Value],
) -> Option<RoleResult<Value>> {
    let result = match operation {
        "balance" => Ok(json!(*balance.lock())),
        "owner" => Ok(json!(owner)),
        "credit" => amount(args).map(|n| {
            let mut balance = balance.lock();
            *balance += n;
            json!(*balance)
        }),
        "debit" => amount(args).and_then(|n| {
            let mut balance = balance.lock();
            if *balance < n {
                return Err(anyhow!("insufficient funds: {owner} has {}, needs {n}", *balance).into());
            }
            *balance -= n;
            Ok(json!(*balance))
        }),
        _ => return None,
    };
    Some(result)
}

impl Player for Account {
    fn responds_to(&self, operation: &str) -> bool {
        LEDGER_OPS.contains(&operation) || self.casts.responds_to(operation)
    }

    fn call(&self, operation: &str, args: &[Value], context: &Context) -> RoleResult<Value> {
        if let Some(result) = ledger_op(&self.owner, &self.balance, operation, args) {
            return result;
        }
        self.casts
            .dispatch(self, operation, args, context)
            .unwrap_or_else(|| Err(RoleError::no_method::<Self>(operation)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn castable(&self) -> Option<&dyn Castable> {
        Some(&self.casts)
    }
}

impl Player for Wallet {
    fn responds_to(&self, operation: &str) -> bool {
        LEDGER_OPS.contains(&operation)
    }

    fn call(&self, operation: &str, args: &[Value], _context: &Context) -> RoleResult<Value> {
        ledger_op(&self.owner, &self.balance, operation, args)
            .unwrap_or_else(|| Err(RoleError::no_method::<Self>(operation)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Factories
// =============================================================================

/// A castable account with the given balance.
pub fn account(balance: i64) -> PlayerRef {
    Arc::new(Account::new("account", balance))
}

/// A non-castable wallet with the given balance.
pub fn plain_wallet(balance: i64) -> PlayerRef {
    Arc::new(Wallet::new("wallet", balance))
}

/// Reads the balance of an [`Account`] or [`Wallet`] without going through a context.
pub fn balance_of(player: &PlayerRef) -> i64 {
    if let Some(account) = downcast_player::<Account>(player) {
        return account.balance();
    }
    if let Some(wallet) = downcast_player::<Wallet>(player) {
        return wallet.balance();
    }
    panic!("not a test ledger player: {player:?}");
}

/// First argument as an integer amount, defaulting to 1.
pub fn amount(args: &[Value]) -> RoleResult<i64> {
    match args.first() {
        None => Ok(1),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| anyhow!("amount must be an integer, got {value}").into()),
    }
}

/// Behavior set for the `source` role: moves funds to `destination`.
pub fn source_behavior(kind: BehaviorKind) -> BehaviorSet {
    BehaviorSet::new("Source", kind).define("transfer_out", |call, args| {
        let n = amount(args)?;
        call.send_self("debit", &[json!(n)])?;
        call.send("destination", "receive", &[json!(n)])
    })
}

/// Behavior set for the `destination` role.
pub fn destination_behavior(kind: BehaviorKind) -> BehaviorSet {
    BehaviorSet::new("Destination", kind).define("receive", |call, args| {
        call.send_self("credit", &[json!(amount(args)?)])
    })
}

/// The money-transfer context with the given role kinds.
///
/// Triggers:
/// - `transfer`: moves `args[0]` (default 1) from `source` to `destination`
/// - `fail_after_transfer`: transfers, then fails with "boom"
pub fn transfer_class(
    source: BehaviorKind,
    destination: BehaviorKind,
    policy: ApplyPolicy,
) -> Arc<ContextClass> {
    ContextClass::builder("MoneyTransfer")
        .role("source", source_behavior(source))
        .role("destination", destination_behavior(destination))
        .apply(policy)
        .trigger("transfer", |ctx, args| {
            ctx.send("source", "transfer_out", args)
        })
        .trigger("fail_after_transfer", |ctx, args| {
            ctx.send("source", "transfer_out", args)?;
            Err(anyhow!("boom").into())
        })
        .build()
        .expect("transfer class declares no duplicates")
}

/// Installs a test subscriber so `RUST_LOG=troupe_core=debug` shows casting events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
