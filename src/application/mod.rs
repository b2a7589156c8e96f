//! Application layer orchestrating the marketplace use cases.
//!
//! Services hold their store ports as shared trait objects and never talk to
//! each other through globals: [`Marketplace`] wires one store into all of
//! them.

pub mod commission;
pub mod ledger;
pub mod order;
pub mod settlement;
pub mod withdrawal;

use crate::domain::order::{OrderNumberSource, RandomOrderNumbers};
use crate::domain::ports::MarketStore;
use commission::CommissionEngine;
use ledger::LedgerService;
use order::OrderService;
use settlement::SettlementService;
use std::sync::Arc;
use withdrawal::WithdrawalService;

/// Composition root: every service backed by the same store.
#[derive(Clone)]
pub struct Marketplace {
    pub ledger: LedgerService,
    pub commissions: CommissionEngine,
    pub settlement: SettlementService,
    pub orders: OrderService,
    pub withdrawals: WithdrawalService,
}

impl Marketplace {
    pub fn new<S: MarketStore + 'static>(store: Arc<S>) -> Self {
        Self::with_order_numbers(store, Arc::new(RandomOrderNumbers))
    }

    pub fn with_order_numbers<S: MarketStore + 'static>(
        store: Arc<S>,
        numbers: Arc<dyn OrderNumberSource>,
    ) -> Self {
        let commissions = CommissionEngine::new(store.clone(), store.clone(), store.clone());
        let settlement = SettlementService::new(store.clone(), store.clone(), commissions.clone());
        let orders = OrderService::new(store.clone(), numbers, settlement.clone());
        Self {
            ledger: LedgerService::new(store.clone()),
            commissions,
            settlement,
            orders,
            withdrawals: WithdrawalService::new(store.clone(), store.clone(), store),
        }
    }
}
