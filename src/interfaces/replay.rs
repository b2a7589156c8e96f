use super::csv::command_reader::{CommandKind, CommandRecord};
use crate::application::Marketplace;
use crate::domain::account::{Account, AccountOwner};
use crate::domain::actor::{Actor, TenantId};
use crate::domain::order::{OrderDraft, OrderId, OrderPatch};
use crate::domain::payment::SettlementOutcome;
use crate::domain::withdrawal::WithdrawalId;
use crate::error::{MarketError, Result};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Applies command records to a [`Marketplace`], resolving the labels rows
/// use to refer to orders and withdrawals created earlier in the same log.
///
/// Labels live only as long as the replayer. A target that is not a known
/// label falls back to an order number or a withdrawal id, which is how a
/// later run against the same database refers to earlier records.
pub struct Replayer {
    market: Marketplace,
    orders: HashMap<String, OrderId>,
    withdrawals: HashMap<String, WithdrawalId>,
}

impl Replayer {
    pub fn new(market: Marketplace) -> Self {
        Self {
            market,
            orders: HashMap::new(),
            withdrawals: HashMap::new(),
        }
    }

    pub fn market(&self) -> &Marketplace {
        &self.market
    }

    #[instrument(skip_all, fields(command = ?record.command, actor = record.actor))]
    pub async fn apply(&mut self, record: CommandRecord) -> Result<()> {
        let actor = record.actor();
        let market = &self.market;
        match record.command {
            CommandKind::OpenAccount => {
                market.ledger.open_account(owner(&record)?).await?;
            }
            CommandKind::Credit => {
                let account = market.ledger.account_for(owner(&record)?).await?;
                market
                    .ledger
                    .increase_balance(account.id, record.amount()?)
                    .await?;
            }
            CommandKind::CreateOrder => {
                let label = record.target()?.to_string();
                if self.orders.contains_key(&label) {
                    return Err(MarketError::AlreadyExists(format!("order label `{label}`")));
                }
                let tenant = actor.tenant_id.ok_or_else(|| {
                    MarketError::Validation("create_order requires the actor's tenant".to_string())
                })?;
                let draft = OrderDraft {
                    remark: record.detail.clone(),
                    ..OrderDraft::with_amount(record.amount()?)
                };
                let order = market.orders.create(tenant, &actor, draft).await?;
                info!(label = %label, order_no = %order.order_no, "Order label bound");
                self.orders.insert(label, order.id);
            }
            CommandKind::Assign => {
                let assignee = assignee(record.detail()?)?;
                market
                    .orders
                    .assign(self.order(&record).await?, &actor, &assignee)
                    .await?;
            }
            CommandKind::Claim => {
                market.orders.claim(self.order(&record).await?, &actor).await?;
            }
            CommandKind::Start => {
                market.orders.start(self.order(&record).await?, &actor).await?;
            }
            CommandKind::Complete => {
                market.orders.complete(self.order(&record).await?, &actor).await?;
            }
            CommandKind::Cancel => {
                market
                    .orders
                    .cancel(self.order(&record).await?, &actor, record.detail.clone())
                    .await?;
            }
            CommandKind::Update => {
                let patch = OrderPatch {
                    amount: record.amount,
                    remark: record.detail.clone().filter(|d| !d.is_empty()),
                    ..OrderPatch::default()
                };
                market
                    .orders
                    .update(self.order(&record).await?, &actor, patch)
                    .await?;
            }
            CommandKind::Settle => {
                market.orders.settle(self.order(&record).await?).await?;
            }
            CommandKind::Callback => {
                let (outcome, transaction_no) = callback(record.detail()?)?;
                market
                    .settlement
                    .handle_callback(self.order(&record).await?, transaction_no, outcome)
                    .await?;
            }
            CommandKind::Withdraw => {
                let label = record.target()?.to_string();
                if self.withdrawals.contains_key(&label) {
                    return Err(MarketError::AlreadyExists(format!(
                        "withdrawal label `{label}`"
                    )));
                }
                let info = payout_info(record.detail.as_deref());
                let withdrawal = market
                    .withdrawals
                    .create(&actor, record.amount()?, info)
                    .await?;
                info!(label = %label, withdrawal_id = %withdrawal.id, "Withdrawal label bound");
                self.withdrawals.insert(label, withdrawal.id);
            }
            CommandKind::ProcessWithdrawal => {
                market
                    .withdrawals
                    .mark_processing(self.withdrawal(&record).await?, &actor)
                    .await?;
            }
            CommandKind::ApproveWithdrawal => {
                market
                    .withdrawals
                    .approve(self.withdrawal(&record).await?, &actor)
                    .await?;
            }
            CommandKind::RejectWithdrawal => {
                let reason = record.detail.clone().unwrap_or_default();
                market
                    .withdrawals
                    .reject(self.withdrawal(&record).await?, &actor, reason)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.market.ledger.list_accounts().await
    }

    async fn order(&self, record: &CommandRecord) -> Result<OrderId> {
        let label = record.target()?;
        if let Some(id) = self.orders.get(label) {
            return Ok(*id);
        }
        match self.market.orders.find_by_order_no(label).await {
            Ok(order) => Ok(order.id),
            Err(MarketError::NotFound(_)) => {
                Err(MarketError::NotFound(format!("order label `{label}`")))
            }
            Err(e) => Err(e),
        }
    }

    async fn withdrawal(&self, record: &CommandRecord) -> Result<WithdrawalId> {
        let label = record.target()?;
        if let Some(id) = self.withdrawals.get(label) {
            return Ok(*id);
        }
        let not_found = || MarketError::NotFound(format!("withdrawal label `{label}`"));
        let id = label.parse().map(WithdrawalId).map_err(|_| not_found())?;
        match self.market.withdrawals.get(id).await {
            Ok(withdrawal) => Ok(withdrawal.id),
            Err(MarketError::NotFound(_)) => Err(not_found()),
            Err(e) => Err(e),
        }
    }
}

/// `user` or `user:tenant`, always dispatched as a worker.
fn assignee(detail: &str) -> Result<Actor> {
    let invalid = || MarketError::Validation(format!("invalid assignee `{detail}`"));
    let (user, tenant) = match detail.split_once(':') {
        Some((user, tenant)) => (user, Some(tenant.trim().parse().map_err(|_| invalid())?)),
        None => (detail, None),
    };
    let user = user.trim().parse().map_err(|_| invalid())?;
    Ok(Actor::worker(user, tenant))
}

/// `success:TX` or `failed:TX`.
fn callback(detail: &str) -> Result<(SettlementOutcome, String)> {
    let invalid = || MarketError::Validation(format!("invalid callback `{detail}`"));
    let (outcome, transaction_no) = detail.split_once(':').ok_or_else(invalid)?;
    let outcome = match outcome.trim() {
        "success" => SettlementOutcome::Success,
        "failed" => SettlementOutcome::Failed,
        _ => return Err(invalid()),
    };
    let transaction_no = transaction_no.trim();
    if transaction_no.is_empty() {
        return Err(invalid());
    }
    Ok((outcome, transaction_no.to_string()))
}

/// Owner named by `target`, or the acting user when the column is empty.
fn owner(record: &CommandRecord) -> Result<AccountOwner> {
    match record.target.as_deref() {
        None | Some("") => Ok(AccountOwner::User(record.actor().user_id)),
        Some("tenant") => record
            .tenant
            .map(|t| AccountOwner::Tenant(TenantId(t)))
            .ok_or_else(|| MarketError::Validation("`tenant` owner requires a tenant".to_string())),
        Some(other) => other.parse(),
    }
}

/// Payout details are opaque; JSON is kept as-is, anything else as a string.
fn payout_info(detail: Option<&str>) -> serde_json::Value {
    match detail {
        None => serde_json::Value::Null,
        Some(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    }
}
