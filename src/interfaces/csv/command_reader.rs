use crate::domain::actor::{Actor, Role, TenantId, UserId};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    OpenAccount,
    Credit,
    CreateOrder,
    Assign,
    Claim,
    Start,
    Complete,
    Cancel,
    Update,
    Settle,
    Callback,
    Withdraw,
    ProcessWithdrawal,
    ApproveWithdrawal,
    RejectWithdrawal,
}

/// One row of a command log.
///
/// `target` names the subject of the command: an account owner
/// (`user:7`, `tenant:2`, `platform`) for ledger commands, otherwise a label
/// chosen by the log author when an order or withdrawal is created and
/// reused by later rows. Orders from an earlier run are addressed by order
/// number and withdrawals by id.
///
/// `detail` carries the free-text argument: the remark of an order, the
/// reason of a cancellation or rejection, payout info, the assignee of
/// `assign` (`user` or `user:tenant`) and the `success:TX` / `failed:TX`
/// outcome of `callback`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub command: CommandKind,
    pub actor: u64,
    pub role: Role,
    pub tenant: Option<u64>,
    pub target: Option<String>,
    pub amount: Option<Decimal>,
    pub detail: Option<String>,
}

impl CommandRecord {
    pub fn actor(&self) -> Actor {
        Actor::new(UserId(self.actor), self.tenant.map(TenantId), self.role)
    }

    pub fn target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MarketError::Validation(format!("{:?} requires a target", self.command)))
    }

    pub fn detail(&self) -> Result<&str> {
        self.detail
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| MarketError::Validation(format!("{:?} requires a detail", self.command)))
    }

    pub fn amount(&self) -> Result<Decimal> {
        self.amount
            .ok_or_else(|| MarketError::Validation(format!("{:?} requires an amount", self.command)))
    }
}

/// Reads command records from a CSV source.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error and reading continues.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(MarketError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "command, actor, role, tenant, target, amount, detail\n";

    #[test]
    fn test_reads_commands_with_optional_columns() {
        let data = format!(
            "{HEADER}create_order, 10, tenant_staff, 1, job-1, 100.00, fragile\nclaim, 20, worker, 2, job-1\n"
        );
        let commands: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();
        assert_eq!(commands.len(), 2);

        let create = commands[0].as_ref().unwrap();
        assert_eq!(create.command, CommandKind::CreateOrder);
        assert_eq!(create.actor(), Actor::tenant_staff(10, 1));
        assert_eq!(create.amount().unwrap(), dec!(100.00));
        assert_eq!(create.detail.as_deref(), Some("fragile"));

        let claim = commands[1].as_ref().unwrap();
        assert_eq!(claim.target().unwrap(), "job-1");
        assert!(claim.amount.is_none());
        assert!(matches!(claim.amount(), Err(MarketError::Validation(_))));
        assert!(matches!(claim.detail(), Err(MarketError::Validation(_))));
    }

    #[test]
    fn test_reads_dispatch_and_callback_commands() {
        let data = format!(
            "{HEADER}assign, 1, platform_admin,, job-1,, 20:2\nupdate, 10, tenant_staff, 1, job-1, 120,\ncallback, 0, platform_admin,, job-1,, success:GW-1\n"
        );
        let commands: Vec<_> = CommandReader::new(data.as_bytes())
            .commands()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(commands[0].command, CommandKind::Assign);
        assert_eq!(commands[0].detail().unwrap(), "20:2");
        assert_eq!(commands[1].command, CommandKind::Update);
        assert_eq!(commands[1].amount().unwrap(), dec!(120));
        assert_eq!(commands[2].command, CommandKind::Callback);
        assert_eq!(commands[2].detail().unwrap(), "success:GW-1");
    }

    #[test]
    fn test_malformed_rows_do_not_stop_the_stream() {
        let data = format!("{HEADER}teleport, 1, worker,,,,\nstart, 1, worker,, job-1,,\n");
        let commands: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();
        assert!(matches!(commands[0], Err(MarketError::Csv(_))));
        let start = commands[1].as_ref().unwrap();
        assert_eq!(start.actor(), Actor::worker(1, None));
    }
}
