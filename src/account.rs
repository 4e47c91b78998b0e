use std::{fmt, str::FromStr};

use chrono::{Local, NaiveDateTime, SubsecRound};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{AccountCommand, AccountCommandError, CommandAction, Pin, opening_amount};

pub type AccountNumber = String;

const TRANSFER_TO: &str = "Transfer to ";
const TRANSFER_FROM: &str = "Transfer from ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransactionKind {
    OpeningBalance,
    Deposit,
    Withdrawal,
    TransferTo(AccountNumber),
    TransferFrom(AccountNumber),
}

impl TransactionKind {
    /// The other side of a transfer, if this kind is a transfer leg.
    pub fn counterparty(&self) -> Option<&AccountNumber> {
        match self {
            Self::TransferTo(acc) | Self::TransferFrom(acc) => Some(acc),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpeningBalance => f.write_str("Opening Balance"),
            Self::Deposit => f.write_str("Deposit"),
            Self::Withdrawal => f.write_str("Withdrawal"),
            Self::TransferTo(acc) => write!(f, "{TRANSFER_TO}{acc}"),
            Self::TransferFrom(acc) => write!(f, "{TRANSFER_FROM}{acc}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown transaction type `{0}`")]
pub struct UnknownTransactionKind(String);

impl FromStr for TransactionKind {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Opening Balance" => Ok(Self::OpeningBalance),
            "Deposit" => Ok(Self::Deposit),
            "Withdrawal" => Ok(Self::Withdrawal),
            _ => {
                if let Some(acc) = s.strip_prefix(TRANSFER_TO) {
                    Ok(Self::TransferTo(acc.to_owned()))
                } else if let Some(acc) = s.strip_prefix(TRANSFER_FROM) {
                    Ok(Self::TransferFrom(acc.to_owned()))
                } else {
                    Err(UnknownTransactionKind(s.to_owned()))
                }
            }
        }
    }
}

impl TryFrom<String> for TransactionKind {
    type Error = UnknownTransactionKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransactionKind> for String {
    fn from(kind: TransactionKind) -> Self {
        kind.to_string()
    }
}

/// Informational label, has no effect on account behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountType {
    #[default]
    Savings,
    Current,
    Other(String),
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Savings => f.write_str("Savings"),
            Self::Current => f.write_str("Current"),
            Self::Other(label) => f.write_str(label),
        }
    }
}

impl From<&str> for AccountType {
    fn from(label: &str) -> Self {
        match label.trim() {
            "" | "Savings" => Self::Savings,
            "Current" => Self::Current,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for AccountType {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<AccountType> for String {
    fn from(kind: AccountType) -> Self {
        kind.to_string()
    }
}

/// Immutable record of a single balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "timestamp_format")]
    timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    kind: TransactionKind,
    amount: Decimal,
    #[serde(rename = "receiver")]
    counterparty: Option<AccountNumber>,
    balance_after: Decimal,
}

impl Transaction {
    fn new(kind: TransactionKind, amount: Decimal, balance_after: Decimal) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            counterparty: kind.counterparty().cloned(),
            kind,
            amount,
            balance_after,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    /// Positive for inflows, negative for outflows.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn counterparty(&self) -> Option<&AccountNumber> {
        self.counterparty.as_ref()
    }

    pub fn balance_after(&self) -> Decimal {
        self.balance_after
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient funds: balance is {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("Amount {amount} would overflow the balance of {balance}")]
    BalanceOverflow { balance: Decimal, amount: Decimal },
    #[error("Transaction does not follow balance {balance}, expected balance after {balance_after}")]
    StaleTransaction {
        balance: Decimal,
        balance_after: Decimal,
    },
    #[error(transparent)]
    Command(#[from] AccountCommandError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    account_number: AccountNumber,
    #[serde(rename = "name")]
    owner_name: String,
    balance: Decimal,
    pin: Pin,
    account_type: AccountType,
    #[serde(rename = "transactions")]
    history: Vec<Transaction>,
}

impl Account {
    /// New account whose history starts with a single "Opening Balance" record.
    pub(crate) fn open(
        account_number: AccountNumber,
        owner_name: String,
        opening_balance: Decimal,
        pin: Pin,
        account_type: AccountType,
    ) -> Result<Self, AccountError> {
        let opening_balance = opening_amount(opening_balance)?;
        Ok(Self {
            account_number,
            owner_name,
            balance: opening_balance,
            pin,
            account_type,
            history: vec![Transaction::new(
                TransactionKind::OpeningBalance,
                opening_balance,
                opening_balance,
            )],
        })
    }

    pub fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn account_type(&self) -> &AccountType {
        &self.account_type
    }

    /// All records in the order they were applied.
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub(crate) fn verify_pin(&self, candidate: &str) -> bool {
        self.pin.matches(candidate)
    }

    /// Validates the command against current state and returns the record it would produce.
    /// Nothing is changed until the record is passed to [`Account::apply`].
    pub(crate) fn handle(&self, command: &AccountCommand) -> Result<Transaction, AccountError> {
        let amount = command.amount();
        match command.action() {
            CommandAction::Deposit => Ok(Transaction::new(
                TransactionKind::Deposit,
                amount,
                self.credited(amount)?,
            )),
            CommandAction::ReceiveTransfer(from) => Ok(Transaction::new(
                TransactionKind::TransferFrom(from.clone()),
                amount,
                self.credited(amount)?,
            )),
            CommandAction::Withdraw(kind) => {
                if self.balance < amount {
                    return Err(AccountError::InsufficientFunds {
                        balance: self.balance,
                        requested: amount,
                    });
                }
                Ok(Transaction::new(kind.clone(), -amount, self.balance - amount))
            }
        }
    }

    fn credited(&self, amount: Decimal) -> Result<Decimal, AccountError> {
        self.balance
            .checked_add(amount)
            .ok_or(AccountError::BalanceOverflow {
                balance: self.balance,
                amount,
            })
    }

    /// Applies a record produced by [`Account::handle`] on the current balance.
    /// A record built against an older balance, or one already applied, is rejected.
    pub(crate) fn apply(&mut self, transaction: Transaction) -> Result<&Transaction, AccountError> {
        let balance_after = self.balance.checked_add(transaction.amount);
        if balance_after != Some(transaction.balance_after)
            || transaction.balance_after < Decimal::ZERO
        {
            return Err(AccountError::StaleTransaction {
                balance: self.balance,
                balance_after: transaction.balance_after,
            });
        }
        self.balance = transaction.balance_after;
        self.history.push(transaction);
        Ok(&self.history[self.history.len() - 1])
    }

    pub fn execute(&mut self, command: &AccountCommand) -> Result<&Transaction, AccountError> {
        let transaction = self.handle(command)?;
        self.apply(transaction)
    }

    pub fn deposit(&mut self, amount: Decimal) -> Result<&Transaction, AccountError> {
        self.execute(&AccountCommand::deposit(amount)?)
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<&Transaction, AccountError> {
        self.execute(&AccountCommand::withdraw(amount)?)
    }

    pub fn record_incoming_transfer(
        &mut self,
        amount: Decimal,
        from: AccountNumber,
    ) -> Result<&Transaction, AccountError> {
        self.execute(&AccountCommand::receive_transfer(amount, from)?)
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)
    }
}
