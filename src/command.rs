use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{AccountNumber, TransactionKind};

pub const PIN_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Open,
    Deposit,
    Withdraw,
    Transfer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountCommandError {
    #[error("Amount for {action:?} must be positive, got {amount}")]
    InvalidAmount {
        action: AccountAction,
        amount: Decimal,
    },
    #[error("Invalid PIN format, must be a {PIN_LENGTH}-digit number")]
    InvalidCredential,
}

/// Account credential. Only ever compared for equality, never displayed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin(String);

impl Pin {
    pub fn parse(pin: &str) -> Result<Self, AccountCommandError> {
        if pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(pin.to_owned()))
        } else {
            Err(AccountCommandError::InvalidCredential)
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

impl TryFrom<String> for Pin {
    type Error = AccountCommandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Deposit,
    Withdraw(TransactionKind),
    ReceiveTransfer(AccountNumber),
}

/// A balance change that already passed amount validation.
///
/// Only the constructors below can build one, and they reject
/// non-positive amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCommand {
    action: CommandAction,
    amount: Decimal,
}

impl AccountCommand {
    pub fn deposit(amount: Decimal) -> Result<Self, AccountCommandError> {
        Ok(Self {
            action: CommandAction::Deposit,
            amount: positive_amount(amount, AccountAction::Deposit)?,
        })
    }

    pub fn withdraw(amount: Decimal) -> Result<Self, AccountCommandError> {
        Ok(Self {
            action: CommandAction::Withdraw(TransactionKind::Withdrawal),
            amount: positive_amount(amount, AccountAction::Withdraw)?,
        })
    }

    /// Outgoing leg of a transfer, tagged so the sender's history shows the receiver.
    pub fn send_transfer(amount: Decimal, to: AccountNumber) -> Result<Self, AccountCommandError> {
        Ok(Self {
            action: CommandAction::Withdraw(TransactionKind::TransferTo(to)),
            amount: positive_amount(amount, AccountAction::Transfer)?,
        })
    }

    pub fn receive_transfer(
        amount: Decimal,
        from: AccountNumber,
    ) -> Result<Self, AccountCommandError> {
        Ok(Self {
            action: CommandAction::ReceiveTransfer(from),
            amount: positive_amount(amount, AccountAction::Transfer)?,
        })
    }

    pub fn action(&self) -> &CommandAction {
        &self.action
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Opening balances may be zero, unlike every other amount.
pub fn opening_amount(amount: Decimal) -> Result<Decimal, AccountCommandError> {
    if amount < Decimal::ZERO {
        return Err(AccountCommandError::InvalidAmount {
            action: AccountAction::Open,
            amount,
        });
    }
    Ok(amount)
}

fn positive_amount(amount: Decimal, action: AccountAction) -> Result<Decimal, AccountCommandError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(AccountCommandError::InvalidAmount { action, amount })
    }
}
