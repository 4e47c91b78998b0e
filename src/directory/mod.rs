use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{Account, AccountError, AccountNumber, AccountType},
    command::AccountCommandError,
    storage::StorageError,
};

pub mod persistent_directory;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    CommandErr(#[from] AccountCommandError),
    #[error(transparent)]
    AccountErr(#[from] AccountError),
    #[error("Account {0} not found")]
    AccountNotFound(AccountNumber),
    #[error("Incorrect PIN for account {0}")]
    AuthenticationFailed(AccountNumber),
    #[error("Cannot transfer to the same account")]
    InvalidTransfer,
}

/// Proof of a successful login, only handed out by [`AccountDirectory::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    account_number: AccountNumber,
}

impl AccountHandle {
    pub(crate) fn new(account_number: AccountNumber) -> Self {
        Self { account_number }
    }

    pub fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }
}

/// Owner of all accounts. Every balance change goes through here so that
/// it can be persisted.
pub trait AccountDirectory {
    fn create_account(
        &mut self,
        owner_name: &str,
        initial_deposit: Decimal,
        pin: &str,
        account_type: AccountType,
    ) -> Result<AccountNumber, DirectoryError>;

    fn authenticate(&self, account_number: &str, pin: &str)
    -> Result<AccountHandle, DirectoryError>;

    fn account(&self, handle: &AccountHandle) -> Result<&Account, DirectoryError>;

    fn balance(&self, handle: &AccountHandle) -> Result<Decimal, DirectoryError> {
        Ok(self.account(handle)?.balance())
    }

    /// Returns the balance after the deposit.
    fn deposit(&mut self, handle: &AccountHandle, amount: Decimal)
    -> Result<Decimal, DirectoryError>;

    /// Returns the balance after the withdrawal.
    fn withdraw(
        &mut self,
        handle: &AccountHandle,
        amount: Decimal,
    ) -> Result<Decimal, DirectoryError>;

    /// Moves `amount` from the sender to the receiver. Either both sides
    /// change or neither does.
    fn transfer(
        &mut self,
        sender: &AccountHandle,
        receiver: &str,
        amount: Decimal,
    ) -> Result<(), DirectoryError>;

    /// Flushes the current state, reporting failure to the caller.
    fn save(&self) -> Result<(), StorageError>;
}
