use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::{
    account::{Account, AccountNumber, AccountType},
    command::{AccountCommand, Pin, opening_amount},
    storage::{DirectoryState, Storage, StorageError},
};

use super::{AccountDirectory, AccountHandle, DirectoryError};

/// Directory that writes its whole state to `S` after every change.
///
/// Only one session is expected at a time, there is no locking around the
/// read-modify-write of balances.
pub struct PersistentDirectory<S> {
    state: DirectoryState,
    storage: S,
}

impl<S: Storage> PersistentDirectory<S> {
    /// Loads the stored state, falling back to an empty directory when there
    /// is nothing stored or the stored data cannot be read.
    pub fn open(storage: S) -> Self {
        let state = match storage.load() {
            Ok(Some(state)) => {
                info!(accounts = state.accounts.len(), "Bank data loaded");
                state
            }
            Ok(None) => {
                info!("No bank data found, starting fresh");
                DirectoryState::default()
            }
            Err(err) => {
                error!(%err, "Failed to load bank data, starting with an empty bank");
                DirectoryState::default()
            }
        };
        Self { state, storage }
    }

    pub fn state(&self) -> &DirectoryState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Failures are logged only, the in-memory change stays.
    fn persist(&self) {
        if let Err(err) = self.storage.save(&self.state) {
            error!(%err, "Failed to save bank data");
        }
    }

    fn get(&self, account_number: &str) -> Result<&Account, DirectoryError> {
        self.state
            .accounts
            .get(account_number)
            .ok_or_else(|| DirectoryError::AccountNotFound(account_number.to_owned()))
    }

    fn get_mut(&mut self, account_number: &str) -> Result<&mut Account, DirectoryError> {
        self.state
            .accounts
            .get_mut(account_number)
            .ok_or_else(|| DirectoryError::AccountNotFound(account_number.to_owned()))
    }

    fn execute(
        &mut self,
        handle: &AccountHandle,
        command: AccountCommand,
    ) -> Result<Decimal, DirectoryError> {
        let acc = self.get_mut(handle.account_number())?;
        let balance = acc.execute(&command)?.balance_after();
        self.persist();
        Ok(balance)
    }
}

impl<S: Storage> AccountDirectory for PersistentDirectory<S> {
    fn create_account(
        &mut self,
        owner_name: &str,
        initial_deposit: Decimal,
        pin: &str,
        account_type: AccountType,
    ) -> Result<AccountNumber, DirectoryError> {
        let initial_deposit = opening_amount(initial_deposit)?;
        let pin = Pin::parse(pin)?;
        let account_number = self.state.next_account_number.to_string();
        let acc = Account::open(
            account_number.clone(),
            owner_name.to_owned(),
            initial_deposit,
            pin,
            account_type,
        )?;
        self.state.accounts.insert(account_number.clone(), acc);
        self.state.next_account_number += 1;
        info!(%account_number, "Account created");
        self.persist();
        Ok(account_number)
    }

    fn authenticate(
        &self,
        account_number: &str,
        pin: &str,
    ) -> Result<AccountHandle, DirectoryError> {
        let acc = self.get(account_number)?;
        if !acc.verify_pin(pin) {
            warn!(%account_number, "Authentication failed");
            return Err(DirectoryError::AuthenticationFailed(
                account_number.to_owned(),
            ));
        }
        Ok(AccountHandle::new(acc.account_number().clone()))
    }

    fn account(&self, handle: &AccountHandle) -> Result<&Account, DirectoryError> {
        self.get(handle.account_number())
    }

    fn deposit(
        &mut self,
        handle: &AccountHandle,
        amount: Decimal,
    ) -> Result<Decimal, DirectoryError> {
        self.execute(handle, AccountCommand::deposit(amount)?)
    }

    fn withdraw(
        &mut self,
        handle: &AccountHandle,
        amount: Decimal,
    ) -> Result<Decimal, DirectoryError> {
        self.execute(handle, AccountCommand::withdraw(amount)?)
    }

    fn transfer(
        &mut self,
        sender: &AccountHandle,
        receiver: &str,
        amount: Decimal,
    ) -> Result<(), DirectoryError> {
        let receiver_acc = self.get(receiver)?;
        if receiver == sender.account_number().as_str() {
            return Err(DirectoryError::InvalidTransfer);
        }
        let debit = AccountCommand::send_transfer(amount, receiver.to_owned())?;
        let credit = AccountCommand::receive_transfer(amount, sender.account_number().clone())?;

        // Both sides are validated before either is applied, including the
        // credit overflowing the receiver. The records are built against the
        // balances they are applied to, so neither apply can fail.
        let credit_tx = receiver_acc.handle(&credit)?;
        let debit_tx = self.get(sender.account_number())?.handle(&debit)?;

        self.get_mut(sender.account_number())?.apply(debit_tx)?;
        self.get_mut(receiver)?.apply(credit_tx)?;
        info!(from = %sender.account_number(), to = %receiver, %amount, "Transfer completed");
        self.persist();
        Ok(())
    }

    fn save(&self) -> Result<(), StorageError> {
        self.storage.save(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::{
        account::{AccountError, TransactionKind},
        command::AccountCommandError,
        storage::{FIRST_ACCOUNT_NUMBER, InMemoryStorage},
    };

    use super::*;

    fn directory() -> PersistentDirectory<InMemoryStorage> {
        PersistentDirectory::open(InMemoryStorage::default())
    }

    #[test]
    fn create_allocates_sequential_numbers() {
        let mut dir = directory();
        assert_eq!(dir.state().next_account_number, FIRST_ACCOUNT_NUMBER);

        let first = dir
            .create_account("Ada", dec!(100), "1234", AccountType::Savings)
            .unwrap();
        let second = dir
            .create_account("Bob", Decimal::ZERO, "0000", AccountType::Current)
            .unwrap();
        assert_eq!(first, "1001");
        assert_eq!(second, "1002");
        assert_eq!(dir.state().next_account_number, 1003);
        assert_eq!(dir.state().accounts.len(), 2);

        // state was persisted after creation
        let stored = dir.storage().load().unwrap().unwrap();
        assert_eq!(&stored, dir.state());
    }

    #[test]
    fn create_rejects_bad_input() {
        let mut dir = directory();
        let err = dir
            .create_account("Ada", dec!(-1), "1234", AccountType::Savings)
            .unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::CommandErr(AccountCommandError::InvalidAmount { .. })
        ));
        let err = dir
            .create_account("Ada", dec!(1), "12345", AccountType::Savings)
            .unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::CommandErr(AccountCommandError::InvalidCredential)
        ));
        assert!(dir.state().accounts.is_empty());
        assert_eq!(dir.state().next_account_number, FIRST_ACCOUNT_NUMBER);
        assert!(dir.storage().document().is_none());
    }

    #[test]
    fn authenticate() {
        let mut dir = directory();
        let number = dir
            .create_account("Ada", dec!(100), "1234", AccountType::Savings)
            .unwrap();

        let handle = dir.authenticate(&number, "1234").unwrap();
        assert_eq!(handle.account_number(), &number);
        assert_eq!(dir.account(&handle).unwrap().owner_name(), "Ada");

        assert!(matches!(
            dir.authenticate(&number, "4321"),
            Err(DirectoryError::AuthenticationFailed(n)) if n == number
        ));
        assert!(matches!(
            dir.authenticate("9999", "1234"),
            Err(DirectoryError::AccountNotFound(n)) if n == "9999"
        ));
    }

    #[test]
    fn scenario() {
        let mut dir = directory();
        let first = dir
            .create_account("Ada", dec!(100), "1234", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&first, "1234").unwrap();

        assert_eq!(dir.deposit(&ada, dec!(50)).unwrap(), dec!(150));
        assert_eq!(dir.account(&ada).unwrap().history().len(), 2);

        let err = dir.withdraw(&ada, dec!(200)).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::AccountErr(AccountError::InsufficientFunds { .. })
        ));
        assert_eq!(dir.balance(&ada).unwrap(), dec!(150));

        let second = dir
            .create_account("Bob", Decimal::ZERO, "0000", AccountType::Current)
            .unwrap();
        dir.transfer(&ada, &second, dec!(100)).unwrap();

        let bob = dir.authenticate(&second, "0000").unwrap();
        assert_eq!(dir.balance(&ada).unwrap(), dec!(50));
        assert_eq!(dir.balance(&bob).unwrap(), dec!(100));

        let last = dir.account(&ada).unwrap().history().last().unwrap();
        assert_eq!(last.kind(), &TransactionKind::TransferTo(second.clone()));
        assert_eq!(last.amount(), dec!(-100));
        let last = dir.account(&bob).unwrap().history().last().unwrap();
        assert_eq!(last.kind(), &TransactionKind::TransferFrom(first.clone()));
        assert_eq!(last.amount(), dec!(100));
        assert_eq!(last.counterparty(), Some(&first));
    }

    #[test]
    fn failed_transfer_changes_nothing() {
        let mut dir = directory();
        let first = dir
            .create_account("Ada", dec!(30), "1234", AccountType::Savings)
            .unwrap();
        let second = dir
            .create_account("Bob", dec!(5), "0000", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&first, "1234").unwrap();
        let before = dir.state().clone();

        let err = dir.transfer(&ada, &second, dec!(31)).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::AccountErr(AccountError::InsufficientFunds { .. })
        ));
        let err = dir.transfer(&ada, "2000", dec!(1)).unwrap_err();
        assert!(matches!(err, DirectoryError::AccountNotFound(_)));
        let err = dir.transfer(&ada, &second, Decimal::ZERO).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::CommandErr(AccountCommandError::InvalidAmount { .. })
        ));

        assert_eq!(dir.state(), &before);
    }

    #[test]
    fn overflowing_credit_changes_nothing() {
        let mut dir = directory();
        let full = dir
            .create_account("Ada", Decimal::MAX, "1234", AccountType::Savings)
            .unwrap();
        let other = dir
            .create_account("Bob", dec!(10), "0000", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&full, "1234").unwrap();
        let bob = dir.authenticate(&other, "0000").unwrap();
        let before = dir.state().clone();

        let err = dir.deposit(&ada, dec!(1)).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::AccountErr(AccountError::BalanceOverflow { .. })
        ));
        let err = dir.transfer(&bob, &full, dec!(5)).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::AccountErr(AccountError::BalanceOverflow { .. })
        ));
        assert_eq!(dir.state(), &before);
    }

    #[test]
    fn self_transfer_is_rejected() {
        let mut dir = directory();
        let first = dir
            .create_account("Ada", dec!(30), "1234", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&first, "1234").unwrap();
        let before = dir.state().clone();

        // regardless of the amount being valid or affordable
        for amount in [dec!(1), dec!(1000), dec!(-3)] {
            assert!(matches!(
                dir.transfer(&ada, &first, amount),
                Err(DirectoryError::InvalidTransfer)
            ));
        }
        assert_eq!(dir.state(), &before);
    }

    #[test]
    fn transfer_conserves_money() {
        let mut dir = directory();
        let a = dir
            .create_account("Ada", dec!(80.40), "1234", AccountType::Savings)
            .unwrap();
        let b = dir
            .create_account("Bob", dec!(19.60), "0000", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&a, "1234").unwrap();
        let bob = dir.authenticate(&b, "0000").unwrap();

        for (amount, ok) in [(dec!(10.10), true), (dec!(70.30), true), (dec!(0.01), false)] {
            let total_before = dir.balance(&ada).unwrap() + dir.balance(&bob).unwrap();
            assert_eq!(dir.transfer(&ada, &b, amount).is_ok(), ok);
            let total_after = dir.balance(&ada).unwrap() + dir.balance(&bob).unwrap();
            assert_eq!(total_before, total_after);
            assert!(dir.balance(&ada).unwrap() >= Decimal::ZERO);
        }
        assert_eq!(dir.balance(&ada).unwrap(), Decimal::ZERO);
        assert_eq!(dir.balance(&bob).unwrap(), dec!(100));
    }

    /// Deterministic xorshift, enough to mix operations and amounts.
    struct Steps(u64);

    impl Steps {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    fn assert_ledger_consistent(dir: &PersistentDirectory<InMemoryStorage>) {
        for acc in dir.state().accounts.values() {
            assert!(acc.balance() >= Decimal::ZERO, "{} went negative", acc.account_number());
            let history = acc.history();
            assert_eq!(history[0].kind(), &TransactionKind::OpeningBalance);
            assert_eq!(history[0].amount(), history[0].balance_after());
            for pair in history.windows(2) {
                assert_eq!(pair[0].balance_after() + pair[1].amount(), pair[1].balance_after());
            }
            assert_eq!(history.last().unwrap().balance_after(), acc.balance());
        }
    }

    #[test]
    fn balances_stay_non_negative() {
        let mut dir = directory();
        let mut handles = Vec::new();
        for (name, opening, pin) in [
            ("Ada", dec!(100), "1111"),
            ("Bob", Decimal::ZERO, "2222"),
            ("Cy", dec!(0.01), "3333"),
            ("Di", dec!(2500.50), "4444"),
        ] {
            let number = dir
                .create_account(name, opening, pin, AccountType::Savings)
                .unwrap();
            handles.push(dir.authenticate(&number, pin).unwrap());
        }
        let amounts = [
            dec!(-1),
            Decimal::ZERO,
            dec!(0.01),
            dec!(1),
            dec!(7.77),
            dec!(99.99),
            dec!(100),
            dec!(1000),
            dec!(5000),
        ];

        let mut steps = Steps(0x2545_f491_4f6c_dd1d);
        let mut failures = 0;
        for _ in 0..500 {
            let who = &handles[steps.next() as usize % handles.len()];
            let amount = amounts[steps.next() as usize % amounts.len()];
            let total_before: Decimal = dir.state().accounts.values().map(|a| a.balance()).sum();
            let balance_before = dir.balance(who).unwrap();

            let outcome = match steps.next() % 4 {
                0 => dir.deposit(who, amount).map(|_| amount),
                1 => dir.withdraw(who, amount).map(|_| -amount),
                2 => {
                    let to = &handles[steps.next() as usize % handles.len()];
                    dir.transfer(who, to.account_number(), amount)
                        .map(|_| Decimal::ZERO)
                }
                _ => dir.transfer(who, "9999", amount).map(|_| Decimal::ZERO),
            };
            let total_after: Decimal = dir.state().accounts.values().map(|a| a.balance()).sum();
            match outcome {
                Ok(change) => assert_eq!(total_before + change, total_after),
                Err(_) => {
                    failures += 1;
                    assert_eq!(total_before, total_after);
                    assert_eq!(dir.balance(who).unwrap(), balance_before);
                }
            }
            assert_ledger_consistent(&dir);
        }
        assert!(failures > 0);
        assert!(dir.state().accounts.values().any(|a| a.history().len() > 20));
    }

    #[test]
    fn reopen_restores_state() {
        let mut dir = directory();
        let a = dir
            .create_account("Ada", dec!(10), "1234", AccountType::Savings)
            .unwrap();
        let b = dir
            .create_account("Bob", dec!(10), "0000", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&a, "1234").unwrap();
        dir.transfer(&ada, &b, dec!(2.5)).unwrap();
        dir.withdraw(&ada, dec!(1)).unwrap();

        let document = dir.storage().document().unwrap();
        let mut reopened = PersistentDirectory::open(InMemoryStorage::with_document(document));
        assert_eq!(reopened.state(), dir.state());

        // the counter keeps going from where it stopped
        let c = reopened
            .create_account("Cy", Decimal::ZERO, "1111", AccountType::Savings)
            .unwrap();
        assert_eq!(c, "1003");
    }

    #[test]
    fn corrupt_storage_starts_empty() {
        let dir = PersistentDirectory::open(InMemoryStorage::with_document("[1, 2"));
        assert_eq!(dir.state(), &DirectoryState::default());
    }

    #[test]
    fn save_failure_keeps_changes() {
        let mut dir = PersistentDirectory::open(InMemoryStorage::failing());
        let a = dir
            .create_account("Ada", dec!(10), "1234", AccountType::Savings)
            .unwrap();
        let ada = dir.authenticate(&a, "1234").unwrap();
        assert_eq!(dir.deposit(&ada, dec!(5)).unwrap(), dec!(15));
        assert_eq!(dir.balance(&ada).unwrap(), dec!(15));
        assert!(matches!(dir.save(), Err(StorageError::Io(_))));
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut dir = directory();
        let handle = AccountHandle::new("1001".into());
        assert!(matches!(
            dir.deposit(&handle, dec!(1)),
            Err(DirectoryError::AccountNotFound(_))
        ));
    }
}
