//! Interactive menu on top of an [`AccountDirectory`]. Generic over input and
//! output so integration tests can script a whole session.

use std::{
    fs::File,
    io::{BufRead, Write},
};

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::{
    account::AccountType,
    directory::{AccountDirectory, AccountHandle},
};
use history_printer::{print_history_csv, print_history_table};
use input::{parse_amount, read_line};

pub mod history_printer;
pub mod input;

pub struct Service<'w, R, W: 'w, D: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub directory: &'w mut D,
}

impl<'w, R, W, D> Service<'w, R, W, D>
where
    R: BufRead,
    W: Write + 'w,
    D: AccountDirectory + 'w,
{
    /// Runs until the user picks "Exit" or input ends, then saves.
    pub fn run(mut self) -> Result<()> {
        loop {
            writeln!(self.output, "\n=== Bank Account Management ===")?;
            writeln!(self.output, "1. Create New Account")?;
            writeln!(self.output, "2. Login to Account")?;
            writeln!(self.output, "3. Exit and Save")?;
            let Some(choice) = self.prompt("Enter your choice (1-3): ")? else {
                break;
            };
            match choice.trim() {
                "1" => self.create_account()?,
                "2" => self.login()?,
                "3" => break,
                _ => writeln!(self.output, "Invalid choice. Please enter 1, 2, or 3.")?,
            }
        }
        self.directory.save().context("Failed to save bank data")?;
        writeln!(self.output, "Data saved. Goodbye!")?;
        Ok(())
    }

    fn prompt(&mut self, message: &str) -> Result<Option<String>> {
        write!(self.output, "{message}")?;
        self.output.flush()?;
        Ok(read_line(&mut self.input)?)
    }

    fn create_account(&mut self) -> Result<()> {
        writeln!(self.output, "\n--- New Account Creation ---")?;
        let Some(name) = self.prompt("Enter your full name: ")? else {
            return Ok(());
        };
        let Some(deposit) = self.prompt("Enter initial deposit amount (min 0): ")? else {
            return Ok(());
        };
        let deposit = match parse_amount(&deposit) {
            Ok(deposit) => deposit,
            Err(err) => return Ok(writeln!(self.output, "Invalid deposit amount: {err}")?),
        };
        let Some(pin) = self.prompt("Set a 4-digit PIN: ")? else {
            return Ok(());
        };
        let Some(account_type) = self.prompt("Account type (Savings/Current) [Default: Savings]: ")?
        else {
            return Ok(());
        };

        match self.directory.create_account(
            name.trim(),
            deposit,
            pin.trim(),
            AccountType::from(account_type),
        ) {
            Ok(number) => writeln!(
                self.output,
                "Account created successfully! Account Number: {number}"
            )?,
            Err(err) => writeln!(self.output, "Account creation failed: {err}")?,
        }
        Ok(())
    }

    fn login(&mut self) -> Result<()> {
        writeln!(self.output, "\n--- Account Login ---")?;
        let Some(number) = self.prompt("Enter Account Number: ")? else {
            return Ok(());
        };
        let Some(pin) = self.prompt("Enter PIN: ")? else {
            return Ok(());
        };
        match self.directory.authenticate(number.trim(), pin.trim()) {
            Ok(handle) => self.account_menu(&handle),
            Err(err) => Ok(writeln!(self.output, "Authentication failed: {err}")?),
        }
    }

    fn account_menu(&mut self, handle: &AccountHandle) -> Result<()> {
        loop {
            let acc = self.directory.account(handle)?;
            writeln!(
                self.output,
                "\n--- Account Menu: {} ({}) ---",
                acc.owner_name(),
                acc.account_number()
            )?;
            writeln!(self.output, "1. Check Balance")?;
            writeln!(self.output, "2. Deposit Money")?;
            writeln!(self.output, "3. Withdraw Money")?;
            writeln!(self.output, "4. Transfer Funds")?;
            writeln!(self.output, "5. View Transaction History")?;
            writeln!(self.output, "6. Export Transaction History to CSV")?;
            writeln!(self.output, "7. Logout")?;
            let Some(choice) = self.prompt("Enter your choice (1-7): ")? else {
                return Ok(());
            };
            match choice.trim() {
                "1" => {
                    let balance = self.directory.balance(handle)?;
                    writeln!(self.output, "Your current balance is: {balance}")?;
                }
                "2" => self.deposit(handle)?,
                "3" => self.withdraw(handle)?,
                "4" => self.transfer(handle)?,
                "5" => {
                    let acc = self.directory.account(handle)?;
                    print_history_table(self.output, acc.history())?;
                }
                "6" => self.export_history(handle)?,
                "7" => {
                    writeln!(self.output, "Logging out...")?;
                    return Ok(());
                }
                _ => writeln!(self.output, "Invalid choice. Please try again.")?,
            }
        }
    }

    fn read_amount(&mut self, message: &str) -> Result<Option<Decimal>> {
        let Some(raw) = self.prompt(message)? else {
            return Ok(None);
        };
        match parse_amount(&raw) {
            Ok(amount) => Ok(Some(amount)),
            Err(err) => {
                writeln!(self.output, "Invalid input: {err}")?;
                Ok(None)
            }
        }
    }

    fn deposit(&mut self, handle: &AccountHandle) -> Result<()> {
        let Some(amount) = self.read_amount("Enter deposit amount: ")? else {
            return Ok(());
        };
        match self.directory.deposit(handle, amount) {
            Ok(balance) => writeln!(self.output, "Deposit successful. New balance: {balance}")?,
            Err(err) => writeln!(self.output, "Deposit failed: {err}")?,
        }
        Ok(())
    }

    fn withdraw(&mut self, handle: &AccountHandle) -> Result<()> {
        let Some(amount) = self.read_amount("Enter withdrawal amount: ")? else {
            return Ok(());
        };
        match self.directory.withdraw(handle, amount) {
            Ok(balance) => writeln!(self.output, "Withdrawal successful. New balance: {balance}")?,
            Err(err) => writeln!(self.output, "Withdrawal failed: {err}")?,
        }
        Ok(())
    }

    fn transfer(&mut self, handle: &AccountHandle) -> Result<()> {
        let Some(receiver) = self.prompt("Enter receiver's Account Number: ")? else {
            return Ok(());
        };
        let Some(amount) = self.read_amount("Enter transfer amount: ")? else {
            return Ok(());
        };
        let receiver = receiver.trim();
        match self.directory.transfer(handle, receiver, amount) {
            Ok(()) => writeln!(
                self.output,
                "Transfer successful! Transferred {amount} to {receiver}."
            )?,
            Err(err) => writeln!(self.output, "Transfer failed: {err}")?,
        }
        Ok(())
    }

    fn export_history(&mut self, handle: &AccountHandle) -> Result<()> {
        let Some(path) = self.prompt("Enter file path for the CSV export: ")? else {
            return Ok(());
        };
        let path = path.trim();
        let mut file = match File::create(path) {
            Ok(file) => file,
            Err(err) => return Ok(writeln!(self.output, "Cannot create `{path}`: {err}")?),
        };
        let acc = self.directory.account(handle)?;
        match print_history_csv(&mut file, acc.history()) {
            Ok(()) => writeln!(
                self.output,
                "Exported {} transactions to {path}",
                acc.history().len()
            )?,
            Err(err) => writeln!(self.output, "Export to `{path}` failed: {err}")?,
        }
        Ok(())
    }
}
