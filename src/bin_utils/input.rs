use std::{io::BufRead, str::FromStr};

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a valid amount")]
pub struct InvalidNumber(String);

/// Reads one line with the trailing newline stripped. `None` on end of input.
pub fn read_line<R: BufRead>(input: &mut R) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
}

/// Only checks that the text is a number, sign checks belong to the directory.
pub fn parse_amount(raw: &str) -> Result<Decimal, InvalidNumber> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| InvalidNumber(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn amounts() {
        assert_eq!(parse_amount("50").unwrap(), dec!(50));
        assert_eq!(parse_amount(" 12.75 ").unwrap(), dec!(12.75));
        assert_eq!(parse_amount("-3").unwrap(), dec!(-3));
        assert_eq!(parse_amount("1e2").unwrap(), dec!(100));
        assert_eq!(
            parse_amount("ten").unwrap_err(),
            InvalidNumber("ten".into())
        );
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn lines() {
        let mut input = "first\r\nsecond\n\nlast".as_bytes();
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some("first"));
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some("second"));
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some(""));
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some("last"));
        assert_eq!(read_line(&mut input).unwrap(), None);
    }
}
