//! Caller Input Validation
//!
//! Symbols, timeframes, and bar amounts are validated before any network
//! activity so a typo never costs a connection round trip.

use crate::error::ClientError;

/// Normalize and validate a timeframe string.
///
/// Accepted forms (case-insensitive):
/// - bare digits, interpreted as minutes (`"5"`, `"240"`)
/// - digits followed by one of `S`, `D`, `W`, `M` (`"30S"`, `"2W"`)
/// - a bare unit letter, canonicalized to `1` of it (`"D"` becomes `"1D"`)
///
/// # Errors
///
/// Returns [`ClientError::Validation`] for anything else.
pub fn validate_timeframe(timeframe: &str) -> Result<String, ClientError> {
    let upper = timeframe.trim().to_uppercase();
    if upper.is_empty() {
        return Err(ClientError::Validation("timeframe must not be empty".into()));
    }

    if matches!(upper.as_str(), "S" | "D" | "W" | "M") {
        return Ok(format!("1{upper}"));
    }

    let (digits, unit) = match upper.find(|c: char| !c.is_ascii_digit()) {
        None => (upper.as_str(), None),
        Some(pos) => {
            let (d, u) = upper.split_at(pos);
            (d, Some(u))
        }
    };

    let valid = !digits.is_empty()
        && digits.parse::<u32>().is_ok_and(|n| n > 0)
        && matches!(unit, None | Some("S" | "D" | "W" | "M"));
    if valid {
        Ok(upper)
    } else {
        Err(ClientError::Validation(format!(
            "invalid timeframe '{timeframe}': expected minutes or <n>[SDWM]"
        )))
    }
}

/// Validate a symbol list.
///
/// Each symbol must be non-empty, contain only alphanumerics and
/// `: . _ -`, and have at most one exchange separator colon.
///
/// # Errors
///
/// Returns [`ClientError::Validation`] when the list is empty or any
/// symbol is malformed.
pub fn validate_symbols(symbols: &[String]) -> Result<(), ClientError> {
    if symbols.is_empty() {
        return Err(ClientError::Validation("symbol list must not be empty".into()));
    }

    for symbol in symbols {
        let shape_ok = !symbol.is_empty()
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'))
            && symbol.matches(':').count() <= 1;
        if !shape_ok {
            return Err(ClientError::Validation(format!("invalid symbol '{symbol}'")));
        }
    }
    Ok(())
}

/// Validate a requested bar amount. `None` means "all available".
///
/// # Errors
///
/// Returns [`ClientError::Validation`] for an explicit zero.
pub fn validate_amount(amount: Option<u64>) -> Result<(), ClientError> {
    if amount == Some(0) {
        return Err(ClientError::Validation("amount must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("5", "5")]
    #[test_case("240", "240")]
    #[test_case("1D", "1D")]
    #[test_case("1d", "1D" ; "lowercase unit")]
    #[test_case("30S", "30S")]
    #[test_case("2W", "2W")]
    #[test_case("3M", "3M")]
    #[test_case("D", "1D" ; "bare day")]
    #[test_case("w", "1W" ; "bare week")]
    fn accepts_and_normalizes(input: &str, expected: &str) {
        assert_eq!(validate_timeframe(input).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("0" ; "zero minutes")]
    #[test_case("1H" ; "unknown unit")]
    #[test_case("D1" ; "unit before digits")]
    #[test_case("1.5D" ; "fractional")]
    #[test_case("abc" ; "letters")]
    fn rejects_malformed_timeframes(input: &str) {
        assert!(matches!(
            validate_timeframe(input),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn symbols_accept_exchange_prefixes() {
        let symbols = vec![
            "NASDAQ:AAPL".to_string(),
            "BINANCE:BTCUSDT".to_string(),
            "BRK.B".to_string(),
            "EUR_USD-X".to_string(),
        ];
        assert!(validate_symbols(&symbols).is_ok());
    }

    #[test_case(&[] ; "empty list")]
    #[test_case(&[""] ; "empty symbol")]
    #[test_case(&["A:B:C"] ; "two colons")]
    #[test_case(&["AAPL MSFT"] ; "whitespace")]
    fn rejects_malformed_symbols(symbols: &[&str]) {
        let owned: Vec<String> = symbols.iter().map(ToString::to_string).collect();
        assert!(matches!(
            validate_symbols(&owned),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn amount_zero_is_rejected() {
        assert!(validate_amount(None).is_ok());
        assert!(validate_amount(Some(1)).is_ok());
        assert!(matches!(
            validate_amount(Some(0)),
            Err(ClientError::Validation(_))
        ));
    }
}
