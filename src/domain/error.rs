//! Domain error types.

/// Top-level error type for signaldesk.
#[derive(Debug, thiserror::Error)]
pub enum SignalDeskError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid input {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("market data error: {reason}")]
    DataSource { reason: String },

    #[error("no data for {symbol} in {quote}")]
    NoData { symbol: String, quote: String },

    #[error("insufficient data for {symbol}: have {candles} candles, need {minimum}")]
    InsufficientData {
        symbol: String,
        candles: usize,
        minimum: usize,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SignalDeskError> for std::process::ExitCode {
    fn from(err: &SignalDeskError) -> Self {
        let code: u8 = match err {
            SignalDeskError::Io(_) | SignalDeskError::Report { .. } => 1,
            SignalDeskError::ConfigParse { .. }
            | SignalDeskError::ConfigMissing { .. }
            | SignalDeskError::ConfigInvalid { .. } => 2,
            SignalDeskError::DataSource { .. } => 3,
            SignalDeskError::InvalidInput { .. } => 4,
            SignalDeskError::NoData { .. } | SignalDeskError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message() {
        let err = SignalDeskError::InsufficientData {
            symbol: "BTC".into(),
            candles: 100,
            minimum: 220,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for BTC: have 100 candles, need 220"
        );
    }

    #[test]
    fn config_missing_message() {
        let err = SignalDeskError::ConfigMissing {
            section: "account".into(),
            key: "equity".into(),
        };
        assert_eq!(err.to_string(), "missing config key [account] equity");
    }

    #[test]
    fn exit_codes_by_category() {
        use std::process::ExitCode;

        let cases = [
            (
                SignalDeskError::ConfigInvalid {
                    section: "a".into(),
                    key: "b".into(),
                    reason: "c".into(),
                },
                ExitCode::from(2),
            ),
            (
                SignalDeskError::DataSource { reason: "x".into() },
                ExitCode::from(3),
            ),
            (
                SignalDeskError::InvalidInput {
                    field: "equity".into(),
                    reason: "x".into(),
                },
                ExitCode::from(4),
            ),
            (
                SignalDeskError::NoData {
                    symbol: "BTC".into(),
                    quote: "USD".into(),
                },
                ExitCode::from(5),
            ),
        ];
        for (err, expected) in &cases {
            assert_eq!(ExitCode::from(err), *expected);
        }
    }
}
