//! Token decimal precision for the assets strategies can move.

/// A token known to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: &'static str,
    pub decimals: u8,
    /// Native gas token: paid as call value rather than approved.
    pub native: bool,
}

pub const TOKENS: &[Token] = &[
    Token {
        symbol: "USDC",
        decimals: 6,
        native: false,
    },
    Token {
        symbol: "USDT",
        decimals: 6,
        native: false,
    },
    Token {
        symbol: "ETH",
        decimals: 18,
        native: true,
    },
];

/// Look up a token by symbol (case-insensitive).
#[must_use]
pub fn by_symbol(symbol: &str) -> Option<Token> {
    TOKENS
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol.trim()))
        .copied()
}

/// Render a display balance with at most `decimals` fractional digits.
#[must_use]
pub fn format_amount(value: f64, decimals: u8) -> String {
    let s = format!("{value:.prec$}", prec = usize::from(decimals));
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Shortest decimal that reads back as `value`, cut (not rounded) to
/// `decimals` fractional digits. `None` unless the result is positive.
#[must_use]
pub fn exact_amount(value: f64, decimals: u8) -> Option<String> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    // f64 Display is the shortest round-trip form and never uses an exponent.
    let s = value.to_string();
    let s = match s.split_once('.') {
        Some((whole, frac)) => {
            let frac = &frac[..frac.len().min(usize::from(decimals))];
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => s,
    };
    s.bytes().any(|b| matches!(b, b'1'..=b'9')).then_some(s)
}
