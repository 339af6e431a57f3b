//! Money formatting

/// Number layout for a currency
struct Style {
    symbol: &'static str,
    /// Symbol before the number (`$1,234.56`) or after it (`1 234,56 ₽`)
    prefix: bool,
    thousands: char,
    decimal: char,
}

fn style(currency: &str) -> Option<Style> {
    let (symbol, prefix) = match currency {
        "RUB" => ("₽", false),
        "KZT" => ("₸", false),
        "UAH" => ("₴", false),
        "EUR" => ("€", false),
        "USD" => ("$", true),
        "GBP" => ("£", true),
        _ => return None,
    };
    Some(if prefix {
        Style {
            symbol,
            prefix,
            thousands: ',',
            decimal: '.',
        }
    } else {
        Style {
            symbol,
            prefix,
            thousands: ' ',
            decimal: ',',
        }
    })
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn number(amount: f64, thousands: char, decimal: char) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(&(cents / 100).to_string(), thousands);
    let fraction = cents % 100;
    if fraction == 0 {
        whole
    } else {
        format!("{}{}{:02}", whole, decimal, fraction)
    }
}

/// Format an amount in a currency (ISO 4217 code)
///
/// Whole amounts drop the fraction. Known currencies get their symbol and
/// digit grouping; anything else is suffixed with its code.
pub fn format_money(amount: f64, currency: &str) -> String {
    let code = currency.trim().to_uppercase();
    let sign = if amount < 0.0 && (amount.abs() * 100.0).round() > 0.0 {
        "-"
    } else {
        ""
    };

    match style(&code) {
        Some(s) if s.prefix => format!("{}{}{}", sign, s.symbol, number(amount, s.thousands, s.decimal)),
        Some(s) => format!("{}{} {}", sign, number(amount, s.thousands, s.decimal), s.symbol),
        None if code.is_empty() => format!("{}{}", sign, number(amount, ',', '.')),
        None => format!("{}{} {}", sign, number(amount, ',', '.'), code),
    }
}

/// Same as [`format_money`] with an explicit `+` for positive amounts
pub fn format_signed_money(amount: f64, currency: &str) -> String {
    if amount > 0.0 && (amount * 100.0).round() > 0.0 {
        format!("+{}", format_money(amount, currency))
    } else {
        format_money(amount, currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rub() {
        assert_eq!(format_money(1234.56, "RUB"), "1 234,56 ₽");
        assert_eq!(format_money(1500.0, "rub"), "1 500 ₽");
        assert_eq!(format_money(999.0, "RUB"), "999 ₽");
        assert_eq!(format_money(1_000_000.5, "RUB"), "1 000 000,50 ₽");
    }

    #[test]
    fn test_prefix_currencies() {
        assert_eq!(format_money(1234.56, "USD"), "$1,234.56");
        assert_eq!(format_money(-42.1, "USD"), "-$42.10");
        assert_eq!(format_money(10.0, "GBP"), "£10");
    }

    #[test]
    fn test_suffix_currencies() {
        assert_eq!(format_money(2500.0, "KZT"), "2 500 ₸");
        assert_eq!(format_money(12.5, "EUR"), "12,50 €");
        assert_eq!(format_money(1234.0, "CHF"), "1,234 CHF");
    }

    #[test]
    fn test_signed() {
        assert_eq!(format_signed_money(1000.0, "RUB"), "+1 000 ₽");
        assert_eq!(format_signed_money(-1000.0, "RUB"), "-1 000 ₽");
        assert_eq!(format_signed_money(0.0, "RUB"), "0 ₽");
    }
}
