//! Display formatting for amounts, durations and names

use chrono::Duration;

/// BTC amount with precision that shrinks as the amount grows
pub fn format_btc_amount(amount: f64) -> String {
    if amount >= 1.0 {
        format!("{:.4}", amount)
    } else if amount >= 0.001 {
        format!("{:.6}", amount)
    } else {
        format!("{:.8}", amount)
    }
}

/// Full satoshi precision, for amounts the user has to send verbatim
pub fn format_btc_exact(amount: f64) -> String {
    format!("{:.8}", amount)
}

/// `$1,234.56`
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, frac)
}

pub fn format_time_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds();
    if total <= 0 {
        return "Expired".to_string();
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_username(username: Option<&str>) -> String {
    match username {
        Some(name) if !name.is_empty() => {
            if name.starts_with('@') {
                name.to_string()
            } else {
                format!("@{}", name)
            }
        }
        _ => "no_username".to_string(),
    }
}

pub fn calculate_percentage(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    part / total * 100.0
}

/// Keep `chars` characters at each end: `bc1qar0s...zzwf5mdq`
pub fn truncate_address(address: &str, chars: usize) -> String {
    let all: Vec<char> = address.chars().collect();
    if all.len() <= chars * 2 {
        return address.to_string();
    }
    let head: String = all[..chars].iter().collect();
    let tail: String = all[all.len() - chars..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Escape user-supplied text for Telegram's legacy Markdown
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
