//! Log masking for PII and wallet data.
//!
//! Emails, wallet addresses and user ids appear in almost every saga log
//! line; these helpers keep them recognisable without leaking them.

const MASK: &str = "***";

/// `user@example.com` -> `us***@example.com`.
pub fn mask_email(email: &str) -> String {
    if email.is_empty() {
        return "[empty]".to_string();
    }
    match email.find('@') {
        Some(at) if at > 0 => {
            let (local, domain) = email.split_at(at);
            format!("{}{MASK}{domain}", prefix(local, 2))
        }
        _ => format!("{}{MASK}", prefix(email, 2)),
    }
}

/// `0x1234567890abcdef1234` -> `0x1234...1234`.
pub fn mask_address(address: &str) -> String {
    if address.is_empty() {
        return "[empty]".to_string();
    }
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        let head: String = chars.iter().take(2).collect();
        let tail: String = chars[chars.len().saturating_sub(2)..].iter().collect();
        return format!("{head}{MASK}{tail}");
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
