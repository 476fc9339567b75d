//! Credential username normalization.
//!
//! The credential service rejects `=` in usernames, and the external
//! auth provider's user ids are base64 with padding. The rule is fixed:
//! lowercase, then strip trailing `=` padding.

/// Normalize a raw external user id into a credential-service username.
///
/// `"MagicUser123="` -> `"magicuser123"`.
pub fn normalize_username(raw_external_id: &str) -> String {
    raw_external_id
        .to_lowercase()
        .trim_end_matches('=')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_single_padding() {
        assert_eq!(normalize_username("MagicUser123="), "magicuser123");
    }

    #[test]
    fn test_strips_repeated_padding() {
        assert_eq!(
            normalize_username("UPPERCASE_USER_ID====="),
            "uppercase_user_id"
        );
    }

    #[test]
    fn test_no_padding_is_only_lowercased() {
        assert_eq!(
            normalize_username("CQ0U5PbimduW29o9eRLqysxJPSAhPT__DiXK6D2RPd0"),
            "cq0u5pbimduw29o9erlqysxjpsahpt__dixk6d2rpd0"
        );
    }

    #[test]
    fn test_all_padding_yields_empty() {
        assert_eq!(normalize_username("==="), "");
    }
}
