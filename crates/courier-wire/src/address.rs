//! Phone-number and JID handling for the user-messaging domain.

/// Domain suffix of user JIDs on the wire.
pub const USER_JID_DOMAIN: &str = "s.whatsapp.net";

/// Normalize a raw phone number to wire digits.
///
/// Strips every non-digit, converts a local `0` prefix to the country
/// code, and prepends the country code when absent.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        return format!("{country_code}{rest}");
    }
    if digits.starts_with(country_code) {
        digits
    } else {
        format!("{country_code}{digits}")
    }
}

/// Normalize a phone number and render it as a user JID.
pub fn to_jid(raw: &str, country_code: &str) -> String {
    format!("{}@{USER_JID_DOMAIN}", normalize_phone(raw, country_code))
}

/// Extract the phone digits from a JID (`<digits>@…`).
///
/// Returns `None` when the JID does not start with digits — group and
/// broadcast JIDs do not map to a phone number.
pub fn phone_from_jid(jid: &str) -> Option<String> {
    let (local, _domain) = jid.split_once('@')?;
    if local.is_empty() || !local.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(local.to_string())
}

/// Whether a JID addresses an individual user.
pub fn is_user_jid(jid: &str) -> bool {
    match jid.split_once('@') {
        Some((local, domain)) => {
            domain == USER_JID_DOMAIN && !local.is_empty() && local.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Phone number from a session identity (`<digits>:<device>@<domain>`).
pub fn phone_from_identity(identity: &str) -> Option<String> {
    let before_domain = identity.split('@').next().unwrap_or(identity);
    let digits = before_domain.split(':').next().unwrap_or(before_domain);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(digits.to_string())
}
