// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Generate a random alphanumeric client identifier of `len` characters.
pub fn random_string(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).map(char::from).take(len).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Not valid UTF-8.
    InvalidUtf8,

    /// Contains the null character U+0000, a disallowed code point per
    /// MQTT-1.5.4-2.
    ContainsNul,

    /// Longer than 65,535 bytes once UTF-8 encoded.
    TooLong,
}

/// Convert raw bytes into a `String`, rejecting ill-formed UTF-8.
///
/// # Errors
/// Returns `StringError::InvalidUtf8` if `bytes` is not valid UTF-8.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StringError::InvalidUtf8)
}

/// Validate a string destined for the wire: well-formed UTF-8 (guaranteed
/// by `&str`), no embedded NUL, and a byte length that fits in the 16-bit
/// length prefix MQTT strings use.
///
/// # Errors
/// Returns `StringError::ContainsNul` or `StringError::TooLong`.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.contains('\u{0000}') {
        return Err(StringError::ContainsNul);
    }
    if s.len() > u16::from(u16::MAX).into() {
        return Err(StringError::TooLong);
    }
    Ok(())
}

/// Validate binary data destined for the wire: must fit in the 16-bit
/// length prefix MQTT binary data uses.
///
/// # Errors
/// Returns `EncodeError::TooManyData` if longer than 65,535 bytes.
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), crate::EncodeError> {
    if data.len() > usize::from(u16::MAX) {
        return Err(crate::EncodeError::TooManyData);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    TooLong,
    InvalidChars,
}

/// Validate a client identifier against the conservative MQTT 3.1.1 rule:
/// 1 to 23 characters, all from `[0-9a-zA-Z]`. MQTT 5.0 brokers may accept
/// a wider range (including empty, server-assigned identifiers), so this
/// check is advisory and callers on v5 skip it for an empty id.
///
/// # Errors
/// Returns `ClientIdError` if the identifier violates the rule above.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

/// Returns true if `topic` contains any of the subscription wildcard
/// characters `+` or `#`. PUBLISH topic names must not use these.
#[must_use]
pub fn contains_wildcard(topic: &str) -> bool {
    topic.contains('+') || topic.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wildcards_in_publish_topics() {
        assert!(contains_wildcard("a/+/b"));
        assert!(contains_wildcard("a/#"));
        assert!(!contains_wildcard("a/b/c"));
    }

    #[test]
    fn client_id_length_limit() {
        assert!(validate_client_id(&"a".repeat(23)).is_ok());
        assert_eq!(
            validate_client_id(&"a".repeat(24)),
            Err(ClientIdError::TooLong)
        );
    }
}
