//! Address Formatter
//!
//! Keeps the address input canonical while the user types. Every keystroke
//! goes through [`reformat`], which strips non-hex input, regroups the digits
//! into colon separated octets and moves the cursor so the typed character
//! stays under it.

use crate::domain::error::ProbeError;
use std::fmt;
use std::str::FromStr;

/// Number of hex digits in a complete hardware address
pub const ADDRESS_DIGITS: usize = 12;

/// Number of octets in a complete hardware address
pub const ADDRESS_OCTETS: usize = ADDRESS_DIGITS / 2;

const SEPARATOR: char = ':';

/// Result of reformatting one edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reformatted {
    pub formatted: String,
    pub cursor: usize,
    pub is_complete: bool,
}

/// Reformat the edit field after a keystroke.
///
/// `previous` is the last accepted formatted value, `raw` the field content
/// after the edit and `cursor` the caret position (in chars) after the edit.
///
/// Edits that would push the address past 12 hex digits are rejected and
/// `previous` is restored with the caret at its end.
pub fn reformat(previous: Option<&str>, raw: &str, cursor: usize) -> Reformatted {
    let clean = purify(raw);

    if clean.len() > ADDRESS_DIGITS {
        let restored = previous.unwrap_or_default().to_string();
        let cursor = restored.chars().count();
        let is_complete = is_canonical(&restored);
        return Reformatted {
            formatted: restored,
            cursor,
            is_complete,
        };
    }

    let mut formatted = group_octets(&clean);
    if let Some(previous) = previous {
        formatted = cascade_colon_deletion(previous, raw, formatted, cursor);
    }

    // Shift the caret by however many separators were added or removed
    let raw_len = raw.chars().count() as isize;
    let new_len = formatted.chars().count() as isize;
    let cursor = (cursor as isize + new_len - raw_len).max(0) as usize;

    let is_complete = purify(&formatted).len() == ADDRESS_DIGITS;

    Reformatted {
        formatted,
        cursor,
        is_complete,
    }
}

/// Drop everything but hex digits and uppercase what is left.
pub fn purify(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Group clean digits into colon separated pairs, without a trailing colon.
pub fn group_octets(clean: &str) -> String {
    let mut formatted = String::with_capacity(clean.len() + clean.len() / 2);
    for (i, c) in clean.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            formatted.push(SEPARATOR);
        }
        formatted.push(c);
    }
    formatted
}

/// Count separators in a (possibly partial) address.
pub fn colon_count(text: &str) -> usize {
    text.chars().filter(|c| *c == SEPARATOR).count()
}

/// True for exactly `XX:XX:XX:XX:XX:XX` with uppercase hex octets.
pub fn is_canonical(text: &str) -> bool {
    let octets: Vec<&str> = text.split(SEPARATOR).collect();
    octets.len() == ADDRESS_OCTETS
        && octets.iter().all(|octet| {
            octet.len() == 2
                && octet
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
}

/// When the user removed a separator the formatter would simply put it back,
/// so the hex digit in front of the deleted separator goes too.
fn cascade_colon_deletion(previous: &str, raw: &str, formatted: String, cursor: usize) -> String {
    if previous.chars().count() <= 1 || colon_count(raw) >= colon_count(previous) {
        return formatted;
    }

    let chars: Vec<char> = formatted.chars().collect();
    let split = cursor.min(chars.len());
    let keep_until = cursor.saturating_sub(1).min(chars.len());

    let trimmed: String = chars[..keep_until]
        .iter()
        .chain(chars[split..].iter())
        .collect();

    group_octets(&purify(&trimmed))
}

/// Edit field state threaded through [`reformat`] by the owner of the field.
#[derive(Debug, Clone, Default)]
pub struct EditState {
    /// Last value that was accepted, the rollback target on overflow
    pub previous_formatted: Option<String>,
    pub formatted: String,
    pub cursor: usize,
    pub is_complete: bool,
}

impl EditState {
    /// Start from an existing value, e.g. the last probed address.
    pub fn with_text(text: &str) -> Self {
        let mut state = Self::default();
        state.apply(text, text.chars().count());
        state
    }

    /// Feed the raw field content after a keystroke.
    pub fn apply(&mut self, raw: &str, cursor: usize) -> Reformatted {
        let result = reformat(self.previous_formatted.as_deref(), raw, cursor);

        // A rejected edit hands back the previous value, which stays the target
        if purify(raw).len() <= ADDRESS_DIGITS {
            self.previous_formatted = Some(result.formatted.clone());
        }

        self.formatted = result.formatted.clone();
        self.cursor = result.cursor;
        self.is_complete = result.is_complete;
        result
    }

    /// Parsed address once the field holds a complete one
    pub fn address(&self) -> Option<BluetoothAddress> {
        if self.is_complete {
            self.formatted.parse().ok()
        } else {
            None
        }
    }
}

/// A complete 48-bit Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BluetoothAddress(u64);

impl BluetoothAddress {
    pub fn from_u64(raw: u64) -> Self {
        Self(raw & 0xFFFF_FFFF_FFFF)
    }

    /// Raw value as taken by the platform APIs
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for BluetoothAddress {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_canonical(s) {
            return Err(ProbeError::InvalidAddress(s.to_string()));
        }
        u64::from_str_radix(&purify(s), 16)
            .map(Self)
            .map_err(|_| ProbeError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:012X}", self.0);
        write!(f, "{}", group_octets(&digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0123456789AB";

    #[test]
    fn test_empty_input() {
        let result = reformat(None, "", 0);
        assert_eq!(result.formatted, "");
        assert_eq!(result.cursor, 0);
        assert!(!result.is_complete);
    }

    #[test]
    fn test_canonical_input_unchanged() {
        let full = "AA:BB:CC:DD:EE:FF";
        let result = reformat(Some(full), full, full.len());
        assert_eq!(result.formatted, full);
        assert_eq!(result.cursor, full.len());
        assert!(result.is_complete);

        let fresh = reformat(None, full, full.len());
        assert_eq!(fresh.formatted, full);
        assert!(fresh.is_complete);
    }

    #[test]
    fn test_hex_prefixes_round_trip() {
        for len in 0..=ADDRESS_DIGITS {
            let input = &SAMPLE[..len];
            let result = reformat(None, input, len);
            assert_eq!(
                colon_count(&result.formatted),
                len.saturating_sub(1) / 2,
                "colon count for {input:?}"
            );
            assert_eq!(purify(&result.formatted), input);
            assert_eq!(result.is_complete, len == ADDRESS_DIGITS);
        }
    }

    #[test]
    fn test_lowercase_and_junk_are_normalized() {
        let result = reformat(None, "a-b c🦀d", 7);
        assert_eq!(result.formatted, "AB:CD");

        let result = reformat(None, "zz🦀", 3);
        assert_eq!(result.formatted, "");
        assert!(!result.is_complete);
    }

    #[test]
    fn test_typing_inserts_separator_and_moves_cursor() {
        let result = reformat(Some("AA:BB"), "AA:BBC", 6);
        assert_eq!(result.formatted, "AA:BB:C");
        assert_eq!(result.cursor, 7);
    }

    #[test]
    fn test_backspace_over_digit_drops_dangling_separator() {
        let result = reformat(Some("AA:BB:C"), "AA:BB:", 6);
        assert_eq!(result.formatted, "AA:BB");
        assert_eq!(result.cursor, 5);
    }

    #[test]
    fn test_overflow_rolls_back() {
        let previous = "AA:BB:CC:DD:EE:FF";
        let result = reformat(Some(previous), "AA:BB:CC:DD:EE:FF0", 18);
        assert_eq!(result.formatted, previous);
        assert_eq!(result.cursor, previous.len());
        assert!(result.is_complete);

        let partial = "AA:BB";
        let result = reformat(Some(partial), "AA:BB0123456789ABC", 18);
        assert_eq!(result.formatted, partial);
        assert_eq!(result.cursor, partial.len());
        assert!(!result.is_complete);
    }

    #[test]
    fn test_overflow_without_previous_clears_field() {
        let result = reformat(None, "0123456789ABCD", 14);
        assert_eq!(result.formatted, "");
        assert_eq!(result.cursor, 0);
    }

    #[test]
    fn test_colon_deletion_removes_preceding_digit() {
        // "AA:BB:C" with the second separator (index 5) deleted
        let result = reformat(Some("AA:BB:C"), "AA:BBC", 5);
        assert_eq!(result.formatted, "AA:BC");
        assert_eq!(colon_count(&result.formatted), 1);

        // first separator of "AA:BB:CC:D" deleted
        let result = reformat(Some("AA:BB:CC:D"), "AABB:CC:D", 2);
        assert_eq!(result.formatted, "AB:BC:CD");
        assert_eq!(result.cursor, 1);
        assert_eq!(colon_count(&result.formatted), 2);
    }

    #[test]
    fn test_colon_deletion_on_even_length() {
        let result = reformat(Some("AA:BB"), "AABB", 2);
        assert_eq!(result.formatted, "AB:B");
        assert_eq!(purify(&result.formatted), "ABB");
    }

    #[test]
    fn test_edit_state_keeps_rollback_target() {
        let mut state = EditState::default();
        for (i, _) in SAMPLE.char_indices() {
            let raw = format!("{}{}", state.formatted, &SAMPLE[i..=i]);
            let cursor = raw.chars().count();
            state.apply(&raw, cursor);
        }
        assert_eq!(state.formatted, "01:23:45:67:89:AB");
        assert!(state.is_complete);

        let overflow = format!("{}C", state.formatted);
        state.apply(&overflow, overflow.len());
        assert_eq!(state.formatted, "01:23:45:67:89:AB");
        assert_eq!(
            state.previous_formatted.as_deref(),
            Some("01:23:45:67:89:AB")
        );
        assert_eq!(
            state.address(),
            Some(BluetoothAddress::from_u64(0x0123_4567_89AB))
        );
    }

    #[test]
    fn test_address_parse_and_display() {
        let address: BluetoothAddress = "AA:BB:CC:DD:EE:0F".parse().unwrap();
        assert_eq!(address.as_u64(), 0xAABB_CCDD_EE0F);
        assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:0F");

        assert!("AA:BB:CC".parse::<BluetoothAddress>().is_err());
        assert!("aa:bb:cc:dd:ee:ff".parse::<BluetoothAddress>().is_err());
        assert!("AABBCCDDEEFF".parse::<BluetoothAddress>().is_err());
    }
}
