pub type AnyResult<T = ()> = anyhow::Result<T>;

pub fn wrapping_to_usize(value: u64) -> usize {
    value.try_into().unwrap_or(usize::MAX)
}

/// Integer-literal check behind the interned small-integer shortcut.
///
/// Matches `^-?(0|[1-9][0-9]*)$`; the server's integer table rejects `+`
/// prefixes and leading zeros, so this does too.
pub(crate) fn is_plain_int(bytes: &[u8]) -> bool {
    let digits = match bytes {
        [b'-', rest @ ..] => rest,
        _ => bytes,
    };
    match digits {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        _ => digits.iter().all(|b| b.is_ascii_digit()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_int_accepts_decimals() {
        assert!(is_plain_int(b"0"));
        assert!(is_plain_int(b"7"));
        assert!(is_plain_int(b"125"));
        assert!(is_plain_int(b"-123"));
        assert!(is_plain_int(b"-0"));
        assert!(is_plain_int(b"9223372036854775807"));
    }

    #[test]
    fn plain_int_rejects_everything_else() {
        assert!(!is_plain_int(b""));
        assert!(!is_plain_int(b"-"));
        assert!(!is_plain_int(b"+1"));
        assert!(!is_plain_int(b"01"));
        assert!(!is_plain_int(b"1.5"));
        assert!(!is_plain_int(b"12a"));
        assert!(!is_plain_int(b"abc"));
    }

    #[test]
    fn wrapping_to_usize_saturates() {
        assert_eq!(wrapping_to_usize(42), 42);
        assert_eq!(wrapping_to_usize(u64::MAX), usize::MAX);
    }
}
