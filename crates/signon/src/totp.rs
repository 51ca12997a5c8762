//! Time-based one-time codes (RFC 6238, HMAC-SHA1, 30 second step, 6 digits).

use crate::errors::TotpError;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

pub const STEP_SECONDS: u64 = 30;
pub const DIGITS: u32 = 6;

/// Decode an authenticator-style base32 seed. Case, spaces, dashes and `=`
/// padding are ignored.
pub fn decode_seed(seed: &str) -> Result<Vec<u8>, TotpError> {
    let normalized: String = seed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return Err(TotpError::EmptySeed);
    }
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| TotpError::InvalidBase32(e.to_string()))
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation), zero-padded.
pub fn code_for_counter(key: &[u8], counter: u64) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    format!(
        "{:0width$}",
        binary % 10u32.pow(DIGITS),
        width = DIGITS as usize
    )
}

/// Code valid at `unix_seconds`.
pub fn code_at(key: &[u8], unix_seconds: u64) -> String {
    code_for_counter(key, unix_seconds / STEP_SECONDS)
}

/// Code for a base32 `seed` at wall-clock `time`.
pub fn code(seed: &str, time: SystemTime) -> Result<String, TotpError> {
    let key = decode_seed(seed)?;
    // Clocks before 1970 collapse to counter 0.
    let unix_seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(code_at(&key, unix_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // RFC 6238 appendix B secret ("12345678901234567890") in base32.
    const RFC_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_rfc6238_sha1_vectors() {
        // Last six digits of the eight-digit reference values.
        let vectors = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];
        for (secs, expected) in vectors {
            assert_eq!(code(RFC_SEED, at(secs)).unwrap(), expected, "t={secs}");
        }
    }

    #[test]
    fn test_rfc4226_hotp_vectors() {
        let key = b"12345678901234567890";
        let expected = ["755224", "287082", "359152", "969429", "338314"];
        for (counter, code) in expected.iter().enumerate() {
            assert_eq!(code_for_counter(key, counter as u64), *code);
        }
    }

    #[test]
    fn test_same_window_same_code() {
        let window_start = 1_700_000_010 - (1_700_000_010 % STEP_SECONDS);
        let first = code(RFC_SEED, at(window_start)).unwrap();
        for offset in 1..STEP_SECONDS {
            assert_eq!(code(RFC_SEED, at(window_start + offset)).unwrap(), first);
        }
        assert_ne!(code(RFC_SEED, at(window_start + STEP_SECONDS)).unwrap(), first);
    }

    #[test]
    fn test_code_shape() {
        let c = code("JBSWY3DPEHPK3PXP", SystemTime::now()).unwrap();
        assert_eq!(c.len(), 6);
        assert!(c.chars().all(|ch| ch.is_ascii_digit()));
    }

    #[test]
    fn test_seed_normalization() {
        let canonical = decode_seed("JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(decode_seed("jbsw y3dp ehpk 3pxp").unwrap(), canonical);
        assert_eq!(decode_seed("JBSWY3DP-EHPK3PXP").unwrap(), canonical);
        assert_eq!(decode_seed("GEZDGNBVGY3TQOJQ====").unwrap(), b"1234567890");
    }

    #[test]
    fn test_invalid_seeds() {
        assert_eq!(decode_seed("  "), Err(TotpError::EmptySeed));
        assert!(matches!(
            decode_seed("not*base32"),
            Err(TotpError::InvalidBase32(_))
        ));
    }
}
