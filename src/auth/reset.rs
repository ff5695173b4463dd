use rand::{rngs::OsRng, Rng};

pub const RESET_CODE_LEN: usize = 6;

/// Generate a fresh 6-digit numeric reset code from the OS CSPRNG.
/// Predictability here would be a direct account-takeover vector, so a
/// non-cryptographic generator is not acceptable.
pub fn generate_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:0width$}", width = RESET_CODE_LEN)
}

/// Constant-time string equality for reset codes and pending tokens.
/// Always scans the longer input; the length check folds into the result.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_decimal_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), RESET_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq("123456", "123456"));
        assert!(!constant_time_eq("123456", "123457"));
        assert!(!constant_time_eq("123456", "12345"));
        assert!(!constant_time_eq("", "1"));
        assert!(constant_time_eq("", ""));
    }
}
