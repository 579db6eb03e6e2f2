//! The swap file naming scheme: `PID_VPN.swp` (spec.md §3's **Swap file**).
//!
//! Grounded on xv6's on-disk naming conventions (e.g.
//! `src/fs/ufs/mod.rs`'s fixed-width path formatting) and its use of
//! `arrayvec` throughout (`src/syscall.rs`, `src/fs/log.rs`) for
//! bounded-capacity buffers instead of a heap-allocated `String`.

use arrayvec::ArrayString;
use core::fmt::Write;

/// `"-2147483648_18446744073709551615.swp"` is the longest possible name;
/// round up generously since this only ever backs a fixed stack buffer.
pub const MAX_NAME_LEN: usize = 48;

/// Builds the deterministic swap filename for one page of one process.
/// `vpn == 0` is encoded literally as `"0"`, per spec.md §3.
pub fn file_name(pid: i32, vpn: usize) -> ArrayString<MAX_NAME_LEN> {
    let mut name = ArrayString::new();
    write!(name, "{}_{}.swp", pid, vpn).expect("swap filename fits in MAX_NAME_LEN");
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_pid_and_vpn_with_decimal_digits() {
        assert_eq!(file_name(7, 3).as_str(), "7_3.swp");
    }

    #[test]
    fn vpn_zero_is_encoded_literally() {
        assert_eq!(file_name(42, 0).as_str(), "42_0.swp");
    }

    #[test]
    fn distinct_pid_vpn_pairs_never_collide() {
        assert_ne!(file_name(1, 2).as_str(), file_name(2, 1).as_str());
        assert_ne!(file_name(12, 1).as_str(), file_name(1, 21).as_str());
    }
}
