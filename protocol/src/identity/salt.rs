//! # Salt Derivation
//!
//! Maps an identity-provider subject id to the per-user salt that feeds
//! address derivation.
//!
//! ```text
//! seed = DEPLOYMENT_SALT_PREFIX || subject_id
//! hash = 0
//! for each UTF-16 code unit c in seed:
//!     hash = hash * 31 + c        (signed 32-bit, wrapping)
//! salt = |hash|                   (widened, so i32::MIN -> 2147483648)
//! ```
//!
//! ## Compatibility
//!
//! This function is part of the address-derivation contract. Its output for
//! every subject id is effectively written on-chain the moment a user
//! receives funds. Iterating bytes instead of UTF-16 code units, saturating
//! instead of wrapping, or tweaking the prefix all look harmless and all
//! move every existing user to a fresh, empty address. The golden values in
//! the tests below are the regression net. Do not "fix" them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DEPLOYMENT_SALT_PREFIX;

/// The deterministic per-subject salt.
///
/// Always fits in `0..=2^31`. Rendered as a decimal string on the wire,
/// which is the form the proof capability expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Salt(u64);

impl Salt {
    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the salt for `subject_id` under this deployment's prefix.
///
/// Pure and total.
///
/// ```
/// use waypoint_protocol::identity::derive_salt;
///
/// assert_eq!(derive_salt("abc123"), derive_salt("abc123"));
/// ```
pub fn derive_salt(subject_id: &str) -> Salt {
    derive_salt_with_prefix(DEPLOYMENT_SALT_PREFIX, subject_id)
}

/// Derive a salt under an explicit prefix. Exposed for migration tooling
/// that has to reproduce another deployment's salts.
pub fn derive_salt_with_prefix(prefix: &str, subject_id: &str) -> Salt {
    let hash = prefix
        .encode_utf16()
        .chain(subject_id.encode_utf16())
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        });
    Salt(u64::from(hash.unsigned_abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Golden values. These pin the address-derivation contract. ----------

    #[test]
    fn golden_deployment_salt_for_abc123() {
        assert_eq!(derive_salt("abc123").value(), 986_835_730);
    }

    #[test]
    fn golden_empty_prefix_matches_classic_string_hash() {
        // "abc123" folds to -1424436592 under the classic 31-multiplier
        // string hash; the salt is its absolute value.
        assert_eq!(derive_salt_with_prefix("", "abc123").value(), 1_424_436_592);
    }

    #[test]
    fn golden_values_for_realistic_subjects() {
        assert_eq!(derive_salt("108532940237481234567").value(), 2_140_137_834);
        assert_eq!(derive_salt("google-oauth2|42").value(), 279_605_225);
        assert_eq!(derive_salt("").value(), 1_705_647_906);
    }

    #[test]
    fn non_ascii_subjects_fold_utf16_code_units() {
        // Iterating UTF-8 bytes here would produce a different value.
        assert_eq!(derive_salt("ünïcødé").value(), 71_504_857);
    }

    // -- Laws ---------------------------------------------------------------

    #[test]
    fn derivation_is_deterministic() {
        for subject in ["abc123", "", "a-very-long-subject-identifier-0123456789"] {
            assert_eq!(derive_salt(subject), derive_salt(subject));
        }
    }

    #[test]
    fn prefix_changes_the_salt() {
        assert_ne!(
            derive_salt_with_prefix("other-deployment:", "abc123"),
            derive_salt("abc123")
        );
    }

    #[test]
    fn min_i32_does_not_overflow() {
        // A single code unit can't reach i32::MIN, so check the widening
        // directly on the fold's final step.
        assert_eq!(u64::from(i32::MIN.unsigned_abs()), 2_147_483_648);
    }

    #[test]
    fn salt_renders_as_decimal() {
        assert_eq!(derive_salt("abc123").to_string(), "986835730");
    }
}
