//! Human-readable join codes.
//!
//! Codes are 7 symbols over a 32-symbol alphabet with I, O, 0 and 1 removed:
//! six random body symbols followed by a positional checksum
//! `(Σ bᵢ·i) mod 32` for i = 1..6. Random draws use the OS CSPRNG with
//! rejection sampling so every symbol is uniformly likely.

use rand::TryRngCore;
use rand::rngs::OsRng;

/// Symbols usable in a join code.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const ALPHABET_SIZE: usize = ALPHABET.len();
const BODY_LEN: usize = 6;
/// Total length of a join code including the checksum symbol.
pub const CODE_LEN: usize = BODY_LEN + 1;

fn random_indexes(count: usize) -> Vec<usize> {
    let mut result = Vec::with_capacity(count);
    // Reject bytes >= the largest multiple of 32 so `byte % 32` stays uniform.
    let max_multiple = (256 / ALPHABET_SIZE) * ALPHABET_SIZE;
    let mut buf = [0u8; 16];
    while result.len() < count {
        OsRng
            .try_fill_bytes(&mut buf)
            .expect("OS randomness unavailable");
        for byte in buf {
            if (byte as usize) < max_multiple {
                result.push(byte as usize % ALPHABET_SIZE);
                if result.len() == count {
                    break;
                }
            }
        }
    }
    result
}

fn compute_checksum(values: &[usize]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |acc, (index, value)| {
            (acc + value * (index + 1)) % ALPHABET_SIZE
        })
}

/// Generate a fresh join code.
pub fn generate_code() -> String {
    let body = random_indexes(BODY_LEN);
    let checksum = compute_checksum(&body);
    body.iter()
        .chain(std::iter::once(&checksum))
        .map(|&index| ALPHABET[index] as char)
        .collect()
}

/// Validate the shape and checksum of a join code.
pub fn validate_code(code: &str) -> bool {
    if code.len() != CODE_LEN {
        return false;
    }
    let mut values = Vec::with_capacity(CODE_LEN);
    for symbol in code.bytes() {
        match ALPHABET.iter().position(|&candidate| candidate == symbol) {
            Some(index) => values.push(index),
            None => return false,
        }
    }
    let checksum = values.pop().expect("code has seven symbols");
    compute_checksum(&values) == checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_validate() {
        for _ in 0..64 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(validate_code(&code), "generated code failed: {code}");
        }
    }

    #[test]
    fn single_symbol_corruption_is_rejected() {
        // A substitution at position i shifts the checksum by Δ·i mod 32.
        // For i=1 and the checksum slot itself that is never zero, so every
        // substitution there must fail validation.
        let code = generate_code();
        let bytes = code.as_bytes();
        for position in [0, CODE_LEN - 1] {
            for &replacement in ALPHABET {
                if replacement == bytes[position] {
                    continue;
                }
                let mut corrupted = bytes.to_vec();
                corrupted[position] = replacement;
                let corrupted = String::from_utf8(corrupted).unwrap();
                assert!(
                    !validate_code(&corrupted),
                    "corruption accepted: {code} -> {corrupted}"
                );
            }
        }
    }

    #[test]
    fn corruption_rarely_survives_anywhere() {
        let code = generate_code();
        let bytes = code.as_bytes();
        let mut survivors = 0usize;
        let mut attempts = 0usize;
        for position in 0..CODE_LEN {
            for &replacement in ALPHABET {
                if replacement == bytes[position] {
                    continue;
                }
                let mut corrupted = bytes.to_vec();
                corrupted[position] = replacement;
                attempts += 1;
                if validate_code(&String::from_utf8(corrupted).unwrap()) {
                    survivors += 1;
                }
            }
        }
        // Δ·i ≡ 0 (mod 32) has a handful of solutions across the body, so a
        // few survivors are expected but the overwhelming majority must fail.
        assert!(
            survivors * 20 < attempts,
            "{survivors}/{attempts} corruptions passed validation"
        );
    }

    #[test]
    fn rejects_wrong_shape_and_foreign_symbols() {
        assert!(!validate_code(""));
        assert!(!validate_code("ABCDEF"));
        assert!(!validate_code("ABCDEF12"));
        assert!(!validate_code("ABCDEI1")); // contains I and 1
        assert!(!validate_code("abcdefg")); // lower case is out of alphabet
    }
}
