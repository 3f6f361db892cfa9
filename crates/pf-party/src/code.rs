use rand::Rng;

/// Letters usable in a party code; O, I, and L are excluded because players
/// read these off each other's screens.
const CODE_LETTERS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
/// Digits usable in a party code; 0 and 1 are excluded for the same reason.
const CODE_DIGITS: &[u8] = b"23456789";

/// Generate an 8-character party code: four letters then four digits.
pub fn generate_party_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(8);
    for _ in 0..4 {
        code.push(CODE_LETTERS[rng.random_range(0..CODE_LETTERS.len())] as char);
    }
    for _ in 0..4 {
        code.push(CODE_DIGITS[rng.random_range(0..CODE_DIGITS.len())] as char);
    }
    code
}

/// Whether a string is shaped like a party code.
pub fn is_party_code(code: &str) -> bool {
    code.len() == 8
        && code.bytes().take(4).all(|b| CODE_LETTERS.contains(&b))
        && code.bytes().skip(4).all(|b| CODE_DIGITS.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_well_formed() {
        for _ in 0..100 {
            let code = generate_party_code();
            assert!(is_party_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn ambiguous_characters_never_appear() {
        for _ in 0..200 {
            let code = generate_party_code();
            for banned in ['O', 'I', 'L', '0', '1'] {
                assert!(!code.contains(banned), "{} contains {}", code, banned);
            }
        }
    }

    #[test]
    fn shape_check_rejects_junk() {
        assert!(!is_party_code("ABCD123"));
        assert!(!is_party_code("12344321"));
        assert!(!is_party_code("ABCDEFGH"));
        assert!(is_party_code("WXYZ2345"));
    }
}
