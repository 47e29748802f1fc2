//! Client-playback-nonce generation.

use rand::Rng;

const CPN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const CPN_LENGTH: usize = 16;

/// Generate a 16-character client-playback-nonce.
pub fn generate_cpn() -> String {
    let mut rng = rand::thread_rng();
    (0..CPN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CPN_ALPHABET.len());
            CPN_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpn_has_expected_length() {
        assert_eq!(generate_cpn().len(), CPN_LENGTH);
    }

    #[test]
    fn cpn_uses_only_alphabet_chars() {
        let cpn = generate_cpn();
        assert!(cpn
            .bytes()
            .all(|b| CPN_ALPHABET.contains(&b)));
    }

    #[test]
    fn successive_cpns_differ() {
        // Not a strict guarantee, but collision odds are astronomically low.
        let a = generate_cpn();
        let b = generate_cpn();
        assert_ne!(a, b);
    }
}
