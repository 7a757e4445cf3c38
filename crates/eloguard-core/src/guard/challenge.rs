use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};

use crate::error::ValidationError;

/// Symbols a challenge is drawn from. Several are easy to mistype on purpose.
pub const CHALLENGE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Upper bound on challenge length; anything longer is a typo in the settings.
pub const MAX_CHALLENGE_LENGTH: usize = 256;

/// A transcription puzzle that has to be typed back exactly to override a
/// lock or cooldown. A fresh one is generated every time it is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockChallenge {
    text: String,
}

impl UnlockChallenge {
    /// Draw `length` symbols from the OS random source.
    pub fn generate(length: usize) -> Result<Self, ValidationError> {
        Self::generate_with(&mut OsRng, length)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(
        rng: &mut R,
        length: usize,
    ) -> Result<Self, ValidationError> {
        if length == 0 || length > MAX_CHALLENGE_LENGTH {
            return Err(ValidationError::InvalidValue {
                field: "challenge_length".into(),
                message: format!("must be between 1 and {MAX_CHALLENGE_LENGTH}, got {length}"),
            });
        }

        let text = (0..length)
            .map(|_| char::from(CHALLENGE_ALPHABET[rng.gen_range(0..CHALLENGE_ALPHABET.len())]))
            .collect();
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte-exact, case-sensitive comparison. No trimming.
    pub fn verify(&self, input: &str) -> bool {
        self.text == input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn alphabet_is_wide_enough() {
        assert!(CHALLENGE_ALPHABET.len() >= 80);
        assert!(CHALLENGE_ALPHABET.is_ascii());
    }

    #[test]
    fn generates_requested_length_from_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let challenge = UnlockChallenge::generate_with(&mut rng, 24).unwrap();
        assert_eq!(challenge.text().len(), 24);
        assert!(challenge
            .text()
            .bytes()
            .all(|b| CHALLENGE_ALPHABET.contains(&b)));
    }

    #[test]
    fn rejects_zero_and_oversized_lengths() {
        assert!(UnlockChallenge::generate(0).is_err());
        assert!(UnlockChallenge::generate(MAX_CHALLENGE_LENGTH + 1).is_err());
        assert!(UnlockChallenge::generate(MAX_CHALLENGE_LENGTH).is_ok());
    }

    #[test]
    fn verify_requires_exact_match() {
        let mut rng = StdRng::seed_from_u64(42);
        let challenge = UnlockChallenge::generate_with(&mut rng, 10).unwrap();
        let text = challenge.text().to_string();

        assert!(challenge.verify(&text));
        assert!(!challenge.verify(&format!("{text} ")));
        assert!(!challenge.verify(&format!(" {text}")));
        assert!(!challenge.verify(&text[..9]));
        assert!(!challenge.verify(""));
    }

    #[test]
    fn verify_is_case_sensitive() {
        let challenge = UnlockChallenge {
            text: "aB3$xY".into(),
        };
        assert!(!challenge.verify("ab3$xy"));
        assert!(!challenge.verify("AB3$XY"));
        assert!(challenge.verify("aB3$xY"));
    }

    #[test]
    fn consecutive_challenges_differ() {
        let a = UnlockChallenge::generate(16).unwrap();
        let b = UnlockChallenge::generate(16).unwrap();
        assert_ne!(a, b);
    }
}
