//! Tracking code generation
//!
//! Codes are `TRK-` plus 8 characters drawn uniformly from `A-Z0-9`. The
//! random source is injected so tests and simulations can be replayed from a
//! seed.

use crate::domain::types::TrackingCode;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draws attempted by [`TrackingCodeGenerator::generate_unique`] before giving up
pub const MAX_ATTEMPTS: u32 = 100;

/// Every candidate collided with an existing code
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("could not generate a unique tracking code after {attempts} attempts")]
pub struct GenerationExhausted {
    pub attempts: u32,
}

/// Cloneable handle to one seedable random generator
///
/// Clones share the same underlying state, so a single seed drives every
/// component it is handed to.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn seeded(seed: u64) -> Self {
        Self { inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))) }
    }

    pub fn from_entropy() -> Self {
        Self { inner: Arc::new(Mutex::new(StdRng::from_entropy())) }
    }

    /// Seeded when `seed` is set, entropy otherwise
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Run `f` with exclusive access to the generator
    ///
    /// The lock is held only for the closure; never await inside it.
    pub fn with<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl std::fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRng").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct TrackingCodeGenerator {
    rng: SharedRng,
}

impl TrackingCodeGenerator {
    pub fn new(rng: SharedRng) -> Self {
        Self { rng }
    }

    /// One candidate code, not checked against any store
    pub fn generate(&self) -> TrackingCode {
        let mut code = String::with_capacity(TrackingCode::PREFIX.len() + TrackingCode::SUFFIX_LEN);
        code.push_str(TrackingCode::PREFIX);
        self.rng.with(|rng| {
            for _ in 0..TrackingCode::SUFFIX_LEN {
                code.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
        });
        TrackingCode::new(code)
    }

    /// Draw candidates until `exists` reports one as free
    ///
    /// Fails with [`GenerationExhausted`] after [`MAX_ATTEMPTS`] colliding
    /// draws. Errors from the predicate are returned as-is.
    pub async fn generate_unique<F, Fut, E>(&self, mut exists: F) -> Result<TrackingCode, E>
    where
        F: FnMut(TrackingCode) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: From<GenerationExhausted>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.generate();
            if !exists(candidate.clone()).await? {
                return Ok(candidate);
            }
        }
        Err(GenerationExhausted { attempts: MAX_ATTEMPTS }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_are_well_formed() {
        let generator = TrackingCodeGenerator::new(SharedRng::seeded(7));
        for _ in 0..1000 {
            let code = generator.generate();
            assert!(code.is_well_formed(), "bad code {code}");
        }
    }

    #[test]
    fn test_ten_thousand_codes_are_distinct() {
        let generator = TrackingCodeGenerator::new(SharedRng::seeded(42));
        let codes: HashSet<_> = (0..10_000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = TrackingCodeGenerator::new(SharedRng::seeded(99));
        let b = TrackingCodeGenerator::new(SharedRng::seeded(99));
        for _ in 0..20 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[tokio::test]
    async fn test_generate_unique_returns_first_free_code() {
        let generator = TrackingCodeGenerator::new(SharedRng::seeded(1));
        let mut calls = 0u32;
        let code = generator
            .generate_unique(|_| {
                calls += 1;
                let taken = calls < 3;
                async move { Ok::<_, GenerationExhausted>(taken) }
            })
            .await
            .unwrap();
        assert!(code.is_well_formed());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_generate_unique_gives_up_after_max_attempts() {
        let generator = TrackingCodeGenerator::new(SharedRng::seeded(1));
        let mut calls = 0u32;
        let err = generator
            .generate_unique(|_| {
                calls += 1;
                async { Ok::<_, GenerationExhausted>(true) }
            })
            .await
            .unwrap_err();
        assert_eq!(err, GenerationExhausted { attempts: MAX_ATTEMPTS });
        assert_eq!(calls, MAX_ATTEMPTS);
    }
}
