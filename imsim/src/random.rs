//! The session's single random stream.
//!
//! Every stochastic step (locator test renders, photon shooting, noise)
//! draws from one stream in call order, so a seeded session is
//! reproducible only for an identical object and detector/bandpass order.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: StdRng,
    seed: Option<u64>,
}

impl RandomStream {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Unseeded stream; results differ run to run.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            seed: None,
        }
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn is_reproducible(&self) -> bool {
        self.seed.is_some()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
