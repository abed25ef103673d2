use log::debug;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// RandMode controls random generator behaviour. May be predictable for testing or truly random for gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandMode {
    Predictable(u64),
    RandomUniform,
}

pub struct ZRand {
    rng: Box<dyn RngCore>,
    rand_mode: RandMode,
}

impl ZRand {
    pub fn new(rm: RandMode) -> ZRand {
        let rng: Box<dyn RngCore> = match rm {
            RandMode::Predictable(seed) => Box::new(StdRng::seed_from_u64(seed)),
            RandMode::RandomUniform => Box::new(StdRng::from_entropy()),
        };
        ZRand { rng, rand_mode: rm }
    }

    pub fn new_uniform() -> ZRand {
        ZRand::new(RandMode::RandomUniform)
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand::new(RandMode::Predictable(seed))
    }

    pub fn mode(&self) -> RandMode {
        self.rand_mode
    }

    /// Reseed from the story's `random` opcode: a positive seed makes the
    /// sequence predictable, zero returns to true randomness
    pub fn reseed(&mut self, seed: u64) {
        debug!("Reseeding random generator with {}", seed);
        *self = if seed == 0 {
            ZRand::new_uniform()
        } else {
            ZRand::new_predictable(seed)
        };
    }

    /// Uniform value in 1..=range
    pub fn gen_range(&mut self, range: u16) -> u16 {
        if range == 0 {
            return 0;
        }
        self.rng.gen_range(1..=range)
    }
}
