use xxhash_rust::xxh3::Xxh3;

use tandem_wire::{encode, Wire};

/// Final value of a checksum context, compared across endpoints
pub type Digest = u64;

/// Records the step sequence of a deterministic computation.
///
/// Server and client feed the same steps in the same order while committing
/// the same operation; equal digests mean both sides computed the same
/// thing. Implementations must be order-sensitive and platform-stable.
pub trait ChecksumContext {
    /// Records a named step together with the bytes it produced
    fn step_value(&mut self, name: &str, value: &[u8]);

    /// Records a named step with no payload
    fn step(&mut self, name: &str) {
        self.step_value(name, &[]);
    }
}

/// Streaming xxh3 context, seeded per unit of work so digests from different
/// operations never collide by accident
pub struct Xxh3Context {
    hasher: Xxh3,
    steps: u32,
}

impl Xxh3Context {
    pub fn seeded(seed: u64) -> Self {
        Self {
            hasher: Xxh3::with_seed(seed),
            steps: 0,
        }
    }

    pub fn digest(&self) -> Digest {
        self.hasher.digest()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }
}

impl ChecksumContext for Xxh3Context {
    fn step_value(&mut self, name: &str, value: &[u8]) {
        // Length-prefixed framing keeps (name, value) pairs unambiguous no
        // matter what bytes they contain.
        self.hasher.update(&(name.len() as u64).to_le_bytes());
        self.hasher.update(name.as_bytes());
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value);
        self.steps += 1;
    }
}

/// Swallows every step. Used for dry runs and when checksum verification is
/// switched off.
pub struct NoopContext;

impl ChecksumContext for NoopContext {
    fn step_value(&mut self, _name: &str, _value: &[u8]) {}
}

/// Records a wire-encodable value as one step
pub fn step_wire<T: Wire>(cx: &mut dyn ChecksumContext, name: &str, value: &T) {
    cx.step_value(name, &encode(value));
}

// Tests
