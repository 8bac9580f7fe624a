//! Seeded random streams.
//!
//! Every consumer of randomness (the channel loss model, each node's
//! mobility, each node's routing jitter, position allocators) draws from
//! its own ChaCha8 stream derived from the scenario seed. Adding a node
//! therefore never perturbs the random sequence seen by another.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Well-known stream families. The node id (or allocator index) is mixed
/// in on top of the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Channel,
    Mobility,
    Routing,
    Placement,
    Energy,
}

impl Stream {
    fn tag(self) -> u64 {
        match self {
            Stream::Channel => 0x00c4_a77e,
            Stream::Mobility => 0x0b11_1717,
            Stream::Routing => 0x0a0d_0a0d,
            Stream::Placement => 0x0091_acee,
            Stream::Energy => 0x00e7_e76e,
        }
    }
}

/// Build the RNG for `(seed, stream, index)`.
pub fn stream_rng(seed: u64, stream: Stream, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    // One ChaCha stream per (family, index) pair.
    rng.set_stream(mix(stream.tag(), index));
    rng
}

/// SplitMix64 finaliser, used to spread (family, index) over the stream space.
fn mix(a: u64, b: u64) -> u64 {
    let mut z = a.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(b);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
