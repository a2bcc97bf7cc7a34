//! Identifier and secret issuance.
//!
//! Identifiers are 64-bit and time-ordered:
//!
//! ```text
//! | ms since 2020-01-01 (42) | region (6) | node (6) | sequence (10) |
//! ```
//!
//! rendered in base 36. The millisecond and sequence parts come from one
//! atomic logical clock, so concurrent callers never observe the same value
//! and never wait: when a millisecond's sequence space runs out the clock
//! moves into the next millisecond ahead of wall time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// 2020-01-01T00:00:00Z in Unix milliseconds.
const EPOCH_MS: u64 = 1_577_836_800_000;

const SEQ_BITS: u32 = 10;
const NODE_BITS: u32 = 6;
const REGION_BITS: u32 = 6;
const TIME_BITS: u32 = 64 - REGION_BITS - NODE_BITS - SEQ_BITS;

/// Largest region or node id.
pub const MAX_SCOPE_ID: i64 = (1 << NODE_BITS) - 1;

const SECRET_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("{scope} id {value} out of range 0..=63")]
    OutOfRange { scope: &'static str, value: i64 },
}

/// Decoded parts of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Unix milliseconds.
    pub millis: u64,
    pub region: u8,
    pub node: u8,
    pub sequence: u16,
}

impl IdParts {
    pub fn parse(id: &str) -> Option<Self> {
        let raw = u64::from_str_radix(id, 36).ok()?;
        Some(Self {
            millis: (raw >> (REGION_BITS + NODE_BITS + SEQ_BITS)) + EPOCH_MS,
            region: ((raw >> (NODE_BITS + SEQ_BITS)) & mask(REGION_BITS)) as u8,
            node: ((raw >> SEQ_BITS) & mask(NODE_BITS)) as u8,
            sequence: (raw & mask(SEQ_BITS)) as u16,
        })
    }
}

/// Issues identifiers unique within one (region, node) scope.
#[derive(Debug)]
pub struct IdIssuer {
    scope: u64,
    /// `(ms_since_epoch << SEQ_BITS) | sequence` of the last issued id.
    clock: AtomicU64,
}

impl IdIssuer {
    pub fn new(region: i64, node: i64) -> Result<Self, IdError> {
        for (scope, value) in [("region", region), ("node", node)] {
            if !(0..=MAX_SCOPE_ID).contains(&value) {
                return Err(IdError::OutOfRange { scope, value });
            }
        }
        Ok(Self {
            scope: ((region as u64) << NODE_BITS) | node as u64,
            clock: AtomicU64::new(0),
        })
    }

    /// A new identifier, in base 36.
    pub fn new_id(&self) -> String {
        to_base36(self.next_raw())
    }

    /// A new secret token.
    pub fn new_secret(&self) -> String {
        new_secret()
    }

    fn next_raw(&self) -> u64 {
        let now = (now_ms().saturating_sub(EPOCH_MS) & mask(TIME_BITS)) << SEQ_BITS;
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    let millis = next >> SEQ_BITS;
                    let sequence = next & mask(SEQ_BITS);
                    return (millis << (REGION_BITS + NODE_BITS + SEQ_BITS))
                        | (self.scope << SEQ_BITS)
                        | sequence;
                }
                Err(actual) => prev = actual,
            }
        }
    }
}

/// 128 random bits from the OS CSPRNG, lower-case hex.
pub fn new_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
