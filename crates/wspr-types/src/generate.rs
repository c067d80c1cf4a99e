//! Random field generation over the WSPR character grammar.
//!
//! Every generator draws from the caller's [`Rng`], so a seeded
//! `StdRng` reproduces the same corpus.

use rand::Rng;

use crate::{
    CALLSIGN_LEAD, Callsign, DIGITS, LETTERS, LOCATOR_LETTERS, Locator, MAX_CALLSIGN_SUFFIX,
    Message, POWER_LEVELS_DBM, PowerLevel,
};

fn pick<R: Rng>(rng: &mut R, alphabet: &[u8]) -> char {
    char::from(alphabet[rng.random_range(0..alphabet.len())])
}

pub fn random_callsign<R: Rng>(rng: &mut R) -> Callsign {
    let mut suffix_len = rng.random_range(0..=MAX_CALLSIGN_SUFFIX);

    let mut raw = String::with_capacity(3 + MAX_CALLSIGN_SUFFIX);
    raw.push(pick(rng, CALLSIGN_LEAD));
    raw.push(pick(rng, LETTERS));
    raw.push(pick(rng, DIGITS));

    // A blank lead is only decodable with at least one trailing letter.
    if raw.starts_with(' ') && suffix_len == 0 {
        suffix_len = 1;
    }
    for _ in 0..suffix_len {
        raw.push(pick(rng, LETTERS));
    }

    Callsign::from_grammar(raw)
}

pub fn random_locator<R: Rng>(rng: &mut R) -> Locator {
    let mut raw = String::with_capacity(4);
    raw.push(pick(rng, LOCATOR_LETTERS));
    raw.push(pick(rng, LOCATOR_LETTERS));
    raw.push(pick(rng, DIGITS));
    raw.push(pick(rng, DIGITS));
    Locator::from_grammar(raw)
}

pub fn random_power<R: Rng>(rng: &mut R) -> PowerLevel {
    PowerLevel::from_grammar(POWER_LEVELS_DBM[rng.random_range(0..POWER_LEVELS_DBM.len())])
}

pub fn random_message<R: Rng>(rng: &mut R) -> Message {
    let callsign = random_callsign(rng);
    let locator = random_locator(rng);
    let power = random_power(rng);
    Message::new(callsign, locator, power)
}
