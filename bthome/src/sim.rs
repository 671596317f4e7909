//! Host-side test doubles: a recording mock radio, canned entropy, and an
//! AEAD wrapper that injects failures.

use core::convert::Infallible;
use core::time::Duration;

use crate::backend::{EntropySource, RadioBackend};
use crate::{Aead, CipherError, Vec, ENCODED_LEN, KEY_LEN, NONCE_LEN, TAG_LEN};

#[derive(Debug, PartialEq, Eq)]
pub enum MockRadioError {
    StartRefused,
    StopRefused,
}

/// Records every payload handed to `start` and can refuse start/stop calls to
/// exercise the machine's degrade paths.
pub struct MockRadio {
    pub fail_start: bool,
    pub fail_stop: bool,
    started: Vec<Vec<u8>>,
    active: bool,
    stops: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MockRadioStats {
    pub starts: usize,
    pub stops: usize,
    pub active: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            fail_start: false,
            fail_stop: false,
            started: Vec::new(),
            active: false,
            stops: 0,
        }
    }

    /// Every payload that reached the radio, in broadcast order.
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.started
    }

    pub fn last_payload(&self) -> Option<&[u8]> {
        self.started.last().map(|p| p.as_slice())
    }

    pub fn stats(&self) -> MockRadioStats {
        MockRadioStats {
            starts: self.started.len(),
            stops: self.stops,
            active: self.active,
        }
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioBackend for MockRadio {
    type Error = MockRadioError;

    fn start(&mut self, payload: &[u8], _interval_hint: Duration) -> Result<(), Self::Error> {
        if self.fail_start {
            return Err(MockRadioError::StartRefused);
        }
        self.started.push(payload.to_vec());
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.stops += 1;
        if self.fail_stop {
            return Err(MockRadioError::StopRefused);
        }
        self.active = false;
        Ok(())
    }
}

/// Entropy source that replays a fixed seed. Tests only; a real device seeds
/// from hardware randomness.
pub struct FixedEntropy {
    seed: [u8; 4],
}

impl FixedEntropy {
    pub fn new(seed: [u8; 4]) -> Self {
        Self { seed }
    }
}

impl EntropySource for FixedEntropy {
    type Error = Infallible;

    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.seed[i % self.seed.len()];
        }
        Ok(())
    }
}

/// Entropy source that always fails, for the fatal-at-boot path.
pub struct BrokenEntropy;

#[derive(Debug, PartialEq, Eq)]
pub struct EntropyUnavailable;

impl EntropySource for BrokenEntropy {
    type Error = EntropyUnavailable;

    fn fill_bytes(&mut self, _buf: &mut [u8]) -> Result<(), Self::Error> {
        Err(EntropyUnavailable)
    }
}

/// Wraps an AEAD and fails the first `failures` seal calls, then delegates.
/// Lets tests check that a failed seal neither transmits nor burns a counter
/// value.
pub struct FlakyAead<A: Aead> {
    inner: A,
    failures: core::cell::Cell<usize>,
}

impl<A: Aead> FlakyAead<A> {
    pub fn new(inner: A, failures: usize) -> Self {
        Self {
            inner,
            failures: core::cell::Cell::new(failures),
        }
    }
}

impl<A: Aead> Aead for FlakyAead<A> {
    fn seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8; ENCODED_LEN],
    ) -> Result<([u8; ENCODED_LEN], [u8; TAG_LEN]), CipherError> {
        let remaining = self.failures.get();
        if remaining > 0 {
            self.failures.set(remaining - 1);
            return Err(CipherError::EncryptFailed);
        }
        self.inner.seal(key, nonce, plaintext)
    }

    fn open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8; ENCODED_LEN],
        tag: &[u8; TAG_LEN],
    ) -> Result<[u8; ENCODED_LEN], CipherError> {
        self.inner.open(key, nonce, ciphertext, tag)
    }
}
