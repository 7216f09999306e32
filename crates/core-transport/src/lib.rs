//! Post-handshake transport-mode cipher: one send key, one receive
//! key, independent 64-bit counters, AES-GCM with the big-endian nonce
//! layout shared with the handshake.

use core_vault::{nonce_from_counter, SecretHandle, Vault, VaultError};

/// A single transport-mode AEAD message carries at most this many bytes of
/// ciphertext+tag; the wire header reserves a 15-bit length.
pub const MAX_FRAME: usize = 32767;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("nonce counter exhausted")]
    CounterExhausted,
    #[error("plaintext does not fit in a single frame")]
    FrameTooLarge,
}

/// Whether `decrypt` advances `n_recv` when the AEAD tag fails to verify.
/// The default is to *not* advance, so a forged or
/// replayed frame does not burn a nonce the legitimate sender will need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    PreserveCounterOnFailure,
    AdvanceCounterOnFailure,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::PreserveCounterOnFailure
    }
}

/// Two independent cipher states sharing one nonce construction, produced
/// by [`core_noise::Handshake::transport_keys`].
pub struct TransportCipher<'v, V: Vault> {
    vault: &'v V,
    k_send: SecretHandle,
    k_recv: SecretHandle,
    n_send: u64,
    n_recv: u64,
    on_failure: FailurePolicy,
}

impl<'v, V: Vault> TransportCipher<'v, V> {
    pub fn new(vault: &'v V, k_send: SecretHandle, k_recv: SecretHandle) -> Self {
        Self { vault, k_send, k_recv, n_send: 0, n_recv: 0, on_failure: FailurePolicy::default() }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn n_send(&self) -> u64 {
        self.n_send
    }

    pub fn n_recv(&self) -> u64 {
        self.n_recv
    }

    /// Zeroise and release both transport keys. Called on every channel exit
    /// path, success or failure, once a cipher pair exists.
    pub fn destroy(self) {
        self.vault.secret_destroy(self.k_send).ok();
        self.vault.secret_destroy(self.k_recv).ok();
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        if plaintext.len() + TAG_LEN > MAX_FRAME {
            return Err(TransportError::FrameTooLarge);
        }
        if self.n_send == u64::MAX {
            return Err(TransportError::CounterExhausted);
        }
        let mut out = Vec::new();
        self.vault.aead_aes_gcm_encrypt(self.k_send, self.n_send, &[], plaintext, &mut out)?;
        self.n_send += 1;
        Ok(out)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.n_recv == u64::MAX {
            return Err(TransportError::CounterExhausted);
        }
        let mut out = Vec::new();
        match self.vault.aead_aes_gcm_decrypt(self.k_recv, self.n_recv, &[], ciphertext, &mut out) {
            Ok(()) => {
                self.n_recv += 1;
                Ok(out)
            }
            Err(e) => {
                if self.on_failure == FailurePolicy::AdvanceCounterOnFailure {
                    self.n_recv += 1;
                }
                Err(TransportError::Vault(e))
            }
        }
    }
}

/// Exposed for callers that need the raw nonce layout (e.g. tests checking
/// it matches the handshake's), not used directly by `encrypt`/`decrypt`.
pub fn nonce_for(counter: u64) -> [u8; 12] {
    nonce_from_counter(counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_vault::{Persistence, SecretAttributes, SecretType, SoftwareVault};

    fn keypair(vault: &SoftwareVault) -> (SecretHandle, SecretHandle) {
        let a = vault.secret_generate(SecretAttributes::buffer(16, Persistence::Ephemeral)).unwrap();
        vault.secret_type_set(a, SecretType::Aes128Key).unwrap();
        let b = vault.secret_generate(SecretAttributes::buffer(16, Persistence::Ephemeral)).unwrap();
        vault.secret_type_set(b, SecretType::Aes128Key).unwrap();
        (a, b)
    }

    #[test]
    fn roundtrip_and_counters_match() {
        let vault = SoftwareVault::new();
        let (k1, k2) = keypair(&vault);
        let mut a = TransportCipher::new(&vault, k1, k2);
        let mut b = TransportCipher::new(&vault, k2, k1);

        for i in 0..5u32 {
            let msg = format!("frame {i}");
            let ct = a.encrypt(msg.as_bytes()).unwrap();
            let pt = b.decrypt(&ct).unwrap();
            assert_eq!(pt, msg.as_bytes());
            assert_eq!(a.n_send(), b.n_recv());
        }
    }

    #[test]
    fn replay_is_rejected_without_advancing_counter_by_default() {
        let vault = SoftwareVault::new();
        let (k1, k2) = keypair(&vault);
        let mut a = TransportCipher::new(&vault, k1, k2);
        let mut b = TransportCipher::new(&vault, k2, k1);

        let frame0 = a.encrypt(b"hello").unwrap();
        let frame1 = a.encrypt(b"world").unwrap();

        assert_eq!(b.decrypt(&frame0).unwrap(), b"hello");
        // Replay frame0: nonce 1 expected, frame0 was sealed under nonce 0.
        assert!(b.decrypt(&frame0).is_err());
        assert_eq!(b.n_recv(), 1);
        // Receiver is still in sync and can decrypt the next real frame.
        assert_eq!(b.decrypt(&frame1).unwrap(), b"world");
    }

    #[test]
    fn advance_on_failure_policy_burns_the_nonce() {
        let vault = SoftwareVault::new();
        let (k1, k2) = keypair(&vault);
        let mut a = TransportCipher::new(&vault, k1, k2);
        let mut b = TransportCipher::new(&vault, k2, k1).with_failure_policy(FailurePolicy::AdvanceCounterOnFailure);

        let frame0 = a.encrypt(b"hello").unwrap();
        let frame1 = a.encrypt(b"world").unwrap();
        // Present frame1 first: b expects nonce 0, fails, but still advances.
        assert!(b.decrypt(&frame1).is_err());
        assert_eq!(b.n_recv(), 1);
        // frame0 (nonce 0) is now unreachable under this policy.
        assert!(b.decrypt(&frame0).is_err());
    }
}
