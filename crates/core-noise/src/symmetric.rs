//! The Noise symmetric state: `h`, `ck`, `k`, `n`, and the five operations
//! that thread every handshake message through them.

use core_vault::{Persistence, SecretAttributes, SecretHandle, SecretType, Vault};

use crate::error::NoiseError;

/// Running transcript hash, chaining key, transient cipher key and its
/// nonce. Owned exclusively by one [`crate::Handshake`].
pub struct SymmetricState<'v, V: Vault> {
    vault: &'v V,
    h: [u8; 32],
    ck: SecretHandle,
    k: Option<SecretHandle>,
    n: u64,
}

fn pad_protocol_name(name: &[u8]) -> [u8; 32] {
    let mut h = [0u8; 32];
    h[..name.len()].copy_from_slice(name);
    h
}

impl<'v, V: Vault> SymmetricState<'v, V> {
    /// `initialize(protocol_name)` followed by `MixHash(prologue)` with an
    /// empty prologue.
    pub fn new(vault: &'v V, protocol_name: &[u8]) -> Result<Self, NoiseError> {
        debug_assert!(protocol_name.len() <= 32);
        let h = pad_protocol_name(protocol_name);
        let ck = vault.secret_import(SecretAttributes::buffer(32, Persistence::Ephemeral), &h)?;
        let mut state = Self { vault, h, ck, k: None, n: 0 };
        state.mix_hash(&[])?;
        Ok(state)
    }

    pub fn h(&self) -> [u8; 32] {
        self.h
    }

    pub fn mix_hash(&mut self, data: &[u8]) -> Result<(), NoiseError> {
        let mut input = Vec::with_capacity(32 + data.len());
        input.extend_from_slice(&self.h);
        input.extend_from_slice(data);
        self.h = self.vault.sha256(&input)?;
        Ok(())
    }

    /// `ikm` is consumed: it is always an ephemeral ECDH output, destroyed
    /// here whether or not the rest of the handshake later succeeds.
    pub fn mix_key(&mut self, ikm: SecretHandle) -> Result<(), NoiseError> {
        let outputs = self.vault.hkdf_sha256(self.ck, ikm, 2);
        self.vault.secret_destroy(ikm).ok();
        let outputs = outputs?;
        self.vault.secret_destroy(self.ck).ok();
        self.ck = outputs[0];
        if let Some(old_k) = self.k.take() {
            self.vault.secret_destroy(old_k).ok();
        }
        self.vault.secret_type_set(outputs[1], SecretType::Aes128Key)?;
        self.k = Some(outputs[1]);
        self.n = 0;
        Ok(())
    }

    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        match self.k {
            None => {
                self.mix_hash(plaintext)?;
                Ok(plaintext.to_vec())
            }
            Some(k) => {
                let mut out = Vec::new();
                self.vault.aead_aes_gcm_encrypt(k, self.n, &self.h, plaintext, &mut out)?;
                self.n += 1;
                self.mix_hash(&out)?;
                Ok(out)
            }
        }
    }

    /// The transcript hash is mixed with the received ciphertext regardless
    /// of whether decryption succeeds, so both peers converge even on the
    /// failing side's last step before it tears the context down.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        match self.k {
            None => {
                self.mix_hash(ciphertext)?;
                Ok(ciphertext.to_vec())
            }
            Some(k) => {
                let aad = self.h;
                let mut out = Vec::new();
                let result = self.vault.aead_aes_gcm_decrypt(k, self.n, &aad, ciphertext, &mut out);
                self.mix_hash(ciphertext)?;
                result?;
                self.n += 1;
                Ok(out)
            }
        }
    }

    /// `Split`: the terminal HKDF dividing `ck` into the two transport
    /// keys. Consumes the symmetric state; `ck`/`k` are destroyed.
    pub fn split(mut self) -> Result<(SecretHandle, SecretHandle), NoiseError> {
        let empty = self.vault.secret_import(SecretAttributes::buffer(0, Persistence::Ephemeral), &[])?;
        let outputs = self.vault.hkdf_sha256(self.ck, empty, 2);
        self.vault.secret_destroy(empty).ok();
        let outputs = outputs?;
        self.vault.secret_type_set(outputs[0], SecretType::Aes128Key)?;
        self.vault.secret_type_set(outputs[1], SecretType::Aes128Key)?;
        self.destroy();
        Ok((outputs[0], outputs[1]))
    }

    /// Zeroise and release `ck` and `k` (if present). Safe to call once;
    /// the struct is consumed or abandoned afterward.
    pub fn destroy(self) {
        self.vault.secret_destroy(self.ck).ok();
        if let Some(k) = self.k {
            self.vault.secret_destroy(k).ok();
        }
    }
}
