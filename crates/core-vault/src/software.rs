//! A pure-software [`Vault`]: all key material lives in process memory,
//! guarded by one lock per vault instance.

use std::collections::HashMap;

use curve25519_dalek::constants::X25519_BASEPOINT;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use parking_lot::Mutex;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::hkdf::{HKDF_SHA256, KeyType, Prk, Salt};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use crate::error::VaultError;
use crate::secret::SecretHandle;
use crate::types::{Persistence, Purpose, SecretAttributes, SecretType};
use crate::vault::{nonce_from_counter, Vault};

struct Slot {
    bytes: Vec<u8>,
    attrs: SecretAttributes,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

struct Table {
    slots: HashMap<u64, Slot>,
    next_id: u64,
}

/// Software-only [`Vault`] built on `ring` (SHA-256, HKDF, AES-GCM) and
/// `curve25519-dalek` (X25519). Every call locks the slot table for its
/// duration: a vault instance may be shared across channels.
pub struct SoftwareVault {
    table: Mutex<Table>,
    rng: SystemRandom,
}

impl Default for SoftwareVault {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareVault {
    pub fn new() -> Self {
        Self { table: Mutex::new(Table { slots: HashMap::new(), next_id: 1 }), rng: SystemRandom::new() }
    }

    fn insert(&self, bytes: Vec<u8>, attrs: SecretAttributes) -> SecretHandle {
        let mut t = self.table.lock();
        let id = t.next_id;
        t.next_id += 1;
        t.slots.insert(id, Slot { bytes, attrs });
        SecretHandle(id)
    }

    fn aead_algorithm(len: usize) -> Result<&'static aead::Algorithm, VaultError> {
        match len {
            16 => Ok(&aead::AES_128_GCM),
            32 => Ok(&aead::AES_256_GCM),
            _ => Err(VaultError::InvalidSecretType),
        }
    }
}

impl Vault for SoftwareVault {
    fn random(&self, buf: &mut [u8]) -> Result<(), VaultError> {
        if buf.len() != 32 {
            return Err(VaultError::InvalidSize);
        }
        self.rng.fill(buf).map_err(|_| VaultError::RandomFailure)
    }

    fn sha256(&self, input: &[u8]) -> Result<[u8; 32], VaultError> {
        let digest = ring::digest::digest(&ring::digest::SHA256, input);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        Ok(out)
    }

    fn secret_generate(&self, attrs: SecretAttributes) -> Result<SecretHandle, VaultError> {
        let len = match attrs.stype {
            SecretType::X25519Private => 32,
            SecretType::P256Private => return Err(VaultError::InvalidSecretType),
            SecretType::Aes128Key => 16,
            SecretType::Aes256Key => 32,
            SecretType::Buffer => attrs.length,
        };
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes).map_err(|_| VaultError::RandomFailure)?;
        Ok(self.insert(bytes, SecretAttributes { length: len, ..attrs }))
    }

    fn secret_import(&self, attrs: SecretAttributes, bytes: &[u8]) -> Result<SecretHandle, VaultError> {
        if bytes.len() != attrs.length {
            return Err(VaultError::InvalidSize);
        }
        Ok(self.insert(bytes.to_vec(), attrs))
    }

    fn secret_export(&self, secret: SecretHandle) -> Result<Vec<u8>, VaultError> {
        let t = self.table.lock();
        let slot = t.slots.get(&secret.0).ok_or(VaultError::InvalidSecret)?;
        if slot.attrs.stype != SecretType::Buffer {
            return Err(VaultError::InvalidSecretType);
        }
        Ok(slot.bytes.clone())
    }

    fn secret_attributes(&self, secret: SecretHandle) -> Result<SecretAttributes, VaultError> {
        let t = self.table.lock();
        t.slots.get(&secret.0).map(|s| s.attrs).ok_or(VaultError::InvalidSecret)
    }

    fn secret_publickey_get(&self, secret: SecretHandle) -> Result<[u8; 32], VaultError> {
        let t = self.table.lock();
        let slot = t.slots.get(&secret.0).ok_or(VaultError::InvalidSecret)?;
        if slot.attrs.stype != SecretType::X25519Private {
            return Err(VaultError::InvalidSecretType);
        }
        let scalar = scalar_from_slot(slot)?;
        Ok((scalar * X25519_BASEPOINT).to_bytes())
    }

    fn secret_type_set(&self, secret: SecretHandle, new_type: SecretType) -> Result<(), VaultError> {
        let mut t = self.table.lock();
        let slot = t.slots.get_mut(&secret.0).ok_or(VaultError::InvalidSecret)?;
        let allowed = matches!(
            (slot.attrs.stype, new_type),
            (SecretType::Buffer, SecretType::Aes128Key)
                | (SecretType::Buffer, SecretType::Aes256Key)
                | (SecretType::Aes128Key, SecretType::Buffer)
                | (SecretType::Aes256Key, SecretType::Buffer)
        );
        if !allowed {
            return Err(VaultError::InvalidSecretType);
        }
        slot.attrs.stype = new_type;
        Ok(())
    }

    fn secret_destroy(&self, secret: SecretHandle) -> Result<(), VaultError> {
        let mut t = self.table.lock();
        t.slots.remove(&secret.0).ok_or(VaultError::InvalidSecret)?;
        Ok(())
    }

    fn ecdh(&self, priv_key: SecretHandle, peer_public: &[u8; 32]) -> Result<SecretHandle, VaultError> {
        let scalar = {
            let t = self.table.lock();
            let slot = t.slots.get(&priv_key.0).ok_or(VaultError::InvalidSecret)?;
            if slot.attrs.stype != SecretType::X25519Private {
                return Err(VaultError::InvalidSecretType);
            }
            scalar_from_slot(slot)?
        };
        let point = MontgomeryPoint(*peer_public);
        let shared = (scalar * point).to_bytes();
        Ok(self.insert(shared.to_vec(), SecretAttributes::buffer(32, Persistence::Ephemeral)))
    }

    fn hkdf_sha256(
        &self,
        salt: SecretHandle,
        ikm: SecretHandle,
        n_outputs: usize,
    ) -> Result<Vec<SecretHandle>, VaultError> {
        if !(1..=3).contains(&n_outputs) {
            return Err(VaultError::InvalidParam);
        }
        let (salt_bytes, ikm_bytes) = {
            let t = self.table.lock();
            let salt_slot = t.slots.get(&salt.0).ok_or(VaultError::InvalidSecret)?;
            let ikm_slot = t.slots.get(&ikm.0).ok_or(VaultError::InvalidSecret)?;
            if salt_slot.attrs.stype != SecretType::Buffer || ikm_slot.attrs.stype != SecretType::Buffer {
                return Err(VaultError::InvalidSecretType);
            }
            (salt_slot.bytes.clone(), ikm_slot.bytes.clone())
        };
        let prk: Prk = Salt::new(HKDF_SHA256, &salt_bytes).extract(&ikm_bytes);
        let mut okm = vec![0u8; 32 * n_outputs];
        let info: [&[u8]; 1] = [&[]];
        let out = prk
            .expand(&info, OutputLen(okm.len()))
            .map_err(|_| VaultError::HkdfFailure)?;
        out.fill(&mut okm).map_err(|_| VaultError::HkdfFailure)?;
        let mut handles = Vec::with_capacity(n_outputs);
        for chunk in okm.chunks_exact(32) {
            handles.push(self.insert(chunk.to_vec(), SecretAttributes::buffer(32, Persistence::Ephemeral)));
        }
        okm.zeroize();
        Ok(handles)
    }

    fn aead_aes_gcm_encrypt(
        &self,
        key: SecretHandle,
        nonce: u64,
        aad: &[u8],
        plaintext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), VaultError> {
        let key_bytes = {
            let t = self.table.lock();
            let slot = t.slots.get(&key.0).ok_or(VaultError::InvalidSecret)?;
            if !matches!(slot.attrs.stype, SecretType::Aes128Key | SecretType::Aes256Key) {
                return Err(VaultError::InvalidSecretType);
            }
            slot.bytes.clone()
        };
        let alg = Self::aead_algorithm(key_bytes.len())?;
        let unbound = UnboundKey::new(alg, &key_bytes).map_err(|_| VaultError::AeadFailure)?;
        let sealing = LessSafeKey::new(unbound);
        let nonce_bytes = nonce_from_counter(nonce);
        let mut buf = plaintext.to_vec();
        sealing
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::from(aad), &mut buf)
            .map_err(|_| VaultError::AeadFailure)?;
        *out = buf;
        Ok(())
    }

    fn aead_aes_gcm_decrypt(
        &self,
        key: SecretHandle,
        nonce: u64,
        aad: &[u8],
        ciphertext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), VaultError> {
        let key_bytes = {
            let t = self.table.lock();
            let slot = t.slots.get(&key.0).ok_or(VaultError::InvalidSecret)?;
            if !matches!(slot.attrs.stype, SecretType::Aes128Key | SecretType::Aes256Key) {
                return Err(VaultError::InvalidSecretType);
            }
            slot.bytes.clone()
        };
        let alg = Self::aead_algorithm(key_bytes.len())?;
        let unbound = UnboundKey::new(alg, &key_bytes).map_err(|_| VaultError::AeadFailure)?;
        let opening = LessSafeKey::new(unbound);
        let nonce_bytes = nonce_from_counter(nonce);
        let mut buf = ciphertext.to_vec();
        let plaintext = opening
            .open_in_place(Nonce::assume_unique_for_key(nonce_bytes), Aad::from(aad), &mut buf)
            .map_err(|_| VaultError::AeadFailure)?;
        out.clear();
        out.extend_from_slice(plaintext);
        Ok(())
    }
}

fn scalar_from_slot(slot: &Slot) -> Result<Scalar, VaultError> {
    let bytes: [u8; 32] = slot.bytes.as_slice().try_into().map_err(|_| VaultError::InvalidSize)?;
    Ok(Scalar::from_bytes_mod_order(bytes))
}

struct OutputLen(usize);
impl KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretAttributes;

    fn vault() -> SoftwareVault {
        SoftwareVault::new()
    }

    #[test]
    fn ecdh_is_symmetric() {
        let v = vault();
        let a = v.secret_generate(SecretAttributes::x25519(Persistence::Ephemeral)).unwrap();
        let b = v.secret_generate(SecretAttributes::x25519(Persistence::Ephemeral)).unwrap();
        let a_pub = v.secret_publickey_get(a).unwrap();
        let b_pub = v.secret_publickey_get(b).unwrap();
        let shared_a = v.ecdh(a, &b_pub).unwrap();
        let shared_b = v.ecdh(b, &a_pub).unwrap();
        assert_eq!(v.secret_export(shared_a).unwrap(), v.secret_export(shared_b).unwrap());
    }

    #[test]
    fn aead_roundtrip_and_tamper() {
        let v = vault();
        let key = v.secret_generate(SecretAttributes { length: 16, ..SecretAttributes::buffer(16, Persistence::Ephemeral) }).unwrap();
        v.secret_type_set(key, SecretType::Aes128Key).unwrap();
        let mut ct = Vec::new();
        v.aead_aes_gcm_encrypt(key, 0, b"aad", b"hello world", &mut ct).unwrap();
        let mut pt = Vec::new();
        v.aead_aes_gcm_decrypt(key, 0, b"aad", &ct, &mut pt).unwrap();
        assert_eq!(pt, b"hello world");

        let mut bad = ct.clone();
        *bad.last_mut().unwrap() ^= 1;
        let mut scratch = Vec::new();
        assert!(v.aead_aes_gcm_decrypt(key, 0, b"aad", &bad, &mut scratch).is_err());
        assert!(scratch.is_empty());
    }

    #[test]
    fn hkdf_three_outputs_are_distinct() {
        let v = vault();
        let salt = v.secret_generate(SecretAttributes::buffer(32, Persistence::Ephemeral)).unwrap();
        let ikm = v.secret_generate(SecretAttributes::buffer(32, Persistence::Ephemeral)).unwrap();
        let outs = v.hkdf_sha256(salt, ikm, 3).unwrap();
        assert_eq!(outs.len(), 3);
        let bytes: Vec<_> = outs.iter().map(|s| v.secret_export(*s).unwrap()).collect();
        assert_ne!(bytes[0], bytes[1]);
        assert_ne!(bytes[1], bytes[2]);
    }

    #[test]
    fn secret_export_rejects_private_keys() {
        let v = vault();
        let k = v.secret_generate(SecretAttributes::x25519(Persistence::Ephemeral)).unwrap();
        assert_eq!(v.secret_export(k).unwrap_err(), VaultError::InvalidSecretType);
    }

    #[test]
    fn destroy_is_not_idempotent() {
        let v = vault();
        let k = v.secret_generate(SecretAttributes::buffer(32, Persistence::Ephemeral)).unwrap();
        v.secret_destroy(k).unwrap();
        assert_eq!(v.secret_destroy(k).unwrap_err(), VaultError::InvalidSecret);
    }
}
