/*!
 * Encrypted Archive Driver
 * AES-256-GCM envelope around any inner archive driver
 *
 * Layout: magic (8) || nonce (12) || ciphertext with tag
 */

use super::driver::{ArchiveDriver, ArchiveReader, DriverContext, DriverError, EncodeEntry};
use super::keys::{ArchiveKey, KeyManager, KeyPurpose};
use crate::address::MountPoint;
use crate::core::limits::ARCHIVE_NONCE_LEN;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use bytes::Bytes;
use rand::RngCore;
use std::io::Write;
use tracing::debug;

const MAGIC: &[u8; 8] = b"FEDFSAE1";
const TAG_LEN: usize = 16;

/// Encrypts the serialized output of `D`
pub struct EncryptedDriver<D> {
    inner: D,
    name: String,
}

impl<D: ArchiveDriver> EncryptedDriver<D> {
    pub fn new(inner: D) -> Self {
        let name = format!("encrypted {}", inner.name());
        Self { inner, name }
    }

    fn cipher<'a>(
        &self,
        ctx: &DriverContext<'a>,
        purpose: KeyPurpose,
    ) -> Result<(Aes256Gcm, KeyLease<'a>), DriverError> {
        let keys = ctx
            .keys
            .ok_or_else(|| DriverError::Key(format!("no key manager for {}", ctx.mount_point)))?;
        let key = keys
            .obtain_key(ctx.mount_point, purpose)
            .map_err(|e| DriverError::Key(e.to_string()))?;
        let lease = KeyLease {
            keys,
            mount_point: ctx.mount_point,
        };
        let cipher = new_cipher(&key)?;
        Ok((cipher, lease))
    }
}

fn new_cipher(key: &ArchiveKey) -> Result<Aes256Gcm, DriverError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| DriverError::Key(e.to_string()))
}

/// Releases an obtained key on every exit path
struct KeyLease<'a> {
    keys: &'a dyn KeyManager,
    mount_point: &'a MountPoint,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        self.keys.release_key(self.mount_point);
    }
}

impl<D: ArchiveDriver> ArchiveDriver for EncryptedDriver<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, ctx: &DriverContext<'_>, data: Bytes) -> Result<Box<dyn ArchiveReader>, DriverError> {
        if data.len() < MAGIC.len() + ARCHIVE_NONCE_LEN + TAG_LEN || !data.starts_with(MAGIC) {
            return Err(DriverError::Format("missing encryption envelope".into()));
        }

        let plain = {
            let (cipher, _lease) = self.cipher(ctx, KeyPurpose::Decrypt)?;
            let nonce = Nonce::from_slice(&data[MAGIC.len()..MAGIC.len() + ARCHIVE_NONCE_LEN]);
            cipher
                .decrypt(nonce, &data[MAGIC.len() + ARCHIVE_NONCE_LEN..])
                .map_err(|_| DriverError::Key(format!("cannot decrypt {}: wrong key or tampered data", ctx.mount_point)))?
        };
        debug!(mount_point = %ctx.mount_point, bytes = plain.len(), "Decrypted archive");

        self.inner.decode(ctx, Bytes::from(plain)).map_err(|e| match e {
            DriverError::Format(reason) => DriverError::Corrupt {
                entry: ctx.mount_point.to_string(),
                reason: format!("decrypted payload is not a {} archive: {}", self.inner.name(), reason),
            },
            other => other,
        })
    }

    fn encode(
        &self,
        ctx: &DriverContext<'_>,
        entries: Vec<EncodeEntry>,
        sink: &mut dyn Write,
    ) -> Result<(), DriverError> {
        let mut plain = Vec::new();
        self.inner.encode(ctx, entries, &mut plain)?;

        let mut nonce = [0u8; ARCHIVE_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = {
            let (cipher, _lease) = self.cipher(ctx, KeyPurpose::Encrypt)?;
            cipher
                .encrypt(Nonce::from_slice(&nonce), plain.as_slice())
                .map_err(|e| DriverError::Key(e.to_string()))?
        };

        sink.write_all(MAGIC)?;
        sink.write_all(&nonce)?;
        sink.write_all(&ciphertext)?;
        Ok(())
    }
}
