//! Chunked streaming format (v4).
//!
//! A v4 artifact is a sequence of self-delimiting chunks. Every chunk
//! starts with the same 21-byte header, then a fresh 24-byte iv seed, then
//! the AEAD ciphertext of its clear slab:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     version varint (0x04)
//! 1       4     encrypted_chunk_size (u32 LE)
//! 5       16    resource_id
//! 21      24    iv_seed
//! 45      …     ciphertext ‖ tag(16)
//! ```
//!
//! The AEAD nonce is derived per chunk as `derive_iv(iv_seed, index)`,
//! binding each chunk to its position: reordered or substituted chunks
//! fail authentication. All chunks are exactly `encrypted_chunk_size`
//! bytes except the last, which is strictly shorter; when the clear
//! length is an exact multiple of the clear chunk size (including zero)
//! the stream ends with an empty-payload chunk so truncation at a chunk
//! boundary stays detectable.

use std::collections::VecDeque;

use sharekit_crypto::{
    aead_decrypt, aead_encrypt, derive_iv, random_array, SymmetricKey, MAC_SIZE,
    XCHACHA_IV_SIZE,
};

use super::varint::{decode_varint, encode_varint};
use crate::types::{ResourceId, RESOURCE_ID_SIZE};
use crate::{Error, Result};

/// Default encrypted chunk size: 1 MiB.
pub const DEFAULT_ENCRYPTED_CHUNK_SIZE: u32 = 1024 * 1024;

/// Fixed bytes of overhead per encrypted chunk: header, iv seed, tag.
pub const CHUNK_OVERHEAD: usize = StreamHeader::SIZE + XCHACHA_IV_SIZE + MAC_SIZE;

/// The header prepended to every chunk of a streaming artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Size of every chunk but the last, in encrypted bytes.
    pub encrypted_chunk_size: u32,
    /// The resource this stream belongs to.
    pub resource_id: ResourceId,
}

impl StreamHeader {
    /// Serialized header size in bytes.
    pub const SIZE: usize = 1 + 4 + RESOURCE_ID_SIZE;

    /// Serializes the header.
    #[must_use]
    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = Vec::with_capacity(Self::SIZE);
        encode_varint(super::CURRENT_STREAM_VERSION, &mut out);
        out.extend_from_slice(&self.encrypted_chunk_size.to_le_bytes());
        out.extend_from_slice(self.resource_id.as_bytes());
        out.try_into().expect("header layout is 21 bytes")
    }

    /// Parses a header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncryptionFormat`] if the version is not 4
    /// and [`Error::DecryptionFailed`] if the buffer is too short or the
    /// chunk size cannot hold a single clear byte.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::decryption("truncated stream header"));
        }
        let (version, version_len) = decode_varint(bytes)?;
        if version != super::CURRENT_STREAM_VERSION {
            return Err(Error::InvalidEncryptionFormat { version });
        }
        let size_bytes = &bytes[version_len..version_len + 4];
        let encrypted_chunk_size =
            u32::from_le_bytes(size_bytes.try_into().expect("sliced to 4 bytes"));
        if (encrypted_chunk_size as usize) <= CHUNK_OVERHEAD {
            return Err(Error::decryption("invalid encrypted chunk size"));
        }
        let resource_id =
            ResourceId::from_slice(&bytes[version_len + 4..version_len + 4 + RESOURCE_ID_SIZE])?;
        Ok(Self {
            encrypted_chunk_size,
            resource_id,
        })
    }
}

/// Stateful chunked encryptor.
///
/// Feed clear bytes with [`EncryptionStream::push`], collect encrypted
/// chunks with [`EncryptionStream::pop_chunk`], and call
/// [`EncryptionStream::finish`] exactly once to emit the terminating
/// chunk.
pub struct EncryptionStream {
    key: SymmetricKey,
    header_bytes: [u8; StreamHeader::SIZE],
    resource_id: ResourceId,
    clear_chunk_size: usize,
    buffer: Vec<u8>,
    chunks: VecDeque<Vec<u8>>,
    index: u64,
    finished: bool,
}

impl EncryptionStream {
    /// Creates a stream for `resource_id` with an explicit chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `encrypted_chunk_size` leaves
    /// no room for clear bytes.
    pub fn new(
        key: SymmetricKey,
        resource_id: ResourceId,
        encrypted_chunk_size: u32,
    ) -> Result<Self> {
        let encrypted = encrypted_chunk_size as usize;
        if encrypted <= CHUNK_OVERHEAD {
            return Err(Error::invalid_argument(format!(
                "encrypted chunk size must exceed the per-chunk overhead of {CHUNK_OVERHEAD} bytes"
            )));
        }
        let header = StreamHeader {
            encrypted_chunk_size,
            resource_id,
        };
        Ok(Self {
            key,
            header_bytes: header.serialize(),
            resource_id,
            clear_chunk_size: encrypted - CHUNK_OVERHEAD,
            buffer: Vec::new(),
            chunks: VecDeque::new(),
            index: 0,
            finished: false,
        })
    }

    /// Creates a stream with the default 1 MiB chunk size.
    #[must_use]
    pub fn with_default_chunk_size(key: SymmetricKey, resource_id: ResourceId) -> Self {
        Self::new(key, resource_id, DEFAULT_ENCRYPTED_CHUNK_SIZE)
            .expect("default chunk size exceeds the overhead")
    }

    /// The stream's resource id.
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Feeds clear bytes into the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] after [`Self::finish`].
    pub fn push(&mut self, clear: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::precondition("encryption stream already finished"));
        }
        self.buffer.extend_from_slice(clear);
        while self.buffer.len() >= self.clear_chunk_size {
            let slab: Vec<u8> = self.buffer.drain(..self.clear_chunk_size).collect();
            self.encrypt_chunk(&slab)?;
        }
        Ok(())
    }

    /// Returns the next encrypted chunk, if one is ready.
    pub fn pop_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    /// Terminates the stream, emitting the final chunk.
    ///
    /// The final chunk is always shorter than `encrypted_chunk_size`; it
    /// has an empty payload when the clear length was an exact multiple
    /// of the clear chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] when called twice.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::precondition("encryption stream already finished"));
        }
        let tail = std::mem::take(&mut self.buffer);
        self.encrypt_chunk(&tail)?;
        self.finished = true;
        Ok(())
    }

    fn encrypt_chunk(&mut self, clear: &[u8]) -> Result<()> {
        let iv_seed = random_array::<XCHACHA_IV_SIZE>();
        let iv = derive_iv(&iv_seed, self.index);
        let ciphertext = aead_encrypt(&self.key, &iv, clear, b"")
            .map_err(|err| Error::internal(format!("chunk encryption failed: {err}")))?;

        let mut chunk =
            Vec::with_capacity(StreamHeader::SIZE + XCHACHA_IV_SIZE + ciphertext.len());
        chunk.extend_from_slice(&self.header_bytes);
        chunk.extend_from_slice(&iv_seed);
        chunk.extend_from_slice(&ciphertext);
        self.chunks.push_back(chunk);
        self.index += 1;
        Ok(())
    }
}

/// Stateful chunked decryptor.
///
/// Feed encrypted bytes with [`DecryptionStream::push`]. After the first
/// 21 bytes, [`DecryptionStream::header`] exposes the resource id so the
/// owner can resolve the content key and arm the stream with
/// [`DecryptionStream::start`]; clear slabs then become available through
/// [`DecryptionStream::pop_clear`]. [`DecryptionStream::finish`] validates
/// the terminating chunk and returns any remaining clear bytes.
pub struct DecryptionStream {
    buffer: Vec<u8>,
    header: Option<StreamHeader>,
    header_bytes: [u8; StreamHeader::SIZE],
    key: Option<SymmetricKey>,
    clear: VecDeque<Vec<u8>>,
    index: u64,
    poisoned: bool,
}

impl Default for DecryptionStream {
    fn default() -> Self {
        Self::new()
    }
}

impl DecryptionStream {
    /// Creates an empty decryption stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            header: None,
            header_bytes: [0u8; StreamHeader::SIZE],
            key: None,
            clear: VecDeque::new(),
            index: 0,
            poisoned: false,
        }
    }

    /// The stream header, once 21 bytes have been fed.
    #[must_use]
    pub const fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Arms the stream with the resolved content key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] if called before the header
    /// arrived or twice, plus any chunk decryption error for bytes already
    /// buffered.
    pub fn start(&mut self, key: SymmetricKey) -> Result<()> {
        self.check_usable()?;
        if self.header.is_none() {
            return Err(Error::precondition(
                "decryption stream started before the header arrived",
            ));
        }
        if self.key.is_some() {
            return Err(Error::precondition("decryption stream already started"));
        }
        self.key = Some(key);
        self.guard(Self::drain_full_chunks)
    }

    /// Feeds encrypted bytes into the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] on a malformed header or a
    /// chunk that fails authentication; once an error occurred all
    /// further pushes are rejected.
    pub fn push(&mut self, encrypted: &[u8]) -> Result<()> {
        self.check_usable()?;
        self.buffer.extend_from_slice(encrypted);
        self.guard(|stream| {
            if stream.header.is_none() && stream.buffer.len() >= StreamHeader::SIZE {
                let header = StreamHeader::deserialize(&stream.buffer)?;
                stream.header_bytes = header.serialize();
                stream.header = Some(header);
            }
            stream.drain_full_chunks()
        })
    }

    /// Returns the next decrypted clear slab, if one is ready.
    pub fn pop_clear(&mut self) -> Option<Vec<u8>> {
        self.clear.pop_front()
    }

    /// Terminates the stream, validating the final chunk.
    ///
    /// Returns the concatenation of all clear bytes not yet retrieved
    /// with [`Self::pop_clear`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] with context `"truncated"` if
    /// the source closed on a chunk boundary without the terminating
    /// chunk, and [`Error::PreconditionFailed`] if the stream was never
    /// started.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.check_usable()?;
        if self.key.is_none() {
            return Err(Error::precondition("decryption stream never started"));
        }
        let resource_id = self.header.map(|header| header.resource_id);

        if self.buffer.is_empty() {
            // A clean close on a chunk boundary: either nothing arrived at
            // all, or a full-size chunk came last without its terminator.
            return Err(match resource_id {
                Some(id) => Error::decryption_for(id, "truncated"),
                None => Error::decryption("truncated"),
            });
        }

        let tail = std::mem::take(&mut self.buffer);
        self.decrypt_chunk(&tail)?;
        let mut out = Vec::new();
        while let Some(slab) = self.clear.pop_front() {
            out.extend_from_slice(&slab);
        }
        Ok(out)
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::decryption("decryption stream previously failed"));
        }
        Ok(())
    }

    fn guard(&mut self, op: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let outcome = op(self);
        if outcome.is_err() {
            self.poisoned = true;
        }
        outcome
    }

    fn drain_full_chunks(&mut self) -> Result<()> {
        let Some(header) = self.header else {
            return Ok(());
        };
        if self.key.is_none() {
            return Ok(());
        }
        let chunk_size = header.encrypted_chunk_size as usize;
        while self.buffer.len() >= chunk_size {
            let chunk: Vec<u8> = self.buffer.drain(..chunk_size).collect();
            self.decrypt_chunk(&chunk)?;
        }
        Ok(())
    }

    fn decrypt_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let header = self.header.expect("chunks decrypted only after the header");
        let key = self.key.clone().expect("chunks decrypted only once started");
        let resource_id = header.resource_id;

        if chunk.len() < CHUNK_OVERHEAD {
            self.poisoned = true;
            return Err(Error::decryption_for(resource_id, "truncated"));
        }
        if chunk[..StreamHeader::SIZE] != self.header_bytes {
            self.poisoned = true;
            return Err(Error::decryption_for(
                resource_id,
                "chunk header differs from the stream header",
            ));
        }

        let iv_seed: [u8; XCHACHA_IV_SIZE] = chunk
            [StreamHeader::SIZE..StreamHeader::SIZE + XCHACHA_IV_SIZE]
            .try_into()
            .expect("sliced to iv seed size");
        let iv = derive_iv(&iv_seed, self.index);
        let ciphertext = &chunk[StreamHeader::SIZE + XCHACHA_IV_SIZE..];
        let clear = aead_decrypt(&key, &iv, ciphertext, b"").map_err(|_| {
            self.poisoned = true;
            Error::decryption_for(resource_id, "chunk authentication failed")
        })?;

        self.index += 1;
        self.clear.push_back(clear);
        Ok(())
    }
}

/// One-call streaming encryption of an in-memory buffer.
///
/// # Errors
///
/// Propagates [`EncryptionStream`] errors.
pub fn encrypt_buffer(
    key: &SymmetricKey,
    resource_id: ResourceId,
    encrypted_chunk_size: u32,
    clear: &[u8],
) -> Result<Vec<u8>> {
    let mut stream = EncryptionStream::new(key.clone(), resource_id, encrypted_chunk_size)?;
    stream.push(clear)?;
    stream.finish()?;
    let mut out = Vec::new();
    while let Some(chunk) = stream.pop_chunk() {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// One-call streaming decryption of an in-memory buffer with a known key.
///
/// # Errors
///
/// Propagates [`DecryptionStream`] errors.
pub fn decrypt_buffer(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    let mut stream = DecryptionStream::new();
    // Without a key, pushes only buffer bytes and parse the header.
    stream.push(encrypted)?;
    if stream.header().is_none() {
        return Err(Error::decryption("truncated"));
    }
    stream.start(key.clone())?;
    stream.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_CHUNK: u32 = (CHUNK_OVERHEAD + 7) as u32;

    fn key() -> SymmetricKey {
        SymmetricKey::from_bytes([0u8; 32])
    }

    fn resource_id() -> ResourceId {
        ResourceId::from_bytes([0xAA; 16])
    }

    #[test]
    fn test_header_roundtrip() {
        let header = StreamHeader {
            encrypted_chunk_size: DEFAULT_ENCRYPTED_CHUNK_SIZE,
            resource_id: resource_id(),
        };
        let bytes = header.serialize();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 0x04);
        assert_eq!(StreamHeader::deserialize(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_undersized_chunk_size() {
        let header = StreamHeader {
            encrypted_chunk_size: CHUNK_OVERHEAD as u32,
            resource_id: resource_id(),
        };
        assert!(matches!(
            StreamHeader::deserialize(&header.serialize()),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_chunk() {
        // 21 clear bytes over a 7-byte clear chunk size: three full chunks
        // plus the empty terminator.
        let encrypted =
            encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"messagemessagemessage")
                .unwrap();
        let full = SMALL_CHUNK as usize;
        assert_eq!(encrypted.len(), 3 * full + CHUNK_OVERHEAD);
        assert_eq!(
            decrypt_buffer(&key(), &encrypted).unwrap(),
            b"messagemessagemessage"
        );
    }

    #[test]
    fn test_short_tail_needs_no_empty_chunk() {
        let clear = b"messagemessagemessag"; // 20 bytes
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, clear).unwrap();
        let full = SMALL_CHUNK as usize;
        assert_eq!(encrypted.len(), 2 * full + CHUNK_OVERHEAD + 6);
        assert_eq!(decrypt_buffer(&key(), &encrypted).unwrap(), clear);
    }

    #[test]
    fn test_empty_clear_data_is_one_empty_chunk() {
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"").unwrap();
        assert_eq!(encrypted.len(), CHUNK_OVERHEAD);
        assert_eq!(decrypt_buffer(&key(), &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_header_carries_resource_id() {
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"abc").unwrap();
        let header = StreamHeader::deserialize(&encrypted).unwrap();
        assert_eq!(header.resource_id, resource_id());
        assert_eq!(
            crate::codec::extract_resource_id(&encrypted).unwrap(),
            resource_id()
        );
    }

    #[test]
    fn test_removing_terminator_is_detected() {
        let encrypted =
            encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"messagemessagemessage")
                .unwrap();
        let without_terminator = &encrypted[..encrypted.len() - CHUNK_OVERHEAD];
        match decrypt_buffer(&key(), without_terminator) {
            Err(Error::DecryptionFailed { context, .. }) => {
                assert_eq!(context, "truncated");
            }
            other => panic!("expected truncation error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncating_any_byte_fails() {
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"12345678").unwrap();
        let truncated = &encrypted[..encrypted.len() - 1];
        assert!(matches!(
            decrypt_buffer(&key(), truncated),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_flipping_ciphertext_byte_fails() {
        let mut encrypted =
            encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"12345678").unwrap();
        let target = StreamHeader::SIZE + XCHACHA_IV_SIZE + 2;
        encrypted[target] ^= 0x10;
        assert!(matches!(
            decrypt_buffer(&key(), &encrypted),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_chunk_reordering_fails() {
        let mut encrypted =
            encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"messagemessage").unwrap();
        let full = SMALL_CHUNK as usize;
        let (first, rest) = encrypted.split_at_mut(full);
        first.swap_with_slice(&mut rest[..full]);
        assert!(matches!(
            decrypt_buffer(&key(), &encrypted),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"payload").unwrap();
        let wrong = SymmetricKey::from_bytes([1u8; 32]);
        assert!(matches!(
            decrypt_buffer(&wrong, &encrypted),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_poisoned_stream_rejects_further_pushes() {
        let encrypted = encrypt_buffer(&key(), resource_id(), SMALL_CHUNK, b"payload").unwrap();
        let mut stream = DecryptionStream::new();
        stream.push(&encrypted[..StreamHeader::SIZE]).unwrap();
        stream.start(SymmetricKey::from_bytes([1u8; 32])).unwrap();
        assert!(stream.push(&encrypted[StreamHeader::SIZE..]).is_err());
        assert!(stream.push(b"more").is_err());
    }

    #[test]
    fn test_push_after_finish_rejected() {
        let mut stream = EncryptionStream::new(key(), resource_id(), SMALL_CHUNK).unwrap();
        stream.finish().unwrap();
        assert!(matches!(
            stream.push(b"late"),
            Err(Error::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn test_incremental_pushes_match_one_shot() {
        let clear: Vec<u8> = (0u8..=255).cycle().take(100).collect();
        let mut stream = EncryptionStream::new(key(), resource_id(), SMALL_CHUNK).unwrap();
        for piece in clear.chunks(13) {
            stream.push(piece).unwrap();
        }
        stream.finish().unwrap();
        let mut encrypted = Vec::new();
        while let Some(chunk) = stream.pop_chunk() {
            encrypted.extend_from_slice(&chunk);
        }

        // Feed the decryptor byte by byte to exercise buffering.
        let mut decryptor = DecryptionStream::new();
        let mut started = false;
        for byte in &encrypted {
            decryptor.push(std::slice::from_ref(byte)).unwrap();
            if !started && decryptor.header().is_some() {
                decryptor.start(key()).unwrap();
                started = true;
            }
        }
        assert_eq!(decryptor.finish().unwrap(), clear);
    }
}
