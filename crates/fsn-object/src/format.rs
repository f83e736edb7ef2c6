//! Object finalization and validation.
//!
//! An object id is the hash of its header, so the header must be complete
//! (length, both checksums, creation epoch) before the id is computed and
//! must not change afterwards.

use fsn_crypto::{verify_checksum, ContentHasher, PayloadHasher};
use fsn_types::{Header, Object, ObjectId};

use crate::error::{ObjectError, ObjectResult};

/// Fill the payload-derived fields of `header` from `hasher`.
pub fn finalize_header(header: &mut Header, hasher: &PayloadHasher, epoch: u64) {
    let (sha, tz) = hasher.finalize();
    header.payload_length = hasher.written();
    header.payload_checksum = Some(sha);
    header.payload_homomorphic_hash = Some(tz);
    header.creation_epoch = epoch;
}

/// Id of a finalized header.
pub fn header_id(header: &Header) -> ObjectResult<ObjectId> {
    if header.payload_checksum.is_none() || header.payload_homomorphic_hash.is_none() {
        return Err(ObjectError::Malformed("header is missing payload checksums".into()));
    }
    Ok(ContentHasher::HEADER.hash_header(header)?)
}

/// Attach an id to a finalized header and its payload.
pub fn seal(header: Header, payload: Vec<u8>) -> ObjectResult<Object> {
    if header.payload_length != payload.len() as u64 {
        return Err(ObjectError::Malformed(format!(
            "header declares {} payload bytes, got {}",
            header.payload_length,
            payload.len()
        )));
    }
    let id = header_id(&header)?;
    Ok(Object::new(id, header, payload))
}

/// Finalize and seal a complete in-memory payload.
pub fn build(mut header: Header, payload: Vec<u8>, epoch: u64) -> ObjectResult<Object> {
    let mut hasher = PayloadHasher::new();
    hasher.update(&payload);
    finalize_header(&mut header, &hasher, epoch);
    seal(header, payload)
}

/// Check length, checksums and id of a received object.
pub fn validate(object: &Object) -> ObjectResult<()> {
    let header = &object.header;
    if header.payload_length != object.payload.len() as u64 {
        return Err(ObjectError::Malformed(format!(
            "header declares {} payload bytes, got {}",
            header.payload_length,
            object.payload.len()
        )));
    }
    for sum in [&header.payload_checksum, &header.payload_homomorphic_hash]
        .into_iter()
        .flatten()
    {
        if !verify_checksum(sum, &object.payload) {
            return Err(ObjectError::ChecksumMismatch { kind: sum.kind });
        }
    }
    let computed = header_id(header)?;
    if computed != object.id {
        return Err(ObjectError::IdMismatch {
            claimed: object.id,
            computed,
        });
    }
    if let Some(split) = &header.split {
        if split.is_link() && !object.payload.is_empty() {
            return Err(ObjectError::Malformed("linking object carries payload".into()));
        }
    }
    Ok(())
}
