use md5::{Digest, Md5};

/// Number of buckets subjects are spread over; a percentage rule enables buckets below its
/// percentage.
pub const BUCKET_COUNT: u128 = 100;

/// Returns the bucket (`0..100`) of `subject_id` for the flag `flag_key`.
///
/// The bucket is the MD5 digest of `"{flag_key}:{subject_id}"`, read as a big-endian 128-bit
/// integer, modulo 100. MD5 is used for distribution only. The scheme is fixed: any change to
/// it moves subjects between buckets and flips their percentage rollout results.
pub fn bucket(flag_key: &str, subject_id: &str) -> u8 {
    let mut hash = Md5::new();
    hash.update(flag_key.as_bytes());
    hash.update(b":");
    hash.update(subject_id.as_bytes());

    let digest = hash.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);

    (u128::from_be_bytes(bytes) % BUCKET_COUNT) as u8
}
