//! Image key generation and allocation.
//!
//! Keys are identifiers, not secrets, so a seeded general-purpose RNG is
//! enough. Uniqueness comes from the store, never from the generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, warn};

use crate::image_store::{ImageStore, StoreError};

/// Number of characters in every image key.
pub const KEY_LEN: usize = 6;

/// Produce a key of [`KEY_LEN`] characters drawn uniformly from `[0-9A-Za-z]`.
///
/// Ordinals are sampled from `0..=b'z'` and anything outside the three
/// alphanumeric ranges is thrown away and resampled, which keeps all 62
/// symbols equally likely.
pub fn generate_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut key = String::with_capacity(KEY_LEN);
    while key.len() < KEY_LEN {
        let c: u8 = rng.gen_range(0..=b'z');
        if c.is_ascii_alphanumeric() {
            key.push(char::from(c));
        }
    }
    key
}

/// Find a key that is not in use yet.
///
/// Retries for as long as candidates collide; a failing existence check
/// aborts immediately. Callers bound the loop with their request deadline.
pub async fn allocate_key(store: &dyn ImageStore) -> Result<String, StoreError> {
    let mut rng = StdRng::from_entropy();
    allocate_key_with(store, &mut rng).await
}

pub async fn allocate_key_with<R: Rng + Send>(
    store: &dyn ImageStore,
    rng: &mut R,
) -> Result<String, StoreError> {
    let mut attempts: u32 = 0;
    loop {
        let key = generate_key(rng);
        attempts += 1;

        match store.exists(&key).await {
            Ok(false) => {
                debug!(key = %key, attempts, "Allocated image key");
                return Ok(key);
            }
            Ok(true) => {
                warn!(key = %key, attempts, "Generated key is already taken, retrying");
            }
            Err(e) => {
                error!(key = %key, error = %e, "Key existence check failed");
                return Err(e);
            }
        }
    }
}
