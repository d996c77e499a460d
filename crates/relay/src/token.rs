//! Identifier generation for stored files

use rand::Rng;

/// Length of generated file identifiers
pub const ID_LENGTH: usize = 10;

/// URL-safe alphabet for identifiers. Must never contain `.` because the
/// download path truncates tokens at the first dot.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random identifier for a newly uploaded file
///
/// # Returns
/// * 10-character alphanumeric token, unique enough that collisions within
///   a process lifetime are negligible (~59.5 bits of entropy)
pub fn generate_file_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}
