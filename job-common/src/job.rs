//! Job identifiers. A `job_id` is 128 bits of cryptographically random data, hex-encoded, and
//! globally unique for the lifetime of the system.
use rand::rngs::OsRng;
use rand::RngCore;

pub fn generate_job_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_32_char_hex_strings() {
        let id = generate_job_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn is_unlikely_to_collide() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_ne!(a, b);
    }
}
