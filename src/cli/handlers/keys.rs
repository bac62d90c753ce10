//! Keys command handler
//!
//! Generates VAPID key pairs for Web Push tenants.

use crate::crypto::VapidKeys;
use crate::services::push::generate_vapid_keys;

/// Handler for the keys command
pub struct KeysCommandHandler;

impl KeysCommandHandler {
    /// Generate a key pair and render it as pretty JSON
    pub fn execute(&self) -> Result<String, serde_json::Error> {
        let keys: VapidKeys = generate_vapid_keys();
        serde_json::to_string_pretty(&keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{VapidSigner, b64url_decode};

    #[test]
    fn test_generated_keys_are_usable() {
        let output = KeysCommandHandler.execute().unwrap();
        let keys: VapidKeys = serde_json::from_str(&output).unwrap();

        assert_eq!(b64url_decode(&keys.public_key, "public_key").unwrap().len(), 65);
        assert_eq!(b64url_decode(&keys.private_key, "private_key").unwrap().len(), 32);
        assert!(VapidSigner::new(&keys.public_key, &keys.private_key, "mailto:a@b.c").is_ok());
    }
}
