//! DER to raw ECDSA signature conversion.
//!
//! ECDSA signers hand out `SEQUENCE { INTEGER r, INTEGER s }` while JWS
//! (and therefore VAPID) wants the fixed-width `R || S` concatenation.

use super::CryptoError;

/// Width of one P-256 signature component
const COMPONENT_LEN: usize = 32;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// Convert a DER encoded P-256 ECDSA signature into the 64-byte `R || S` form.
///
/// DER integers are minimal and signed, so a component may carry a leading
/// `0x00` (high bit set) or be shorter than 32 bytes. Leading zeros are
/// stripped and each component is left-padded back to 32 bytes.
pub fn der_to_raw(signature: &[u8]) -> Result<[u8; 64], CryptoError> {
    let mut reader = DerReader::new(signature);

    reader.expect_tag(TAG_SEQUENCE)?;
    let seq_len = reader.read_length()?;
    if seq_len != reader.remaining() {
        return Err(CryptoError::InvalidSignature(format!(
            "sequence length {} does not match {} remaining bytes",
            seq_len,
            reader.remaining()
        )));
    }

    let r = reader.read_integer()?;
    let s = reader.read_integer()?;
    if reader.remaining() != 0 {
        return Err(CryptoError::InvalidSignature(
            "trailing bytes after signature".to_string(),
        ));
    }

    let mut raw = [0u8; 64];
    write_component(&mut raw[..COMPONENT_LEN], r)?;
    write_component(&mut raw[COMPONENT_LEN..], s)?;
    Ok(raw)
}

fn write_component(out: &mut [u8], value: &[u8]) -> Result<(), CryptoError> {
    let first_non_zero = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let digits = &value[first_non_zero..];
    if digits.len() > COMPONENT_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "component of {} bytes exceeds {} bytes",
            digits.len(),
            COMPONENT_LEN
        )));
    }
    let offset = COMPONENT_LEN - digits.len();
    out[..offset].fill(0);
    out[offset..].copy_from_slice(digits);
    Ok(())
}

struct DerReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn next_byte(&mut self) -> Result<u8, CryptoError> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or_else(|| CryptoError::InvalidSignature("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect_tag(&mut self, tag: u8) -> Result<(), CryptoError> {
        let found = self.next_byte()?;
        if found != tag {
            return Err(CryptoError::InvalidSignature(format!(
                "expected tag 0x{:02x}, found 0x{:02x}",
                tag, found
            )));
        }
        Ok(())
    }

    /// Short form, or the single long-form byte (0x81) some encoders emit
    fn read_length(&mut self) -> Result<usize, CryptoError> {
        match self.next_byte()? {
            len if len < 0x80 => Ok(len as usize),
            0x81 => Ok(self.next_byte()? as usize),
            other => Err(CryptoError::InvalidSignature(format!(
                "unsupported length encoding 0x{:02x}",
                other
            ))),
        }
    }

    fn read_integer(&mut self) -> Result<&'a [u8], CryptoError> {
        self.expect_tag(TAG_INTEGER)?;
        let len = self.read_length()?;
        if len == 0 || len > self.remaining() {
            return Err(CryptoError::InvalidSignature(format!(
                "integer length {} out of bounds",
                len
            )));
        }
        let value = &self.input[self.pos..self.pos + len];
        self.pos += len;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{DerSignature, Signature, SigningKey};
    use proptest::prelude::*;

    /// Minimal DER INTEGER encoding of an unsigned big-endian value
    fn encode_integer(value: &[u8]) -> Vec<u8> {
        let start = value.iter().position(|b| *b != 0).unwrap_or(value.len() - 1);
        let mut digits = value[start..].to_vec();
        if digits[0] & 0x80 != 0 {
            digits.insert(0, 0x00);
        }
        let mut out = vec![TAG_INTEGER, digits.len() as u8];
        out.extend(digits);
        out
    }

    fn encode_signature(r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
        let mut body = encode_integer(r);
        body.extend(encode_integer(s));
        let mut out = vec![TAG_SEQUENCE, body.len() as u8];
        out.extend(body);
        out
    }

    #[test]
    fn test_high_bit_components_drop_sign_byte() {
        let r = [0xffu8; 32];
        let s = [0x80u8; 32];
        let der = encode_signature(&r, &s);
        // Both integers carry the 0x00 sign byte, 33 bytes each
        assert_eq!(der[3], 33);

        let raw = der_to_raw(&der).unwrap();
        assert_eq!(&raw[..32], &r);
        assert_eq!(&raw[32..], &s);
    }

    #[test]
    fn test_short_components_are_left_padded() {
        let mut r = [0u8; 32];
        r[31] = 0x01;
        let mut s = [0u8; 32];
        s[30] = 0x7f;
        s[31] = 0x02;

        let raw = der_to_raw(&encode_signature(&r, &s)).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(&raw[..32], &r);
        assert_eq!(&raw[32..], &s);
    }

    #[test]
    fn test_matches_real_p256_signatures() {
        let key = SigningKey::from(crate::crypto::random_secret_key());
        for i in 0..32u8 {
            let message = [i; 48];
            let der: DerSignature = key.sign(&message);
            let expected: Signature = key.sign(&message);

            let raw = der_to_raw(der.as_bytes()).unwrap();
            assert_eq!(raw.as_slice(), expected.to_bytes().as_slice());
        }
    }

    #[test]
    fn test_rejects_wrong_outer_tag() {
        let mut der = encode_signature(&[1u8; 32], &[2u8; 32]);
        der[0] = 0x31;
        assert!(der_to_raw(&der).is_err());
    }

    #[test]
    fn test_rejects_truncated_input() {
        let der = encode_signature(&[1u8; 32], &[2u8; 32]);
        assert!(der_to_raw(&der[..der.len() - 1]).is_err());
        assert!(der_to_raw(&[]).is_err());
    }

    #[test]
    fn test_rejects_oversized_component() {
        let mut body = vec![TAG_INTEGER, 33];
        body.extend([0x01u8; 33]);
        body.extend(encode_integer(&[2u8; 32]));
        let mut der = vec![TAG_SEQUENCE, body.len() as u8];
        der.extend(body);

        assert!(matches!(der_to_raw(&der), Err(CryptoError::InvalidSignature(_))));
    }

    proptest! {
        #[test]
        fn prop_output_is_r_then_s(r in any::<[u8; 32]>(), s in any::<[u8; 32]>()) {
            let raw = der_to_raw(&encode_signature(&r, &s)).unwrap();
            prop_assert_eq!(raw.len(), 64);
            prop_assert_eq!(&raw[..32], &r[..]);
            prop_assert_eq!(&raw[32..], &s[..]);
        }
    }
}
