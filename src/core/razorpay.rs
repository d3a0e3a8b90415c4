use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("payment signature is not valid hex")]
    MalformedSignature,
    #[error("payment signature does not match this order")]
    Mismatch,
}

/// Hex HMAC-SHA256 over `order_id|payment_id`, the value Razorpay hands back
/// on a successful checkout.
pub fn payment_signature(order_id: &str, payment_id: &str, key_secret: &Secret<String>) -> String {
    let mut mac = HmacSha256::new_from_slice(key_secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a claimed payment signature.
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    key_secret: &Secret<String>,
) -> Result<(), SignatureError> {
    let supplied = hex::decode(signature).map_err(|_| SignatureError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(key_secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&supplied)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};
    use quickcheck_macros::quickcheck;
    use rand::distributions::Alphanumeric;
    use rand::{Rng, SeedableRng};

    fn secret(value: &str) -> Secret<String> {
        Secret::new(value.to_string())
    }

    #[test]
    fn a_signature_computed_with_the_same_secret_verifies() {
        let key = secret("rzp_test_secret");
        let signature = payment_signature("order_Mz1aBcDeFgHiJk", "pay_Mz2bCdEfGhIjKl", &key);

        assert_ok!(verify_payment_signature(
            "order_Mz1aBcDeFgHiJk",
            "pay_Mz2bCdEfGhIjKl",
            &signature,
            &key,
        ));
    }

    #[test]
    fn a_signature_from_another_secret_is_rejected() {
        let signature =
            payment_signature("order_Mz1aBcDeFgHiJk", "pay_Mz2bCdEfGhIjKl", &secret("one"));

        assert_eq!(
            verify_payment_signature(
                "order_Mz1aBcDeFgHiJk",
                "pay_Mz2bCdEfGhIjKl",
                &signature,
                &secret("another"),
            ),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn a_signature_over_different_identifiers_is_rejected() {
        let key = secret("rzp_test_secret");
        let signature = payment_signature("order_Mz1aBcDeFgHiJk", "pay_Mz2bCdEfGhIjKl", &key);

        assert_err!(verify_payment_signature(
            "order_Mz1aBcDeFgHiJk",
            "pay_SOMETHING_ELSE",
            &signature,
            &key,
        ));
    }

    #[test]
    fn non_hex_signatures_are_malformed() {
        let key = secret("rzp_test_secret");
        assert_eq!(
            verify_payment_signature("order", "pay", "not-a-hex-signature", &key),
            Err(SignatureError::MalformedSignature)
        );
        assert_eq!(
            verify_payment_signature("order", "pay", "", &key),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn random_order_ids_still_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let key = secret("rzp_test_secret");
        for _ in 0..16 {
            let order_id: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            let payment_id: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            let signature = payment_signature(&order_id, &payment_id, &key);
            assert_ok!(verify_payment_signature(
                &order_id,
                &payment_id,
                &signature,
                &key
            ));
        }
    }

    #[quickcheck]
    fn any_single_character_mutation_flips_the_verdict(
        order_id: String,
        payment_id: String,
        position: usize,
    ) -> bool {
        let key = secret("rzp_test_secret");
        let signature = payment_signature(&order_id, &payment_id, &key);

        let index = position % signature.len();
        let mutated: String = signature
            .char_indices()
            .map(|(i, c)| {
                if i == index {
                    // swap the hex digit for a different one
                    if c == '0' {
                        '1'
                    } else {
                        '0'
                    }
                } else {
                    c
                }
            })
            .collect();

        verify_payment_signature(&order_id, &payment_id, &signature, &key).is_ok()
            && verify_payment_signature(&order_id, &payment_id, &mutated, &key).is_err()
    }
}
