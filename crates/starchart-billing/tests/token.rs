use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use starchart_billing::{BillingError, PaymentClaims, PaymentTokens};

const SECRET: &[u8] = b"test-payment-secret";

fn now() -> jiff::Timestamp {
    jiff::Timestamp::now()
}

#[test]
fn issued_token_verifies() {
    let tokens = PaymentTokens::new(SECRET);
    let token = tokens
        .issue("sess_1", "career-money", "pi_123", now(), Duration::from_secs(600))
        .unwrap();

    let claims = tokens.verify(&token).unwrap();
    assert_eq!(claims.sub, "sess_1");
    assert_eq!(claims.report_type, "career-money");
    assert_eq!(claims.payment_intent, "pi_123");
    assert_eq!(claims.exp - claims.iat, 600);
}

#[test]
fn issue_caps_lifetime_at_thirty_minutes() {
    let tokens = PaymentTokens::new(SECRET);
    let token = tokens
        .issue("sess_1", "career-money", "pi_123", now(), Duration::from_secs(7200))
        .unwrap();

    let claims = tokens.verify(&token).unwrap();
    assert_eq!(claims.exp - claims.iat, 30 * 60);
}

#[test]
fn wrong_secret_is_rejected() {
    let token = PaymentTokens::new(SECRET)
        .issue("sess_1", "career-money", "pi_123", now(), Duration::from_secs(600))
        .unwrap();

    let err = PaymentTokens::new(b"another-secret").verify(&token).unwrap_err();
    assert!(matches!(err, BillingError::InvalidToken(_)));
}

#[test]
fn expired_token_is_rejected() {
    let tokens = PaymentTokens::new(SECRET);
    let issued = now() - jiff::SignedDuration::from_secs(3600);
    let token = tokens
        .issue("sess_1", "career-money", "pi_123", issued, Duration::from_secs(600))
        .unwrap();

    assert!(matches!(
        tokens.verify(&token),
        Err(BillingError::InvalidToken(_))
    ));
}

#[test]
fn overlong_lifetime_is_rejected() {
    let iat = now().as_second() as u64;
    let claims = PaymentClaims {
        sub: "sess_1".into(),
        report_type: "career-money".into(),
        payment_intent: "pi_123".into(),
        iat,
        exp: iat + 2 * 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap();

    let err = PaymentTokens::new(SECRET).verify(&token).unwrap_err();
    assert!(err.to_string().contains("lifetime"));
}

#[test]
fn garbage_is_rejected() {
    assert!(PaymentTokens::new(SECRET).verify("not-a-jwt").is_err());
}
