use std::time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH};

use crate::{identity::Identity, jwt, types::Role};

#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Role,
    aud: String,
    iss: String,
    exp: u64,
}

impl Claims {
    pub fn new(
        sub: &str,
        role: Role,
        ttl: Duration,
        keys: &jwt::Keys,
    ) -> Result<Self, SystemTimeError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let exp = now.saturating_add(ttl).as_secs();
        Ok(Self {
            sub: sub.to_string(),
            role,
            aud: keys.audience().to_string(),
            iss: keys.issuer().to_string(),
            exp,
        })
    }

    pub fn to_str(&self, keys: &jwt::Keys) -> jwt::Result<String> {
        keys.encode(self)
    }

    pub fn from_str(str: &str, keys: &jwt::Keys) -> jwt::Result<Self> {
        keys.decode::<Self>(str)
    }

    pub fn identity(&self) -> Identity {
        Identity::User(self.sub.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jsonwebtoken::errors::ErrorKind;

    use crate::{conf::ConfJwt, jwt::Keys, types::Role};

    use super::Claims;

    #[test]
    fn good() {
        let conf = Keys::new(&ConfJwt::default());
        let claims =
            Claims::new("foo", Role::Moderator, Duration::from_secs(5), &conf)
                .unwrap();
        let encoded: String = claims.to_str(&conf).unwrap();
        let decoded = Claims::from_str(&encoded, &conf).unwrap();
        assert_eq!(&claims, &decoded);
        assert_eq!(decoded.role, Role::Moderator);
    }

    #[test]
    fn bad_key() {
        let good = ConfJwt::default();
        let conf_bad = Keys::new(&ConfJwt {
            secret: good.secret.to_string() + "naughty",
            ..good.clone()
        });
        let conf_good = Keys::new(&good);
        let claims =
            Claims::new("foo", Role::User, Duration::from_secs(5), &conf_good)
                .unwrap();

        let encoded: String = claims.to_str(&conf_good).unwrap();
        let decode_result = Claims::from_str(&encoded, &conf_bad);

        assert!(matches!(
            decode_result,
            Err(e) if e.kind().eq(&ErrorKind::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_audience() {
        let conf = Keys::new(&ConfJwt::default());
        let other = Keys::new(&ConfJwt {
            audience: "someone-else".to_string(),
            ..Default::default()
        });
        let claims =
            Claims::new("foo", Role::User, Duration::from_secs(5), &other)
                .unwrap();
        let encoded = claims.to_str(&conf).unwrap();
        assert!(matches!(
            Claims::from_str(&encoded, &conf),
            Err(e) if e.kind().eq(&ErrorKind::InvalidAudience)
        ));
    }

    #[test]
    fn expired() {
        let conf = Keys::new(&ConfJwt {
            secret: "super secret".to_string(),
            ..Default::default()
        });

        let mut claims =
            Claims::new("foo", Role::User, Duration::ZERO, &conf).unwrap();
        claims.exp -= 10; // Expire arbitrarily-far back in the past.

        let encoded: String = claims.to_str(&conf).unwrap();
        let decode_result = Claims::from_str(&encoded, &conf);

        assert!(matches!(
            decode_result,
            Err(e) if e.kind().eq(&ErrorKind::ExpiredSignature)
        ));
    }
}
