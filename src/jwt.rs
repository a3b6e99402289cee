use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::conf::ConfJwt;

pub type Result<T> = jsonwebtoken::errors::Result<T>;

/// Signing material derived once from `ConfJwt`, instead of on every
/// request the auth layer sees.
#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    audience: String,
    issuer: String,
}

impl Keys {
    pub fn new(conf: &ConfJwt) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0; // "exp" should mean what it says.
        validation.set_audience(&[&conf.audience]);
        validation.set_issuer(&[&conf.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        Self {
            encoding: EncodingKey::from_secret(conf.secret.as_bytes()),
            decoding: DecodingKey::from_secret(conf.secret.as_bytes()),
            validation,
            audience: conf.audience.clone(),
            issuer: conf.issuer.clone(),
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn encode<T>(&self, claims: &T) -> Result<String>
    where
        T: serde::Serialize,
    {
        let header = Header::new(Algorithm::HS256);
        jsonwebtoken::encode(&header, claims, &self.encoding)
    }

    pub fn decode<T>(&self, token: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let jsonwebtoken::TokenData { claims, .. } =
            jsonwebtoken::decode::<T>(token, &self.decoding, &self.validation)?;
        Ok(claims)
    }
}
