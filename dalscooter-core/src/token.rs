//! Bearer-token verification
//!
//! Every API call carries a token issued by the identity provider after a
//! successful login. Claims are only trusted once the signature has been
//! checked against the provider's published key set, together with the
//! issuer, expiry and (optionally) audience. The result is a single
//! [`AuthContext`] that handlers consume instead of digging through claims.

use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::{Error, Result};

/// User groups known to the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Customers,
    Franchise,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Customers => "customers",
            Group::Franchise => "franchise",
        }
    }

}

impl FromStr for Group {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customers" => Ok(Group::Customers),
            "franchise" => Ok(Group::Franchise),
            _ => Err(Error::Unrecognized {
                kind: "group",
                value: s.to_string(),
            }),
        }
    }
}

/// The verified identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Stable user identifier (`sub`)
    pub user_id: String,
    pub email: Option<String>,
    pub groups: Vec<Group>,
}

impl AuthContext {
    pub fn is_member(&self, group: Group) -> bool {
        self.groups.contains(&group)
    }

    pub fn is_franchise(&self) -> bool {
        self.is_member(Group::Franchise)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "cognito:groups")]
    groups: Vec<String>,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            groups: claims
                .groups
                .iter()
                .filter_map(|g| g.parse().ok())
                .collect(),
        }
    }
}

/// Turns a bearer token into a verified [`AuthContext`]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthContext>;
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> Error {
    match err.kind() {
        ErrorKind::ExpiredSignature => Error::TokenExpired,
        ErrorKind::InvalidIssuer => Error::InvalidToken("issuer mismatch".into()),
        ErrorKind::InvalidAudience => Error::InvalidToken("audience mismatch".into()),
        ErrorKind::InvalidSignature => Error::InvalidToken("bad signature".into()),
        _ => Error::Jwt(err),
    }
}

fn build_validation(algorithm: Algorithm, issuer: Option<&str>, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }
    validation
}

/// Verifies tokens against the identity provider's JSON Web Key Set
pub struct JwksVerifier {
    keys: JwkSet,
    validation: Validation,
}

impl JwksVerifier {
    /// Create a verifier accepting RS256 tokens from `issuer`
    pub fn new(keys: JwkSet, issuer: &str, audience: Option<&str>) -> Self {
        Self {
            keys,
            validation: build_validation(Algorithm::RS256, Some(issuer), audience),
        }
    }

    /// Create a verifier from a JWKS document
    pub fn from_json(jwks: &str, issuer: &str, audience: Option<&str>) -> Result<Self> {
        let keys: JwkSet = serde_json::from_str(jwks)?;
        Ok(Self::new(keys, issuer, audience))
    }

    /// Restrict accepted signing algorithms
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    pub fn key_count(&self) -> usize {
        self.keys.keys.len()
    }
}

impl TokenVerifier for JwksVerifier {
    fn verify(&self, token: &str) -> Result<AuthContext> {
        let header = decode_header(token).map_err(map_jwt_error)?;
        if !self.validation.algorithms.contains(&header.alg) {
            return Err(Error::InvalidToken(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| Error::InvalidToken("missing key id".into()))?;
        let jwk = self
            .keys
            .find(&kid)
            .ok_or_else(|| Error::UnknownSigningKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let data = decode::<Claims>(token, &key, &self.validation).map_err(map_jwt_error)?;
        Ok(data.claims.into())
    }
}

/// HS256 verifier for local development, when no identity provider is
/// reachable
pub struct SharedSecretVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SharedSecretVerifier {
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: build_validation(Algorithm::HS256, issuer, None),
        }
    }
}

impl TokenVerifier for SharedSecretVerifier {
    fn verify(&self, token: &str) -> Result<AuthContext> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(map_jwt_error)?;
        Ok(data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names() {
        assert_eq!("franchise".parse::<Group>().unwrap(), Group::Franchise);
        assert_eq!("customers".parse::<Group>().unwrap(), Group::Customers);
        assert!(matches!(
            "admins".parse::<Group>(),
            Err(Error::Unrecognized { kind: "group", .. })
        ));
        assert_eq!(Group::Franchise.as_str(), "franchise");
    }

    #[test]
    fn test_claims_into_context_ignores_unknown_groups() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "u1",
            "email": "rider@dal.ca",
            "cognito:groups": ["customers", "beta-testers"]
        }))
        .unwrap();
        let ctx = AuthContext::from(claims);
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.groups, vec![Group::Customers]);
        assert!(!ctx.is_franchise());
    }

    #[test]
    fn test_rejects_garbage() {
        let verifier = SharedSecretVerifier::new(b"secret", None);
        assert!(verifier.verify("not-a-token").is_err());
    }
}
