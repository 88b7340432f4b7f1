use std::time::{SystemTime, UNIX_EPOCH};

use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::models::{Claims, User};

const TOKEN_TTL_SECS: usize = 3600; // 1 hour

fn secret() -> Vec<u8> {
    std::env::var("LEADGEN_JWT_SECRET")
        .unwrap_or_else(|_| "leadgen_dev_secret".to_string())
        .into_bytes()
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Issue a bearer token for a user. Role and project claims are embedded but
/// privileged checks re-read the stored record, so a stale token cannot keep
/// revoked access alive.
pub fn create_jwt(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
        + TOKEN_TTL_SECS;

    let claims = Claims {
        sub: user.id,
        role: user.role,
        projects: user.assigned_projects.clone(),
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(&secret()))
}

pub fn validate_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&secret()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use uuid::Uuid;

    fn sample_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ops@example.com".to_string(),
            password_hash: hash_password("hunter2").unwrap(),
            role,
            assigned_projects: ["Acme".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let h = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &h).unwrap());
        assert!(!verify_password("wrong", &h).unwrap());
    }

    #[test]
    fn test_jwt_carries_role_and_projects() {
        let user = sample_user(Role::ProjectUser);
        let token = create_jwt(&user).unwrap();
        let claims = validate_jwt(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::ProjectUser);
        assert!(claims.projects.contains("Acme"));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validate_jwt("not.a.token").is_err());
    }
}
