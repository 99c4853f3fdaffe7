//! Locally generated identifiers.
//!
//! Uploads take the current millisecond timestamp. Simulations default to a
//! short base-36 token; [`IdScheme::Uuid`] switches them to UUID v4. Both
//! shapes are plain strings, so the remote `simulations.id` column must be
//! text for either scheme.

use serde::Deserialize;
use uuid::Uuid;

const SHORT_ID_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// How new simulation identifiers are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Nine base-36 characters.
    #[default]
    Short,
    /// Hyphenated UUID v4.
    Uuid,
}

/// Identifier for a new [`UploadedFile`](crate::models::UploadedFile).
pub fn upload_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Loose policy reference for a new simulation.
pub fn policy_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identifier for a new [`SimulationResult`](crate::models::SimulationResult).
pub fn simulation_id(scheme: IdScheme) -> String {
    match scheme {
        IdScheme::Short => short_token(),
        IdScheme::Uuid => Uuid::new_v4().to_string(),
    }
}

fn short_token() -> String {
    let mut n = u128::from_le_bytes(*Uuid::new_v4().as_bytes());
    let mut out = String::with_capacity(SHORT_ID_LEN);
    for _ in 0..SHORT_ID_LEN {
        out.push(BASE36[(n % 36) as usize] as char);
        n /= 36;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_short_token_shape() {
        let id = simulation_id(IdScheme::Short);
        assert_eq!(id.len(), SHORT_ID_LEN);
        assert!(id.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_uuid_scheme() {
        let id = simulation_id(IdScheme::Uuid);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_short_tokens_rarely_collide() {
        let ids: HashSet<String> = (0..1000).map(|_| simulation_id(IdScheme::Short)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
