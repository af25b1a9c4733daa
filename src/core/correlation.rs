//! Correlation tokens linking approval cards to post records.
//!
//! Tokens have no storage of their own: they live on the record as
//! `request_token`, and `PostStore::find_by_token` is the only resolver.

use uuid::Uuid;

use super::store::PostStore;

/// Length of a minted token in hex characters
pub const TOKEN_LEN: usize = 10;

/// Attempts before falling back to a full-length token
const MAX_MINT_ATTEMPTS: usize = 8;

/// Mint a token no record in the store currently holds
pub async fn mint_token(store: &PostStore) -> String {
    for _ in 0..MAX_MINT_ATTEMPTS {
        let token = short_token();
        if !store.token_in_use(&token).await {
            return token;
        }
    }

    // 128 random bits; collisions are not a practical concern here
    Uuid::new_v4().simple().to_string()
}

/// Keep an existing token for the same conversation, or mint a fresh one
pub async fn token_for(store: &PostStore, existing: Option<&str>) -> String {
    match existing {
        Some(token) if !token.trim().is_empty() => token.to_string(),
        _ => mint_token(store).await,
    }
}

fn short_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}
