//! The session's bearer token, shared by the REST client and the socket.

use std::sync::{Arc, PoisonError, RwLock};

use airops_net::TokenSource;

/// Cloneable handle to the current access token. The socket reads it once
/// per connection attempt; REST calls read it per request.
#[derive(Debug, Clone, Default)]
pub struct SessionTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))),
        }
    }

    /// Replace the token (after a login or refresh). Live connections keep
    /// the token they were opened with.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        *self.token.write().unwrap_or_else(PoisonError::into_inner) =
            (!token.is_empty()).then_some(token);
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenSource for SessionTokenStore {
    fn access_token(&self) -> Option<String> {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let store = SessionTokenStore::new(None);
        assert_eq!(store.access_token(), None);

        let shared = store.clone();
        store.set("abc");
        assert_eq!(shared.access_token().as_deref(), Some("abc"));

        store.set("");
        assert_eq!(shared.get(), None);

        store.set("def");
        store.clear();
        assert_eq!(shared.get(), None);
    }

    #[test]
    fn test_empty_initial_token_is_absent() {
        assert_eq!(SessionTokenStore::new(Some(String::new())).get(), None);
    }
}
