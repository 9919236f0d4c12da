use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Refresh this long before the provider says the token expires.
pub const EXPIRY_MARGIN: u64 = 100;
pub const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(60);

/// Access token shared between one refresh loop and any number of readers.
#[derive(Clone, Default)]
pub struct TokenCell(Arc<RwLock<String>>);
impl TokenCell {
    pub fn get(&self) -> String {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: String) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

/// How long to sleep before refreshing a token that lives `expires_in` seconds.
pub fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(EXPIRY_MARGIN)).max(RETRY_AFTER_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_latest_token() {
        let cell = TokenCell::default();
        let reader = cell.clone();
        assert!(reader.is_empty());

        cell.set("first".to_string());
        cell.set("second".to_string());
        assert_eq!(reader.get(), "second");
    }

    #[test]
    fn refresh_delay_keeps_margin() {
        assert_eq!(refresh_delay(7200), Duration::from_secs(7100));
        assert_eq!(refresh_delay(0), RETRY_AFTER_FAILURE);
        assert_eq!(refresh_delay(120), RETRY_AFTER_FAILURE);
    }
}
