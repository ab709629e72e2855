//! Real-time wallet push
//!
//! One broadcast channel per user id, decoupled from the mutation path: a
//! mutation commits whether or not anyone is listening, and a slow
//! subscriber only loses its own backlog.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::domain::Wallet;

const CHANNEL_CAPACITY: usize = 16;

/// Publish-subscribe hub for wallet state changes
#[derive(Default)]
pub struct WalletHub {
    senders: Mutex<HashMap<String, broadcast::Sender<Wallet>>>,
}

impl WalletHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every committed mutation of the given user's wallet.
    /// Delivery is best-effort; per-wallet order follows commit order.
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<Wallet> {
        let mut senders = self.senders.lock().expect("wallet hub lock poisoned");
        senders
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a committed wallet state to subscribers, if any.
    pub(crate) fn publish(&self, wallet: &Wallet) {
        let senders = self.senders.lock().expect("wallet hub lock poisoned");
        if let Some(tx) = senders.get(&wallet.user_id) {
            // Send fails only when no receiver is listening
            let _ = tx.send(wallet.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_wallet(user_id: &str, coins: i64) -> Wallet {
        Wallet {
            user_id: user_id.to_string(),
            user_name: user_id.to_string(),
            coins,
            total_earned: coins,
            total_spent: 0,
            level: 1,
            experience: 0,
            streak: Default::default(),
            achievements: Default::default(),
            badges: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_subscribe_receives_in_order() {
        let hub = WalletHub::new();
        let mut rx = hub.subscribe("alice");

        hub.publish(&dummy_wallet("alice", 100));
        hub.publish(&dummy_wallet("alice", 150));

        assert_eq!(rx.try_recv().unwrap().coins, 100);
        assert_eq!(rx.try_recv().unwrap().coins, 150);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = WalletHub::new();
        // No panic, no error surfaced to the mutation path
        hub.publish(&dummy_wallet("nobody", 1));
    }

    #[test]
    fn test_channels_are_per_user() {
        let hub = WalletHub::new();
        let mut alice = hub.subscribe("alice");
        let mut bob = hub.subscribe("bob");

        hub.publish(&dummy_wallet("alice", 42));

        assert_eq!(alice.try_recv().unwrap().coins, 42);
        assert!(bob.try_recv().is_err());
    }
}
