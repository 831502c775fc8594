//! Per-connection snapshot replication: decide what each peer is sent.
//!
//! The server keeps one [`PeerSnapshots`] per connection and calls
//! [`SnapshotSender::send_tick`] for every peer that is due a snapshot.
//! Clients feed the resulting messages into a [`SnapshotReceiver`] and send
//! back the tick it reports, which becomes the next delta base.

mod config;
mod error;
mod id_pool;
mod peer;
mod receiver;
mod sender;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use id_pool::{SnapIdPool, MAX_IDS};
pub use peer::{PeerSnapshots, SnapRate};
pub use receiver::SnapshotReceiver;
pub use sender::SnapshotSender;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let config = SessionConfig::default();
        let _ = SnapshotSender::new(config.clone());
        let _ = SnapshotReceiver::new(&config);
        let _ = PeerSnapshots::new();
        let _ = SnapIdPool::new(config.id_timeout());
        assert_eq!(SnapRate::default(), SnapRate::Init);
    }
}
