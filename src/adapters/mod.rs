pub mod postgres;
pub mod realtime;
pub mod webhook;

pub use postgres::PostgresStore;
pub use realtime::{BroadcastHub, OutboundFrame};
pub use webhook::WebhookNotifier;
