pub mod adapters;
pub mod alerts;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod providers;
pub mod scheduler;
pub mod services;
pub mod sync;
pub mod window;

pub use adapters::{BroadcastHub, OutboundFrame, PostgresStore, WebhookNotifier};
pub use alerts::{AlertEvaluationEngine, AlertWorkingSet, DispatchQueue, PendingTriggers};
pub use cache::PriceCache;
pub use config::AppConfig;
pub use domain::{
    ActivationState, AlertCondition, AlertFrequency, AlertRule, PriceSnapshot, TriggerEvent,
};
pub use error::{EngineError, Result};
pub use providers::{FinnhubQuoteProvider, QuoteSourceAdapter, YahooQuoteProvider};
pub use scheduler::ScheduleRule;
pub use sync::PriceSyncEngine;
pub use window::{ActiveWindowController, WindowStatus};
