pub mod alert;
pub mod events;
pub mod snapshot;

pub use alert::{
    AlertCondition, AlertFrequency, AlertKind, AlertParams, AlertRule, AlertSettings, ChannelSet,
    NotificationChannel,
};
pub use events::{topics, ActivationChange, ActivationState, PriceDelta, TriggerEvent};
pub use snapshot::{PriceSnapshot, TechnicalIndicators};
