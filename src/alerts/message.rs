//! Human-readable notification text, templated per condition.
//!
//! A rule's custom message always wins over the template.

use rust_decimal::Decimal;

use crate::domain::{AlertCondition, AlertRule, PriceSnapshot};

/// Format a price with thousands separators, trimming to at most two
/// decimal places
pub fn format_price(value: Decimal) -> String {
    let rounded = value.round_dp(2).normalize();
    let raw = rounded.abs().to_string();
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Render the notification text for a trigger
pub fn render(rule: &AlertRule, snapshot: &PriceSnapshot) -> String {
    if let Some(message) = rule.message.as_deref() {
        if !message.trim().is_empty() {
            return message.to_string();
        }
    }

    let symbol = &rule.symbol;
    let current = format_price(snapshot.current_price);
    let value = format_price(rule.value);

    match rule.condition {
        AlertCondition::Above => {
            format!("{symbol} is trading at {current}, above your alert level of {value}")
        }
        AlertCondition::Below => {
            format!("{symbol} is trading at {current}, below your alert level of {value}")
        }
        AlertCondition::Equals => {
            format!("{symbol} reached your target of {value} (now {current})")
        }
        AlertCondition::PercentChangeUp => format!(
            "{symbol} is up {}% today, past your {}% threshold (now {current})",
            snapshot.day_change_percent.round_dp(2).normalize(),
            rule.value.normalize()
        ),
        AlertCondition::PercentChangeDown => format!(
            "{symbol} is down {}% today, past your {}% threshold (now {current})",
            snapshot.day_change_percent.abs().round_dp(2).normalize(),
            rule.value.normalize()
        ),
        AlertCondition::VolumeSpike => format!(
            "{symbol} volume spiked to {} ({}x its average), price {current}",
            snapshot.volume.unwrap_or_default(),
            rule.volume_multiplier().normalize()
        ),
        AlertCondition::VolumeDrop => format!(
            "{symbol} volume dropped to {}, well below its average, price {current}",
            snapshot.volume.unwrap_or_default()
        ),
        AlertCondition::RsiOverbought => format!(
            "{symbol} RSI at {} signals overbought, price {current}",
            snapshot
                .rsi()
                .map(|r| r.round_dp(1).normalize().to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ),
        AlertCondition::RsiOversold => format!(
            "{symbol} RSI at {} signals oversold, price {current}",
            snapshot
                .rsi()
                .map(|r| r.round_dp(1).normalize().to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ),
        AlertCondition::NewHigh => {
            format!("{symbol} hit a new 52-week high at {current}")
        }
        AlertCondition::NewLow => {
            format!("{symbol} hit a new 52-week low at {current}")
        }
        AlertCondition::Unknown => {
            format!("{symbol} alert triggered at {current}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertKind, AlertParams, AlertSettings};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn rule(condition: AlertCondition, value: Decimal) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            symbol: "ABC".to_string(),
            kind: AlertKind::Price,
            condition,
            value,
            message: None,
            is_active: true,
            triggered: false,
            triggered_at: None,
            triggered_price: None,
            trigger_count: 0,
            last_triggered: None,
            settings: AlertSettings::default(),
            params: AlertParams::default(),
        }
    }

    fn snapshot(current: Decimal, prev: Decimal) -> PriceSnapshot {
        let (change, percent) = PriceSnapshot::derive_changes(current, prev);
        PriceSnapshot {
            symbol: "ABC".to_string(),
            current_price: current,
            previous_close: prev,
            day_change: change,
            day_change_percent: percent,
            volume: None,
            average_volume: None,
            week52_high: None,
            week52_low: None,
            technical: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn format_price_groups_thousands() {
        assert_eq!(format_price(dec!(105000)), "105,000");
        assert_eq!(format_price(dec!(1234567.5)), "1,234,567.5");
        assert_eq!(format_price(dec!(999)), "999");
        assert_eq!(format_price(dec!(-12345)), "-12,345");
    }

    #[test]
    fn format_price_trims_to_two_decimals() {
        assert_eq!(format_price(dec!(100.129)), "100.13");
        assert_eq!(format_price(dec!(100.10)), "100.1");
    }

    #[test]
    fn above_message_contains_both_prices() {
        let message = render(
            &rule(AlertCondition::Above, dec!(100000)),
            &snapshot(dec!(105000), dec!(100000)),
        );
        assert!(message.contains("105,000"));
        assert!(message.contains("100,000"));
    }

    #[test]
    fn custom_message_wins() {
        let mut r = rule(AlertCondition::Above, dec!(100000));
        r.message = Some("my custom note".to_string());
        let message = render(&r, &snapshot(dec!(105000), dec!(100000)));
        assert_eq!(message, "my custom note");
    }

    #[test]
    fn blank_custom_message_falls_back_to_template() {
        let mut r = rule(AlertCondition::Above, dec!(100000));
        r.message = Some("   ".to_string());
        let message = render(&r, &snapshot(dec!(105000), dec!(100000)));
        assert!(message.contains("105,000"));
    }

    #[test]
    fn percent_up_message_includes_change() {
        let message = render(
            &rule(AlertCondition::PercentChangeUp, dec!(5)),
            &snapshot(dec!(106000), dec!(100000)),
        );
        assert!(message.contains("6%"));
        assert!(message.contains("5%"));
    }
}
