use crate::detector::classifier::headline;
use crate::types::{Alert, ChangeDirection, ChangeMagnitude};

/// Renders an alert as Telegram HTML.
pub fn render_alert(alert: &Alert) -> String {
    let direction = if alert.new_price < alert.old_price {
        ChangeDirection::Drop
    } else {
        ChangeDirection::Rise
    };
    let magnitude = ChangeMagnitude::from_percent(alert.percent_change);

    let title = match &alert.brand {
        Some(brand) if !brand.trim().is_empty() => {
            format!("{} · {}", escape_html(brand), escape_html(&alert.item_name))
        }
        _ => escape_html(&alert.item_name),
    };

    let was_at = alert
        .old_observed_at
        .map(|ts| format!(" ({})", format_time_ns(ts)))
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!(
        "{} <b>{:+.1}%</b>\n",
        headline(direction, magnitude),
        alert.percent_change
    ));
    out.push_str(&format!("<b>{title}</b>\n"));
    out.push_str(&format!("Was: {}{was_at}\n", format_price(alert.old_price)));
    out.push_str(&format!(
        "Now: <b>{}</b> ({})\n",
        format_price(alert.new_price),
        format_time_ns(alert.new_observed_at)
    ));
    out.push_str(&format!(
        "\n{} · your threshold {}%\nItem {}",
        escape_html(&alert.target_title),
        alert.threshold_percent,
        escape_html(&alert.item_id),
    ));
    out
}

/// Minor units → `12 345.67`.
pub fn format_price(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let major = (abs / 100).to_string();
    let cents = abs % 100;

    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, c) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}.{cents:02}")
}

pub fn format_time_ns(ns: i64) -> String {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            subscriber_id: 1,
            subscription_id: 1,
            item_id: "sku1".to_string(),
            item_name: "Kettle <2L>".to_string(),
            brand: Some("Acme & Co".to_string()),
            image: None,
            old_price: 100_000,
            new_price: 88_000,
            old_observed_at: Some(1_760_000_000_000_000_000),
            new_observed_at: 1_760_000_600_000_000_000,
            percent_change: -12.0,
            threshold_percent: 10,
            target_title: "Kettles".to_string(),
        }
    }

    #[test]
    fn price_groups_thousands() {
        assert_eq!(format_price(0), "0.00");
        assert_eq!(format_price(5), "0.05");
        assert_eq!(format_price(88_000), "880.00");
        assert_eq!(format_price(123_456_789), "1 234 567.89");
        assert_eq!(format_price(-100_050), "-1 000.50");
    }

    #[test]
    fn time_is_rendered_in_utc() {
        assert_eq!(format_time_ns(0), "1970-01-01 00:00 UTC");
        assert_eq!(format_time_ns(1_760_000_000_000_000_000), "2025-10-09 08:53 UTC");
    }

    #[test]
    fn rendered_alert_escapes_and_reports_change() {
        let text = render_alert(&alert());
        assert!(text.starts_with("📉 Price drop <b>-12.0%</b>"));
        assert!(text.contains("Acme &amp; Co · Kettle &lt;2L&gt;"));
        assert!(text.contains("Was: 1 000.00 (2025-10-09 08:53 UTC)"));
        assert!(text.contains("Now: <b>880.00</b> (2025-10-09 09:03 UTC)"));
        assert!(text.contains("Kettles · your threshold 10%"));
    }

    #[test]
    fn missing_previous_time_is_omitted() {
        let mut a = alert();
        a.old_observed_at = None;
        a.brand = None;
        let text = render_alert(&a);
        assert!(text.contains("Was: 1 000.00\n"));
        assert!(text.contains("<b>Kettle &lt;2L&gt;</b>"));
    }
}
