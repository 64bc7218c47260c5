// =============================================================================
// Historical Candles — Binance klines REST fetch
// =============================================================================
//
// GET /api/v3/klines (public — no signature required). Binance returns an
// array of arrays with millisecond timestamps and string-encoded floats;
// this module converts them into the engine's second-resolution `Candle`s,
// ascending in time, ready to seed an aggregator.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::types::{Candle, Interval};

/// Fetch up to `limit` candles for `(symbol, interval)`, optionally ending at
/// `end_time` (ms) — the scroll-back path passes the oldest loaded candle's
/// timestamp minus one to page further into history.
pub async fn fetch_klines(
    client: &reqwest::Client,
    base_url: &str,
    symbol: &str,
    interval: Interval,
    limit: u32,
    end_time: Option<i64>,
) -> Result<Vec<Candle>> {
    let mut url = format!(
        "{base_url}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}"
    );
    if let Some(end) = end_time {
        url.push_str(&format!("&endTime={end}"));
    }

    let resp = client
        .get(&url)
        .send()
        .await
        .context("GET /api/v3/klines request failed")?;

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .context("failed to parse klines response")?;

    if !status.is_success() {
        anyhow::bail!("GET /api/v3/klines returned {status}: {body}");
    }

    let candles = parse_klines(&body)?;
    debug!(symbol, interval = %interval, count = candles.len(), "klines fetched");
    Ok(candles)
}

/// Parse the klines response body into candles.
///
/// Expected entry shape (only the first six elements are used):
/// ```json
/// [ 1700000000000, "37000.0", "37050.0", "36990.0", "37020.0", "123.456", ... ]
/// ```
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;
        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time_ms = arr[0].as_i64().context("kline open time is not an integer")?;
        candles.push(Candle {
            bucket_start: open_time_ms / 1000,
            open: parse_str_f64(&arr[1], "open")?,
            high: parse_str_f64(&arr[2], "high")?,
            low: parse_str_f64(&arr[3], "low")?,
            close: parse_str_f64(&arr[4], "close")?,
            volume: parse_str_f64(&arr[5], "volume")?,
        });
    }

    Ok(candles)
}

/// Binance sends numeric values as JSON strings inside kline arrays.
fn parse_str_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_klines_ok() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[
                [1700000000000, "37000.00", "37050.00", "36990.00", "37020.00", "123.456", 1700000059999, "0", 1, "0", "0", "0"],
                [1700000060000, "37020.00", "37100.00", "37010.00", "37080.00", "98.7", 1700000119999, "0", 1, "0", "0", "0"]
            ]"#,
        )
        .unwrap();

        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].bucket_start, 1_700_000_000);
        assert_eq!(candles[1].bucket_start, 1_700_000_060);
        assert!((candles[0].open - 37_000.0).abs() < f64::EPSILON);
        assert!((candles[1].close - 37_080.0).abs() < f64::EPSILON);
        assert!((candles[0].volume - 123.456).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_klines_skips_short_entries() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[
                [1700000000000, "1.0"],
                [1700000060000, "1.0", "2.0", "0.5", "1.5", "10.0"]
            ]"#,
        )
        .unwrap();
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].bucket_start, 1_700_000_060);
    }

    #[test]
    fn parse_klines_rejects_non_array() {
        let body = serde_json::json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(parse_klines(&body).is_err());
    }

    #[test]
    fn parse_klines_rejects_bad_float() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[[1700000000000, "not-a-number", "2.0", "0.5", "1.5", "10.0"]]"#,
        )
        .unwrap();
        assert!(parse_klines(&body).is_err());
    }

    #[test]
    fn parse_klines_accepts_plain_numbers() {
        let body: serde_json::Value =
            serde_json::from_str(r#"[[60000, 1.0, 2.0, 0.5, 1.5, 10.0]]"#).unwrap();
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles[0].bucket_start, 60);
        assert_eq!(candles[0].high, 2.0);
    }
}
