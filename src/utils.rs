use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, Duration};

/// Numbers arrive either as JSON numbers or as numeric strings.
/// "NaN" and infinities are treated as missing.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| value_as_f64(value).filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s
            .trim()
            .parse()
            .ok()
            .or_else(|| value_as_f64(value).filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}

pub fn format_countdown(remaining_secs: u64) -> String {
    format!("{:02}:{:02}", remaining_secs / 60, remaining_secs % 60)
}

/// Sleep without blocking shutdown for longer than a second.
///
/// Returns `false` when `running` was cleared before the full duration passed.
pub async fn interruptible_sleep(secs: u64, running: &AtomicBool) -> bool {
    for _ in 0..secs {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        sleep(Duration::from_secs(1)).await;
    }
    running.load(Ordering::SeqCst)
}

/// Console countdown between cycles.
pub async fn countdown(secs: u64, running: &AtomicBool) -> bool {
    let mut stdout = std::io::stdout();
    for remaining in (1..=secs).rev() {
        if !running.load(Ordering::SeqCst) {
            println!();
            return false;
        }
        print!("\rNext cycle in: {}", format_countdown(remaining));
        stdout.flush().ok();
        sleep(Duration::from_secs(1)).await;
    }
    if secs > 0 {
        print!("\r{:30}\r", "");
        stdout.flush().ok();
    }
    running.load(Ordering::SeqCst)
}

pub async fn pause_ms(ms: u64) {
    if ms > 0 {
        sleep(Duration::from_millis(ms)).await;
    }
}
