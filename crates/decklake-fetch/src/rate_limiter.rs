use crate::config::ConfigError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30.0,
            refill_per_sec: 10.0,
        }
    }
}

impl RateLimitConfig {
    /// `requests` per `per`, with a burst of one second's worth (at least one).
    #[must_use]
    pub fn per(requests: u32, per: Duration) -> Self {
        let refill_per_sec = f64::from(requests) / per.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity: refill_per_sec.max(1.0),
            refill_per_sec,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.capacity >= 1.0 && self.refill_per_sec > 0.0) {
            return Err(ConfigError(format!(
                "rate limit needs capacity >= 1 and a positive refill rate, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Parses `none`, `N`, `N/s`, `N/m`, `N/h`, `N/500ms` or `N/2s`.
///
/// `Ok(None)` means unlimited.
pub fn parse_rate_limit(raw: &str) -> Result<Option<RateLimitConfig>, ConfigError> {
    let raw = raw.trim();
    if matches!(
        raw.to_ascii_lowercase().as_str(),
        "none" | "unlimited" | "disabled" | "off"
    ) {
        return Ok(None);
    }
    let invalid = || ConfigError(format!("invalid rate limit {raw:?}"));
    let (count, per) = raw.split_once('/').unwrap_or((raw, "1s"));
    let count: u32 = count.trim().parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }
    let per = per.trim();
    let digits = per.chars().take_while(char::is_ascii_digit).count();
    let (amount, unit) = per.split_at(digits);
    let amount: u64 = if amount.is_empty() {
        1
    } else {
        amount.parse().map_err(|_| invalid())?
    };
    let period = match unit {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount * 60),
        "h" => Duration::from_secs(amount * 3_600),
        _ => return Err(invalid()),
    };
    if period.is_zero() {
        return Err(invalid());
    }
    Ok(Some(RateLimitConfig::per(count, period)))
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket owned by one source. `acquire` waits for a token; with no
/// config every call is admitted immediately.
#[derive(Debug)]
pub struct RateLimiter {
    config: Option<RateLimitConfig>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: Option<RateLimitConfig>) -> Result<Self, ConfigError> {
        if let Some(cfg) = &config {
            cfg.validate()?;
        }
        Ok(Self {
            bucket: Mutex::new(Bucket {
                tokens: config.map_or(0.0, |c| c.capacity),
                last_refill: Instant::now(),
            }),
            config,
        })
    }

    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            config: None,
            bucket: Mutex::new(Bucket {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> Option<RateLimitConfig> {
        self.config
    }

    /// Takes a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let Some(cfg) = self.config else {
            return true;
        };
        let mut bucket = self.bucket.lock().await;
        refill(&mut bucket, &cfg);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Waits until a token is available and takes it. The lock is not held
    /// while sleeping.
    pub async fn acquire(&self) {
        let Some(cfg) = self.config else {
            return;
        };
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                refill(&mut bucket, &cfg);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / cfg.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

fn refill(bucket: &mut Bucket, cfg: &RateLimitConfig) {
    let now = Instant::now();
    let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
    bucket.last_refill = now;
    bucket.tokens = (bucket.tokens + elapsed * cfg.refill_per_sec).min(cfg.capacity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_style_rates() {
        assert_eq!(parse_rate_limit("none").expect("none"), None);
        assert_eq!(parse_rate_limit("OFF").expect("off"), None);
        let per_min = parse_rate_limit("120/m").expect("per minute").expect("limited");
        assert!((per_min.refill_per_sec - 2.0).abs() < 1e-9);
        let bare = parse_rate_limit("5").expect("bare").expect("limited");
        assert!((bare.refill_per_sec - 5.0).abs() < 1e-9);
        let slow = parse_rate_limit("1/2s").expect("slow").expect("limited");
        assert!((slow.refill_per_sec - 0.5).abs() < 1e-9);
        assert!((slow.capacity - 1.0).abs() < 1e-9);
        for bad in ["", "x/s", "0/s", "3/fortnight", "3/0s"] {
            assert!(parse_rate_limit(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn degenerate_bucket_is_a_config_error() {
        let err = RateLimiter::new(Some(RateLimitConfig {
            capacity: 0.5,
            refill_per_sec: 1.0,
        }))
        .expect_err("capacity below one token");
        assert!(err.0.contains("capacity"));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill_once_burst_is_spent() {
        let limiter = RateLimiter::new(Some(RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 1.0,
        }))
        .expect("limiter");
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(10));
        assert!(!limiter.try_acquire().await);
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test]
    async fn unlimited_never_blocks() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..1_000 {
            assert!(limiter.try_acquire().await);
        }
    }
}
