use std::sync::Arc;
use std::time::Duration;

use studytrack::clock::MockClock;
use studytrack::limiter::{ChannelRateLimiter, RateLimitConfig, RateLimiter};

fn limiter(max: u32, window_ms: u64, clock: &MockClock) -> RateLimiter<MockClock> {
    let config = RateLimitConfig::new(max, Duration::from_millis(window_ms), "slow down").unwrap();
    RateLimiter::with_clock(config, clock.clone())
}

#[test]
fn burst_up_to_capacity_then_reject() {
    let clock = MockClock::new();
    let limiter = limiter(5, 60_000, &clock);

    for _ in 0..5 {
        assert!(limiter.admit("ip:1").allowed);
    }
    let denied = limiter.admit("ip:1");
    assert!(!denied.allowed);
    assert_eq!(denied.tokens_remaining, 0);
    assert_eq!(denied.retry_after_secs, Some(60));
}

#[test]
fn login_style_limit_counts_down_remaining() {
    let clock = MockClock::new();
    let limiter = limiter(5, 60_000, &clock);

    let remaining: Vec<u32> = (0..5)
        .map(|_| limiter.admit("login:10.0.0.1").tokens_remaining)
        .collect();
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let denied = limiter.admit("login:10.0.0.1");
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_secs, Some(60));
}

#[test]
fn half_window_refills_half_the_bucket() {
    let clock = MockClock::new();
    let limiter = limiter(10, 10_000, &clock);

    for _ in 0..10 {
        assert!(limiter.admit("chat").allowed);
    }
    assert!(!limiter.admit("chat").allowed);

    clock.advance(Duration::from_millis(5_000));
    for _ in 0..5 {
        assert!(limiter.admit("chat").allowed);
    }
    assert!(!limiter.admit("chat").allowed);
}

#[test]
fn empty_bucket_is_full_again_after_one_window() {
    let clock = MockClock::new();
    let limiter = limiter(3, 1_000, &clock);

    for _ in 0..3 {
        limiter.admit("k");
    }
    clock.advance(Duration::from_secs(30));

    let admission = limiter.admit("k");
    assert!(admission.allowed);
    assert_eq!(admission.tokens_remaining, 2);
}

#[test]
fn keys_do_not_share_tokens() {
    let clock = MockClock::new();
    let limiter = limiter(2, 60_000, &clock);

    assert!(limiter.admit("api:alice:1.1.1.1").allowed);
    assert!(limiter.admit("api:alice:1.1.1.1").allowed);
    assert!(!limiter.admit("api:alice:1.1.1.1").allowed);

    assert!(limiter.admit("api:bob:1.1.1.1").allowed);
    assert_eq!(limiter.bucket_count(), 2);
}

#[test]
fn tokens_stay_within_bounds() {
    let clock = MockClock::new();
    let limiter = limiter(4, 2_000, &clock);

    for step in 0..200u64 {
        limiter.admit("k");
        let tokens = limiter.bucket("k").unwrap().tokens();
        assert!((0.0..=4.0).contains(&tokens), "tokens {} out of range", tokens);
        clock.advance(Duration::from_millis(step % 7 * 150));
    }
}

#[test]
fn retry_hint_rounds_window_up_to_whole_seconds() {
    let config = RateLimitConfig::new(1, Duration::from_millis(1_500), "wait").unwrap();
    assert_eq!(config.retry_after_secs(), 2);
    assert_eq!(RateLimitConfig::chat().retry_after_secs(), 10);
}

#[test]
fn channel_limits_each_connection_separately() {
    let clock = MockClock::new();
    let chat = ChannelRateLimiter::from_limiter(Arc::new(limiter(1, 10_000, &clock)));

    assert!(chat.admit("u1", "conn-a").allowed);
    assert!(!chat.admit("u1", "conn-a").allowed);
    assert!(chat.admit("u1", "conn-b").allowed);
    assert!(chat.limiter().bucket("channel:u1:conn-a").is_some());
}

#[tokio::test(start_paused = true)]
async fn sweeper_removes_idle_buckets() {
    let clock = MockClock::new();
    let limiter = Arc::new(limiter(5, 60_000, &clock).idle_after(Duration::from_secs(300)));
    limiter.admit("stale");

    let _sweeper = limiter.spawn_sweeper(Duration::from_secs(60));

    clock.advance(Duration::from_secs(200));
    limiter.admit("fresh");
    clock.advance(Duration::from_secs(150));

    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    assert!(limiter.bucket("stale").is_none());
    assert!(limiter.bucket("fresh").is_some());
}

#[tokio::test(start_paused = true)]
async fn sweeper_stops_after_limiter_is_dropped() {
    let clock = MockClock::new();
    let limiter = Arc::new(limiter(5, 60_000, &clock));
    let sweeper = limiter.spawn_sweeper(Duration::from_secs(1));
    drop(limiter);

    let finished = tokio::time::timeout(Duration::from_secs(10), sweeper).await;
    assert!(finished.is_ok());
}
