//! Availability cache warm-up tests against a mock image source.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use hrrr_browser::{AvailabilityCache, CacheScope, WarmConfig};
use hrrr_common::{LayerId, UtcSlot};

fn scope(y: i32, m: u32, d: u32, layer: &str) -> CacheScope {
    CacheScope::new(date(y, m, d), LayerId::new(layer))
}

// ============================================================================
// Gate and timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_warm_requests_every_hour_and_waits_for_gate() {
    let source = Arc::new(MockSource::new().missing_hours(&[0, 1, 2]));
    let cache = AvailabilityCache::new(WarmConfig::default());

    let report = cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;

    assert_eq!(report.launched, 24);
    assert!(report.gate_completed);
    for hour in 19..24 {
        assert!(report.available.contains(&hour), "hour {} missing", hour);
    }
    assert_eq!(source.calls().len(), 24);
    // most recent hour is requested first
    assert!(source.calls()[0].contains("t23z"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.hours().await, (3..24).collect::<Vec<_>>());
    assert_eq!(cache.most_recent_hour().await, Some(23));
}

#[tokio::test(start_paused = true)]
async fn test_warm_returns_after_timeout_and_keeps_filling() {
    let source = Arc::new(
        MockSource::new()
            .route(cycle(23), MockResponse::ok(60_000))
            .route(cycle(22), MockResponse::ok(60_000)),
    );
    let cache = AvailabilityCache::new(WarmConfig {
        gate_size: 5,
        gate_timeout: Duration::from_secs(5),
    });

    let report = cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;

    assert!(!report.gate_completed);
    assert!(!report.available.contains(&23));
    assert!(report.available.contains(&21));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(cache.contains(&scope(2024, 1, 15, "REFLECTIVITY"), 23).await);
    assert_eq!(cache.hours().await.len(), 24);
}

#[tokio::test(start_paused = true)]
async fn test_failed_requests_leave_hours_out() {
    let source = Arc::new(MockSource::with_default(MockResponse::status(404, 10)).route(cycle(7), MockResponse::ok(10)));
    let cache = AvailabilityCache::new(WarmConfig::default());

    cache
        .warm(source, &url_builder(), &utc(), scope(2024, 1, 15, "MASSDEN"))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(cache.hours().await, vec![7]);
    assert_eq!(cache.nearest_hour(20).await, Some(7));
    assert_eq!(cache.most_recent_hour().await, Some(7));
}

// ============================================================================
// Scope changes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scope_change_clears_previous_hours() {
    let source = Arc::new(
        MockSource::new().route("hrrr.20240116", MockResponse::status(404, 10)),
    );
    let cache = AvailabilityCache::new(WarmConfig::default());

    cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.hours().await.len(), 24);

    let report = cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 16, "REFLECTIVITY"))
        .await;
    assert!(report.available.is_empty());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(cache.hours().await.is_empty());
    assert_eq!(cache.most_recent_hour().await, None);
    assert_eq!(cache.nearest_hour(12).await, None);
    assert!(!cache.contains(&scope(2024, 1, 15, "REFLECTIVITY"), 12).await);
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_results_are_discarded() {
    // every request for the first date is slower than the gate timeout
    let source = Arc::new(
        MockSource::new()
            .route("hrrr.20240115", MockResponse::ok(30_000))
            .route("hrrr.20240116", MockResponse::status(404, 10)),
    );
    let cache = AvailabilityCache::new(WarmConfig::default());

    let first = cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;
    assert!(!first.gate_completed);

    let second = cache
        .warm(source.clone(), &url_builder(), &utc(), scope(2024, 1, 16, "REFLECTIVITY"))
        .await;
    assert!(second.generation > first.generation);

    // let the slow first-date requests land
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls_matching("hrrr.20240115"), 24);
    assert!(cache.hours().await.is_empty());
    assert_eq!(cache.scope().await, Some(scope(2024, 1, 16, "REFLECTIVITY")));
}

#[tokio::test(start_paused = true)]
async fn test_layer_change_is_a_new_scope() {
    let source = Arc::new(MockSource::new());
    let cache = AvailabilityCache::new(WarmConfig::default());
    let reflectivity = scope(2024, 1, 15, "REFLECTIVITY");
    let smoke = scope(2024, 1, 15, "MASSDEN");

    cache.warm(source.clone(), &url_builder(), &utc(), reflectivity.clone()).await;
    let generation = cache.generation().await;
    cache.reset(&utc(), smoke.clone()).await;

    assert_eq!(cache.generation().await, generation + 1);
    assert!(cache.hours().await.is_empty());
    assert!(!cache.mark_available(&reflectivity, 4).await);
    assert!(cache.mark_available(&smoke, 4).await);
    assert_eq!(cache.order().await, vec![4]);
}

// ============================================================================
// Local day across UTC dates
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_warm_covers_local_evening_in_next_utc_date() {
    let source = Arc::new(MockSource::new());
    let cache = AvailabilityCache::new(WarmConfig {
        gate_size: 24,
        gate_timeout: Duration::from_secs(5),
    });

    let report = cache
        .warm(source.clone(), &url_builder(), &zone("America/New_York"), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;

    assert!(report.gate_completed);
    assert_eq!(report.available, (0..24).collect::<Vec<_>>());
    // 19:00-23:00 EST live in the next UTC date
    assert_eq!(source.calls_matching("hrrr.20240116"), 5);
    assert_eq!(source.calls_matching("hrrr.20240115"), 19);
    assert!(source.calls()[0].contains(&file(2024, 1, 16, 4)));
    assert_eq!(cache.most_recent_hour().await, Some(23));
}

#[tokio::test(start_paused = true)]
async fn test_half_hour_zone_records_local_hours() {
    let source = Arc::new(
        MockSource::with_default(MockResponse::status(404, 10))
            .route(file(2024, 1, 14, 20), MockResponse::ok(10)),
    );
    let cache = AvailabilityCache::new(WarmConfig::default());

    cache
        .warm(source, &url_builder(), &zone("Asia/Kolkata"), scope(2024, 1, 15, "REFLECTIVITY"))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // 20Z on the 14th covers 02:00 IST on the 15th
    assert_eq!(cache.hours().await, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_mark_slot_maps_file_to_local_hour() {
    let cache = AvailabilityCache::new(WarmConfig::default());
    let evening = scope(2024, 1, 15, "REFLECTIVITY");
    cache.reset(&zone("America/New_York"), evening.clone()).await;
    let layer = LayerId::new("REFLECTIVITY");

    assert!(cache.mark_slot(&layer, UtcSlot::new(date(2024, 1, 16), 4).unwrap()).await);
    assert!(cache.contains(&evening, 23).await);
    assert!(cache.contains_slot(&layer, &UtcSlot::new(date(2024, 1, 16), 4).unwrap()).await);

    // 05Z on the 16th is local midnight of the next day
    assert!(!cache.mark_slot(&layer, UtcSlot::new(date(2024, 1, 16), 5).unwrap()).await);
    assert!(!cache.mark_slot(&LayerId::new("MASSDEN"), UtcSlot::new(date(2024, 1, 15), 5).unwrap()).await);
    assert_eq!(cache.hours().await, vec![23]);
}
