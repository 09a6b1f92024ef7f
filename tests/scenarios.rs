//! End-to-end scenarios run against the in-memory persistence backend,
//! through the same public entry points a real process would call.

use insights_engine::clock::{Clock, ManualClock};
use insights_engine::persistence::{AggregateStore, EventStore, InsightRequestStore, MemoryStore};
use insights_engine::types::{Aggregate, EventType, InsightRequest, Reading, SensorStats, SensorStatus, WindowType};
use insights_engine::{aggregator, ingest, insight};

fn reading(hardware_id: &str, ts_ms: i64, moisture: f64, temperature: f64) -> Reading {
    Reading {
        hardware_id: hardware_id.to_string(),
        batch_id: format!("b-{ts_ms}"),
        timestamp_ms: ts_ms,
        ingest_time_ms: ts_ms,
        temperature: Some(temperature),
        humidity: Some(50.0),
        pressure: Some(1000.0),
        soil_moisture: Some(moisture),
        temperature_status: SensorStatus::Ok,
        humidity_status: SensorStatus::Ok,
        pressure_status: SensorStatus::Ok,
        soil_moisture_status: SensorStatus::Ok,
    }
}

#[tokio::test]
async fn rapid_watering_spike_produces_one_event() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    for (ts_ms, moisture) in [(0, 30.0), (600_000, 31.0)] {
        clock.set(ts_ms);
        ingest::ingest_reading(&store, &clock, reading("dev-1", ts_ms, moisture, 22.0)).await.unwrap();
    }
    clock.set(1_500_000);
    ingest::ingest_reading(&store, &clock, reading("dev-1", 1_500_000, 50.0, 22.0)).await.unwrap();

    let events = EventStore::range(&store, "dev-1", 0, 1_500_001).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::WateringEvent);
    assert_eq!(events[0].start_time_ms, 0);
    assert_eq!(events[0].end_time_ms, 1_500_000);
}

#[tokio::test]
async fn gradual_rise_below_ten_percent_is_ignored() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    for (ts_ms, moisture) in [(0, 30.0), (900_000, 33.0), (1_800_000, 36.0), (2_700_000, 39.0)] {
        clock.set(ts_ms);
        ingest::ingest_reading(&store, &clock, reading("dev-1", ts_ms, moisture, 22.0)).await.unwrap();
    }

    let events = EventStore::range(&store, "dev-1", 0, 2_700_001).await.unwrap();
    assert!(events.iter().all(|e| e.event_type != EventType::WateringEvent));
}

#[tokio::test]
async fn drying_cycle_over_six_hours_fires_once() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    let moistures = [60.0, 58.0, 55.0, 52.0, 50.0, 47.0, 45.0, 43.0];
    for (i, moisture) in moistures.iter().enumerate() {
        let ts_ms = i as i64 * 30 * 60_000;
        clock.set(ts_ms);
        ingest::ingest_reading(&store, &clock, reading("dev-1", ts_ms, *moisture, 22.0)).await.unwrap();
    }

    let events = EventStore::range(&store, "dev-1", 0, 8 * 30 * 60_000).await.unwrap();
    let drying: Vec<_> = events.iter().filter(|e| e.event_type == EventType::DryingCycle).collect();
    assert_eq!(drying.len(), 1);
}

#[tokio::test]
async fn temperature_boundary_and_cooldown() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    ingest::ingest_reading(&store, &clock, reading("dev-1", 0, 40.0, 35.0)).await.unwrap();
    let events = EventStore::range(&store, "dev-1", 0, 1).await.unwrap();
    assert!(events.is_empty(), "exactly 35.0C must not trigger stress");

    clock.set(60_000);
    ingest::ingest_reading(&store, &clock, reading("dev-1", 60_000, 40.0, 35.1)).await.unwrap();
    let events = EventStore::range(&store, "dev-1", 0, 60_001).await.unwrap();
    assert_eq!(events.iter().filter(|e| e.event_type == EventType::TemperatureStress).count(), 1);

    clock.set(15 * 60_000);
    ingest::ingest_reading(&store, &clock, reading("dev-1", 15 * 60_000, 40.0, 36.0)).await.unwrap();
    let events = EventStore::range(&store, "dev-1", 0, 15 * 60_000 + 1).await.unwrap();
    assert_eq!(
        events.iter().filter(|e| e.event_type == EventType::TemperatureStress).count(),
        1,
        "second stress reading within cooldown must be suppressed"
    );
}

#[tokio::test]
async fn late_arrival_within_lateness_window_triggers_rebuild() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    let hour_start_ms = 0;
    clock.set(hour_start_ms);
    ingest::ingest_reading(&store, &clock, reading("dev-1", hour_start_ms, 40.0, 20.0)).await.unwrap();

    // Arrives 3h after its own hour closed (< 24h lateness window): rebuild, not discard.
    let late_ts_ms = hour_start_ms + 3 * 3_600_000;
    clock.set(late_ts_ms);
    ingest::ingest_reading(&store, &clock, reading("dev-1", hour_start_ms + 30 * 60_000, 45.0, 20.0)).await.unwrap();

    let aggregate = AggregateStore::get(&store, "dev-1", WindowType::Hourly, hour_start_ms).await.unwrap().expect("rebuilt aggregate");
    assert_eq!(aggregate.soil_moisture_stats.valid_count, 2, "late-but-within-window reading must be folded into a rebuild");
}

#[tokio::test]
async fn very_late_arrival_past_lateness_window_is_discarded() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(0);

    let hour_start_ms = 0;
    clock.set(hour_start_ms);
    ingest::ingest_reading(&store, &clock, reading("dev-1", hour_start_ms, 40.0, 20.0)).await.unwrap();

    let very_late_ts_ms = hour_start_ms + 3_600_000 + 25 * 3_600_000;
    clock.set(very_late_ts_ms);
    ingest::ingest_reading(&store, &clock, reading("dev-1", hour_start_ms + 30 * 60_000, 45.0, 20.0)).await.unwrap();

    let aggregate = AggregateStore::get(&store, "dev-1", WindowType::Hourly, hour_start_ms).await.unwrap().expect("original aggregate untouched");
    assert_eq!(aggregate.soil_moisture_stats.valid_count, 1, "reading past the lateness window must be discarded, not folded in");
}

#[tokio::test]
async fn combining_two_hourly_aggregates_matches_expected_arithmetic() {
    let mut a = Aggregate::new_empty("dev-1", WindowType::Hourly, 0, 3_600_000);
    a.soil_moisture_stats = SensorStats { valid_count: 3, total_count: 3, sum: 60.0, sumsq: 1204.0, min: Some(18.0), max: Some(22.0), ..Default::default() };
    let mut b = Aggregate::new_empty("dev-1", WindowType::Hourly, 3_600_000, 7_200_000);
    b.soil_moisture_stats = SensorStats { valid_count: 3, total_count: 3, sum: 66.0, sumsq: 1460.0, min: Some(20.0), max: Some(24.0), ..Default::default() };

    let combined = aggregator::combine_sensor_stats(&[&a.soil_moisture_stats, &b.soil_moisture_stats]);

    assert_eq!(combined.valid_count, 6);
    assert_eq!(combined.total_count, 6);
    assert!((combined.sum - 126.0).abs() < 1e-9);
    assert!((combined.sumsq - 2664.0).abs() < 1e-9);
    assert_eq!(combined.min, Some(18.0));
    assert_eq!(combined.max, Some(24.0));
    assert!((combined.avg.unwrap() - 21.0).abs() < 1e-9);
    assert!((combined.stddev.unwrap() - 1.7320508).abs() < 1e-3);
}

#[tokio::test]
async fn insufficient_data_fails_insight_generation_but_eight_hours_succeeds_at_low_confidence() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(10 * 24 * 3_600_000);
    let llm = insights_engine::LlmConfig { endpoint_url: "https://example.invalid".to_string(), model: "test".to_string(), api_key: None };

    async fn seed_hours(store: &MemoryStore, hours: i64, now_ms: i64) {
        for h in 0..hours {
            let start = now_ms - (h + 1) * 3_600_000;
            let mut agg = Aggregate::new_empty("dev-1", WindowType::Hourly, start, start + 3_600_000);
            agg.temperature_stats = SensorStats { valid_count: 1, total_count: 1, sum: 20.0, avg: Some(20.0), ..Default::default() };
            AggregateStore::put(store, agg).await.unwrap();
        }
    }

    seed_hours(&store, 4, clock.now_ms()).await;
    InsightRequestStore::put(&store, InsightRequest::new_scheduled("dev-1", clock.now_ms())).await.unwrap();
    let claimed = insight::generator::run_once(&store, &clock, &llm, 10).await.unwrap();
    assert_eq!(claimed, 1, "the request is still claimed even though generation fails for insufficient data");

    let store2 = MemoryStore::new();
    seed_hours(&store2, 8, clock.now_ms()).await;
    InsightRequestStore::put(&store2, InsightRequest::new_scheduled("dev-1", clock.now_ms())).await.unwrap();
    let claimed2 = insight::generator::run_once(&store2, &clock, &llm, 10).await.unwrap();
    assert_eq!(claimed2, 1);

    let requests = InsightRequestStore::latest_for_device_since(&store2, "dev-1", 0).await.unwrap();
    assert!(
        requests.iter().any(|r| r.status == insights_engine::types::InsightRequestStatus::Done),
        "8 valid hours clears the minimum and completes the request"
    );
}

#[tokio::test]
async fn disallowed_keyword_is_scrubbed_before_persisting() {
    assert_eq!(insight::sanitize::sanitize("watch for fungus on new growth"), "watch for condition on new growth");
}
