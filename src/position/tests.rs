use super::*;

use chrono::{Duration, TimeZone};

fn entry_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
}

#[test]
fn long_position_pl_tracks_price() {
    let mut position = Position::new("AAPL", 10, PositionSide::Long, 100.0, entry_time());

    assert_eq!(position.qty(), 10);
    assert_eq!(position.pl(), 0.0);
    assert_eq!(position.pl_pct(), 0.0);

    position.update_pl(105.0);
    assert_eq!(position.pl(), 50.0);
    assert!((position.pl_pct() - 0.05).abs() < 1e-12);

    position.update_pl(92.0);
    assert_eq!(position.pl(), -80.0);
    assert!((position.pl_pct() - -0.08).abs() < 1e-12);
}

#[test]
fn short_position_pl_is_sign_adjusted() {
    let mut position = Position::new("TSLA", 5, PositionSide::Short, 200.0, entry_time());

    position.update_pl(190.0);
    assert_eq!(position.pl(), 50.0);
    assert!((position.pl_pct() - 0.05).abs() < 1e-12);

    position.update_pl(210.0);
    assert_eq!(position.pl(), -50.0);
    assert!((position.pl_pct() - -0.05).abs() < 1e-12);
}

#[test]
fn exposure_is_market_value_over_equity() {
    let mut position = Position::new("MSFT", 48, PositionSide::Long, 50.0, entry_time());
    position.update_pl(50.0);

    assert!((position.exposure(30_000.0) - 0.08).abs() < 1e-12);

    // Non-positive equity never yields a negative or infinite exposure
    assert_eq!(position.exposure(0.0), 0.0);
    assert_eq!(position.exposure(-1.0), 0.0);
}

#[test]
fn add_shares_averages_entry_price() {
    let mut position = Position::new("NVDA", 10, PositionSide::Long, 100.0, entry_time());

    position.add_shares(10, 110.0);

    assert_eq!(position.qty(), 20);
    assert!((position.entry_price() - 105.0).abs() < 1e-12);
    assert_eq!(position.current_price(), 110.0);
    // 20 shares, +5 per share against the averaged entry
    assert!((position.pl() - 100.0).abs() < 1e-9);
}

#[test]
fn into_closed_realizes_pl_at_exit_fill() {
    let position = Position::new("AMD", 8, PositionSide::Long, 120.0, entry_time());
    let exit_time = entry_time() + Duration::days(2);

    let closed = position.into_closed(130.0, exit_time);

    assert_eq!(closed.ticker, "AMD");
    assert_eq!(closed.qty, 8);
    assert_eq!(closed.exit_price, 130.0);
    assert_eq!(closed.exit_time, exit_time);
    assert!((closed.realized_pl - 80.0).abs() < 1e-9);
}

#[test]
fn history_orders_chronologically_and_looks_up_by_id() {
    let mut history = ClosedPositionHistory::new();
    assert!(history.is_empty());

    let older = Position::new("A", 1, PositionSide::Long, 10.0, entry_time())
        .into_closed(11.0, entry_time() + Duration::days(1));
    let newer = Position::new("B", 1, PositionSide::Long, 10.0, entry_time() + Duration::days(3))
        .into_closed(9.0, entry_time() + Duration::days(4));

    let older_id = older.id;
    history.add(newer.clone());
    history.add(older.clone());

    assert_eq!(history.len(), 2);
    assert_eq!(history.get_by_id(older_id), Some(&older));
    assert!((history.realized_pl() - 0.0).abs() < 1e-9);

    let ascending: Vec<&str> = history.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(ascending, vec!["A", "B"]);

    let descending: Vec<&str> = history.iter_desc().map(|r| r.ticker.as_str()).collect();
    assert_eq!(descending, vec!["B", "A"]);

    assert!(history.to_table().contains("entry_time"));
}

#[test]
fn held_days_counts_whole_days() {
    let position = Position::new("AAPL", 1, PositionSide::Long, 10.0, entry_time());

    assert_eq!(position.held_days(entry_time() + Duration::hours(30)), 1);
    assert_eq!(position.held_days(entry_time() + Duration::days(6)), 6);
}
