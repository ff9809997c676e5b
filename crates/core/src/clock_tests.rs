// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let e0 = clock.epoch_ms();

    clock.advance(Duration::from_millis(1500));

    assert_eq!(clock.now() - t0, Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms(), e0 + 1500);
}

#[test]
fn fake_clock_advances_in_ms() {
    let clock = FakeClock::starting_at(0);
    clock.advance_ms(120_000);
    assert_eq!(clock.epoch_ms(), 120_000);
}

#[test]
fn fake_clock_starting_at_sets_epoch() {
    let clock = FakeClock::starting_at(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn fake_clock_set_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn system_clock_epoch_is_nonzero() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.epoch_ms(), other.epoch_ms());
}
