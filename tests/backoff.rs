use opencockpit::config::NetworkSettings;
use opencockpit::network::{
    delay_for_attempt, Backoff, ChannelEvent, ConnectionState, NetworkChannel, TransportCommand,
};
use proptest::prelude::*;
use rstest::rstest;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const INITIAL: Duration = Duration::from_millis(1000);
const MAX: Duration = Duration::from_millis(30_000);

#[rstest]
#[case(0, 1000)]
#[case(1, 2000)]
#[case(2, 4000)]
#[case(3, 8000)]
#[case(4, 16_000)]
#[case(5, 30_000)]
#[case(12, 30_000)]
fn delay_table(#[case] attempt: u32, #[case] expected_ms: u64) {
    assert_eq!(
        delay_for_attempt(INITIAL, MAX, attempt),
        Duration::from_millis(expected_ms)
    );
}

proptest! {
    #[test]
    fn delay_stays_within_bounds(attempt in 0u32..200) {
        let delay = delay_for_attempt(INITIAL, MAX, attempt);
        prop_assert!(delay >= INITIAL);
        prop_assert!(delay <= MAX);
    }

    #[test]
    fn consecutive_delays_double_until_cap(failures in 1usize..40) {
        let mut backoff = Backoff::new(INITIAL, MAX);
        let mut previous = backoff.next_delay();
        for _ in 1..failures {
            let next = backoff.next_delay();
            prop_assert_eq!(next, (previous * 2).min(MAX));
            previous = next;
        }
    }
}

fn open(channel: &mut NetworkChannel, now: Instant) -> mpsc::Receiver<String> {
    let (writer, frames) = mpsc::channel(8);
    channel.handle_event(ChannelEvent::Opened(writer), now);
    frames
}

// Close, then two failed attempts: 1000 ms, then 2000 ms
#[test]
fn close_then_two_failures_backs_off_1000_then_2000() {
    let (tx, mut commands) = mpsc::channel(4);
    let t0 = Instant::now();
    let mut channel = NetworkChannel::new(&NetworkSettings::default(), tx, t0);

    channel.connect(t0);
    assert_eq!(commands.try_recv().ok(), Some(TransportCommand::Connect));
    let _frames = open(&mut channel, t0);
    assert_eq!(channel.state(), ConnectionState::Connected);

    let closed_at = t0 + Duration::from_secs(5);
    channel.handle_event(ChannelEvent::Closed(None), closed_at);
    assert_eq!(
        channel.state(),
        ConnectionState::Reconnecting {
            delay: Duration::from_millis(1000)
        }
    );

    channel.poll_retry(closed_at + Duration::from_millis(999));
    assert!(commands.try_recv().is_err());

    let first_retry = closed_at + Duration::from_millis(1000);
    channel.poll_retry(first_retry);
    assert_eq!(commands.try_recv().ok(), Some(TransportCommand::Connect));
    assert_eq!(channel.state(), ConnectionState::Connecting);

    channel.handle_event(ChannelEvent::ConnectFailed("refused".into()), first_retry);
    assert_eq!(
        channel.state(),
        ConnectionState::Reconnecting {
            delay: Duration::from_millis(2000)
        }
    );
    assert_eq!(channel.retry_at(), Some(first_retry + Duration::from_millis(2000)));

    let second_retry = first_retry + Duration::from_millis(2000);
    channel.poll_retry(second_retry);
    channel.handle_event(ChannelEvent::ConnectFailed("refused".into()), second_retry);
    assert_eq!(
        channel.state(),
        ConnectionState::Reconnecting {
            delay: Duration::from_millis(4000)
        }
    );
}

#[test]
fn successful_connect_resets_delay() {
    let (tx, mut commands) = mpsc::channel(4);
    let t0 = Instant::now();
    let mut channel = NetworkChannel::new(&NetworkSettings::default(), tx, t0);

    channel.connect(t0);
    channel.handle_event(ChannelEvent::ConnectFailed("refused".into()), t0);
    let retry = t0 + Duration::from_millis(1000);
    channel.poll_retry(retry);
    channel.handle_event(ChannelEvent::ConnectFailed("refused".into()), retry);

    let retry = retry + Duration::from_millis(2000);
    channel.poll_retry(retry);
    let _frames = open(&mut channel, retry);
    channel.handle_event(ChannelEvent::Closed(Some("server restart".into())), retry);
    assert_eq!(
        channel.state(),
        ConnectionState::Reconnecting {
            delay: Duration::from_millis(1000)
        }
    );

    while commands.try_recv().is_ok() {}
}
