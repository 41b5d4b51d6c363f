//! Integration tests for the streaming iterator against a scripted server.

mod common;

use cadence::error::{CadenceError, ContiguityError, QueryError};
use cadence::proto::IteratorCommand;
use cadence::transport::duplex;
use cadence::{
    AUTO_SPAN, ChannelKey, CoreIterator, IteratorConfig, SampleBuffer, Size, TimeRange, TimeSpan,
    TimeStamp, TypedIterator,
};
use common::{
    PRESSURE, TEMPERATURE, init_tracing, pressure_frame, registry, spawn_iterator_server,
    temperature_frame, temperature_second,
};

fn full_range() -> TimeRange {
    TimeRange::new(TimeStamp::ZERO, TimeStamp::seconds(10))
}

#[tokio::test]
async fn test_aggregate_merges_frames_across_commands() {
    init_tracing();
    let (transport, listener) = duplex();
    let server = spawn_iterator_server(
        listener,
        vec![
            vec![temperature_frame(1)],
            vec![temperature_frame(2)],
            vec![temperature_frame(3)],
        ],
    );

    let config = IteratorConfig::default().with_aggregate(true);
    let mut iter = TypedIterator::new(transport, registry(), config);
    iter.open(full_range(), &[TEMPERATURE]).await.unwrap();

    assert!(iter.next(AUTO_SPAN).await.unwrap());
    assert!(iter.next(AUTO_SPAN).await.unwrap());
    assert!(iter.next(AUTO_SPAN).await.unwrap());

    let value = iter.value().await.unwrap();
    assert_eq!(value.len(), 1);
    let merged = &value[&TEMPERATURE];
    assert_eq!(
        merged.range().unwrap(),
        TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(4))
    );
    assert_eq!(merged.sample_count().unwrap(), 75);
    assert_eq!(merged.size(), Size::bytes(600));

    let mut expected = Vec::new();
    for s in 1..4 {
        if let SampleBuffer::Float64(v) = temperature_second(s) {
            expected.extend(v);
        }
    }
    assert_eq!(merged.samples().unwrap(), SampleBuffer::Float64(expected));

    // An empty read keeps everything accumulated so far.
    assert!(!iter.next(AUTO_SPAN).await.unwrap());
    assert_eq!(iter.core().frames().len(), 3);

    iter.close().await.unwrap();
    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].command(), IteratorCommand::Open);
    assert_eq!(requests[0].keys, vec![TEMPERATURE.value()]);
    assert!(
        requests[1..]
            .iter()
            .all(|r| r.command() == IteratorCommand::Next && r.span == -1)
    );
}

#[tokio::test]
async fn test_without_aggregate_only_latest_frame_is_kept() {
    init_tracing();
    let (transport, listener) = duplex();
    let server = spawn_iterator_server(
        listener,
        vec![
            vec![temperature_frame(1)],
            vec![temperature_frame(2)],
            vec![temperature_frame(3)],
        ],
    );

    let mut iter = TypedIterator::new(transport, registry(), IteratorConfig::default());
    iter.open(full_range(), &[TEMPERATURE]).await.unwrap();
    for _ in 0..3 {
        assert!(iter.next(TimeSpan::seconds(1)).await.unwrap());
    }

    let value = iter.value().await.unwrap();
    let latest = &value[&TEMPERATURE];
    assert_eq!(
        latest.range().unwrap(),
        TimeRange::new(TimeStamp::seconds(3), TimeStamp::seconds(4))
    );
    assert_eq!(latest.sample_count().unwrap(), 25);

    // A read that returns nothing clears the previous frames.
    assert!(!iter.next(TimeSpan::seconds(1)).await.unwrap());
    assert!(iter.value().await.unwrap().is_empty());

    iter.close().await.unwrap();
    let requests = server.await.unwrap();
    assert_eq!(requests[1].span, TimeSpan::seconds(1).value());
}

#[tokio::test]
async fn test_value_sorts_frames_and_separates_channels() {
    init_tracing();
    let (transport, listener) = duplex();
    let _server = spawn_iterator_server(
        listener,
        vec![
            vec![temperature_frame(2), pressure_frame(2), temperature_frame(1)],
            vec![pressure_frame(1), temperature_frame(3)],
        ],
    );

    let config = IteratorConfig::default().with_aggregate(true);
    let mut iter = TypedIterator::new(transport, registry(), config);
    iter.open(full_range(), &[TEMPERATURE, PRESSURE]).await.unwrap();
    assert!(iter.seek_first().await.unwrap());
    assert!(iter.next(AUTO_SPAN).await.unwrap());

    // Raw frames stay in arrival order.
    let starts: Vec<TimeStamp> = iter.core().frames().iter().map(|f| f.start).collect();
    assert_eq!(starts[0], TimeStamp::seconds(2));

    let value = iter.value().await.unwrap();
    assert_eq!(value.keys().copied().collect::<Vec<_>>(), vec![TEMPERATURE, PRESSURE]);
    assert_eq!(
        value[&TEMPERATURE].range().unwrap(),
        TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(4))
    );
    assert_eq!(
        value[&PRESSURE].range().unwrap(),
        TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(3))
    );
    assert_eq!(value[&PRESSURE].sample_count().unwrap(), 200);

    iter.close().await.unwrap();
}

#[tokio::test]
async fn test_value_rejects_gap_between_frames() {
    init_tracing();
    let (transport, listener) = duplex();
    let _server = spawn_iterator_server(
        listener,
        vec![vec![temperature_frame(1)], vec![temperature_frame(3)]],
    );

    let config = IteratorConfig::default().with_aggregate(true);
    let mut iter = TypedIterator::new(transport, registry(), config);
    iter.open(full_range(), &[TEMPERATURE]).await.unwrap();
    iter.next(AUTO_SPAN).await.unwrap();
    iter.next(AUTO_SPAN).await.unwrap();

    let err = iter.value().await.unwrap_err();
    assert!(matches!(err, CadenceError::Contiguity(ContiguityError::NotAdjacent { .. })));
    // The accumulated frames are untouched by the failed merge.
    assert_eq!(iter.core().frames().len(), 2);
    iter.close().await.unwrap();
}

#[tokio::test]
async fn test_positional_commands_carry_arguments() {
    init_tracing();
    let (transport, listener) = duplex();
    let server = spawn_iterator_server(listener, Vec::new());

    let mut iter = CoreIterator::new(transport, IteratorConfig::default());
    iter.open(full_range(), &[TEMPERATURE]).await.unwrap();

    assert!(!iter.seek_ge(TimeStamp::seconds(5)).await.unwrap());
    assert!(!iter.seek_le(TimeStamp::seconds(7)).await.unwrap());
    assert!(!iter.prev(TimeSpan::milliseconds(250)).await.unwrap());
    assert!(!iter.seek_last().await.unwrap());
    assert!(!iter.valid().await.unwrap());
    iter.close().await.unwrap();

    let requests = server.await.unwrap();
    let commands: Vec<IteratorCommand> = requests.iter().map(|r| r.command()).collect();
    assert_eq!(
        commands,
        vec![
            IteratorCommand::Open,
            IteratorCommand::SeekGe,
            IteratorCommand::SeekLe,
            IteratorCommand::Prev,
            IteratorCommand::SeekLast,
            IteratorCommand::Valid,
        ]
    );
    assert_eq!(requests[1].stamp, TimeStamp::seconds(5).value());
    assert_eq!(requests[2].stamp, TimeStamp::seconds(7).value());
    assert_eq!(requests[3].span, TimeSpan::milliseconds(250).value());
    assert_eq!(
        requests[0].range,
        Some(full_range().into())
    );
}

#[tokio::test]
async fn test_open_with_unknown_channel_fails_before_streaming() {
    init_tracing();
    let (transport, _listener) = duplex();
    let mut iter = TypedIterator::new(transport, registry(), IteratorConfig::default());

    let err = iter
        .open(full_range(), &[TEMPERATURE, ChannelKey::new(99)])
        .await
        .unwrap_err();
    match err {
        CadenceError::Query(QueryError::ChannelsNotFound(keys)) => {
            assert_eq!(keys, vec![ChannelKey::new(99)]);
        }
        other => panic!("Expected ChannelsNotFound, got: {:?}", other),
    }
    assert!(!iter.core().is_open());
    iter.close().await.unwrap();
}
