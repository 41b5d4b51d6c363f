//! Shared fixtures for the integration tests: a static channel retriever and
//! scripted servers behind the in-memory transport.

#![allow(dead_code)]

use std::sync::Arc;

use cadence::channel::{ChannelDescriptor, ChannelKey, ChannelRegistry, ChannelRetriever};
use cadence::proto::{
    IteratorCommand, IteratorRequest, IteratorResponse, ResponseVariant, SegmentPayload,
    WriterRequest, WriterResponse,
};
use cadence::transport::Listener;
use cadence::{DataType, Rate, SampleBuffer, TimeStamp};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub const TEMPERATURE: ChannelKey = ChannelKey::new(1);
pub const PRESSURE: ChannelKey = ChannelKey::new(2);
pub const FLOW: ChannelKey = ChannelKey::new(3);

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retriever over a fixed list of channels.
pub struct StaticRetriever {
    channels: Vec<ChannelDescriptor>,
}

impl ChannelRetriever for StaticRetriever {
    async fn retrieve(&self, keys: &[ChannelKey]) -> cadence::Result<Vec<ChannelDescriptor>> {
        Ok(self
            .channels
            .iter()
            .filter(|c| keys.contains(&c.key))
            .cloned()
            .collect())
    }
}

/// A registry holding a 25 Hz float64 temperature channel, a 100 Hz
/// float32 pressure channel and a 3 Hz float64 flow channel.
pub fn registry() -> Arc<ChannelRegistry<StaticRetriever>> {
    Arc::new(ChannelRegistry::new(StaticRetriever {
        channels: vec![
            ChannelDescriptor::new(
                TEMPERATURE,
                "temperature",
                1,
                Rate::hz(25.0),
                DataType::Float64,
            ),
            ChannelDescriptor::new(PRESSURE, "pressure", 1, Rate::hz(100.0), DataType::Float32),
            ChannelDescriptor::new(FLOW, "flow", 1, Rate::hz(3.0), DataType::Float64),
        ],
    }))
}

/// One second of temperature samples (25 x f64) starting at `start_s` seconds.
pub fn temperature_second(start_s: i32) -> SampleBuffer {
    SampleBuffer::from(
        (0..25)
            .map(|i| f64::from(start_s * 100 + i))
            .collect::<Vec<_>>(),
    )
}

/// The wire frame for [`temperature_second`].
pub fn temperature_frame(start_s: i32) -> SegmentPayload {
    SegmentPayload {
        channel_key: TEMPERATURE.value(),
        start: TimeStamp::seconds(i64::from(start_s)).value(),
        data: temperature_second(start_s).to_bytes(),
    }
}

/// One second of pressure samples (100 x f32) starting at `start_s` seconds.
pub fn pressure_frame(start_s: i32) -> SegmentPayload {
    SegmentPayload {
        channel_key: PRESSURE.value(),
        start: TimeStamp::seconds(i64::from(start_s)).value(),
        data: SampleBuffer::from(vec![1.5f32; 100]).to_bytes(),
    }
}

/// Serves one iterator stream.
///
/// Acknowledges the open command, then answers the n-th following command
/// with `replies[n]` as one `Data` response (skipped when empty) and an `Ack`
/// that is true if any frames were sent. Returns every request received.
pub fn spawn_iterator_server(
    mut listener: Listener,
    replies: Vec<Vec<SegmentPayload>>,
) -> JoinHandle<Vec<IteratorRequest>> {
    tokio::spawn(async move {
        let mut stream = listener.accept().await.unwrap();
        let mut requests = Vec::new();
        let mut replies = replies.into_iter();
        while let Some(request) = stream.receive::<IteratorRequest>().await.unwrap() {
            let command = request.command();
            requests.push(request);
            let frames = if command == IteratorCommand::Open {
                Vec::new()
            } else {
                replies.next().unwrap_or_default()
            };
            let ack = command == IteratorCommand::Open || !frames.is_empty();
            if !frames.is_empty() {
                stream
                    .send(&IteratorResponse {
                        variant: ResponseVariant::Data as i32,
                        command: command as i32,
                        segments: frames,
                        ..Default::default()
                    })
                    .await
                    .unwrap();
            }
            stream
                .send(&IteratorResponse {
                    variant: ResponseVariant::Ack as i32,
                    ack,
                    command: command as i32,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        requests
    })
}

/// Serves one writer stream: acknowledges the open request and records every
/// request until the client half-closes. Returns the requests, open included.
pub fn spawn_writer_server(mut listener: Listener) -> JoinHandle<Vec<WriterRequest>> {
    tokio::spawn(async move {
        let mut stream = listener.accept().await.unwrap();
        let mut requests = Vec::new();
        while let Some(request) = stream.receive::<WriterRequest>().await.unwrap() {
            let opening = requests.is_empty();
            requests.push(request);
            if opening {
                stream
                    .send(&WriterResponse {
                        ack: true,
                        error: None,
                    })
                    .await
                    .unwrap();
            }
        }
        requests
    })
}
