use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use hubwire_frame::hub_property::request_update;
use hubwire_frame::{
    GenericErrorCode, HubProperty, HubPropertyReply, HubPropertyReplyParser, MessageType,
    RawMessage, RawPortOutputCommandMessage,
};
use hubwire_messenger::{
    MessengerConfig, MessengerError, OutboundMessenger, PortCommandExecutionStatus,
    ResponseRequest,
};
use hubwire_transport::{MemoryTransport, WriteBehavior};

use PortCommandExecutionStatus::{Completed, Discarded, InProgress};

fn patient_config() -> MessengerConfig {
    MessengerConfig {
        message_send_timeout_ms: 30_000,
        ..MessengerConfig::default()
    }
}

fn setup(config: MessengerConfig) -> (Arc<MemoryTransport>, OutboundMessenger) {
    let transport = Arc::new(MemoryTransport::new());
    let messenger = OutboundMessenger::for_transport(transport.clone(), config)
        .expect("config should be valid");
    (transport, messenger)
}

fn motor_command(port: u8, power: u8) -> RawPortOutputCommandMessage {
    RawPortOutputCommandMessage::new(port, true, vec![port, 0x11, 0x51, 0x00, power])
}

/// Let spawned pumps and lane workers run without advancing time.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

fn feedback(pairs: &[(u8, u8)]) -> Vec<u8> {
    let mut packet = vec![(pairs.len() * 2 + 1) as u8, 0x00, 0x82];
    for (port, bits) in pairs {
        packet.push(*port);
        packet.push(*bits);
    }
    packet
}

fn written_ports(transport: &MemoryTransport) -> Vec<u8> {
    transport.writes().iter().map(|w| w.data[3]).collect()
}

/// Answer every hub property request with `value`.
fn answer_property_requests(transport: &Arc<MemoryTransport>, value: u8) {
    let hub = Arc::clone(transport);
    let mut written = hub.subscribe_writes();
    tokio::spawn(async move {
        while let Ok(packet) = written.recv().await {
            if packet.len() == 5 && packet[2] == 0x01 && packet[4] == 0x05 {
                hub.notify(vec![0x04, 0x00, 0x01, packet[3], 0x06, value]);
            }
        }
    });
}

#[tokio::test]
async fn same_port_serializes_other_ports_overlap() {
    let (transport, messenger) = setup(patient_config());
    let mut a = messenger.send_port_output_command(motor_command(1, 10));
    let mut b = messenger.send_port_output_command(motor_command(1, 20));
    let mut c = messenger.send_port_output_command(motor_command(2, 30));
    a.start();
    b.start();
    c.start();
    settle().await;

    assert_eq!(written_ports(&transport), vec![1, 2]);

    transport.notify(feedback(&[(1, 0x02)]));
    settle().await;
    assert_eq!(written_ports(&transport), vec![1, 2, 1]);
    assert_eq!(transport.writes()[2].data[7], 20);

    transport.notify(feedback(&[(1, 0x02), (2, 0x02)]));
    assert_eq!(a.collect().await.unwrap(), vec![Completed]);
    assert_eq!(b.collect().await.unwrap(), vec![Completed]);
    assert_eq!(c.collect().await.unwrap(), vec![Completed]);
    assert_eq!(messenger.port_ids(), vec![1, 2]);
}

#[tokio::test]
async fn discarded_then_completed_in_submission_order() {
    let (transport, messenger) = setup(patient_config());
    let mut a = messenger.send_port_output_command(motor_command(0, 50));
    let mut b = messenger.send_port_output_command(motor_command(0, 60));
    a.start();
    b.start();
    settle().await;
    assert_eq!(transport.write_count(), 1);

    // Discard plus in-progress: only the discard applies; B is not yet written.
    transport.notify(feedback(&[(0, 0x04 | 0x01)]));
    assert_eq!(a.collect().await.unwrap(), vec![Discarded]);

    settle().await;
    assert_eq!(transport.write_count(), 2);
    transport.notify(feedback(&[(0, 0x02)]));
    assert_eq!(b.collect().await.unwrap(), vec![Completed]);
}

#[tokio::test]
async fn in_progress_is_reported_before_completion() {
    let (transport, messenger) = setup(patient_config());
    let mut result = messenger.send_port_output_command(motor_command(3, 40));
    result.start();
    settle().await;

    transport.notify(feedback(&[(3, 0x01)]));
    settle().await;
    transport.notify(feedback(&[(3, 0x02)]));
    assert_eq!(result.collect().await.unwrap(), vec![InProgress, Completed]);
}

#[tokio::test]
async fn busy_or_full_completes_every_registered_command() {
    let (transport, messenger) = setup(patient_config());
    let mut results: Vec<_> = (0..3)
        .map(|i| messenger.send_port_output_command(motor_command(4, i)))
        .collect();
    for result in &mut results {
        result.start();
    }
    settle().await;
    assert_eq!(transport.write_count(), 1);
    assert_eq!(messenger.port_lane(4).unwrap().tracked_commands(4), 3);

    transport.notify(feedback(&[(4, 0x10)]));
    for result in results {
        assert_eq!(result.collect().await.unwrap(), vec![Completed]);
    }
    settle().await;
    assert_eq!(transport.write_count(), 1);
    assert!(messenger.port_lane(4).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_retries_follow_doubling_backoff() {
    let (transport, messenger) = setup(MessengerConfig {
        message_send_timeout_ms: 100,
        max_message_send_attempts: 3,
        initial_message_send_retry_delay_ms: 20,
        ..MessengerConfig::default()
    });

    let result = messenger.send_port_output_command(motor_command(1, 70));
    let err = result.last().await.unwrap_err();
    assert!(err.is_timeout());

    let writes = transport.writes();
    assert_eq!(writes.len(), 4);
    let gaps: Vec<Duration> = writes
        .windows(2)
        .map(|pair| pair[1].started_at - pair[0].started_at)
        .collect();
    let backoff: Vec<Duration> = gaps
        .iter()
        .map(|gap| *gap - Duration::from_millis(100))
        .collect();
    assert_eq!(
        backoff,
        vec![
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(80)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn write_failure_propagates_without_retry() {
    let (transport, messenger) = setup(MessengerConfig {
        max_message_send_attempts: 5,
        ..MessengerConfig::default()
    });
    transport.push_behavior(WriteBehavior::Fail("att error 0x0e".to_string()));

    let first = messenger.send_without_response(RawMessage::new(MessageType::HubActions, vec![0x30]));
    assert!(matches!(
        first.last().await,
        Err(MessengerError::Transport(_))
    ));
    assert_eq!(transport.write_count(), 1);

    let second = messenger.send_without_response(RawMessage::new(MessageType::HubActions, vec![0x30]));
    assert_eq!(second.last().await.unwrap(), Some(()));
    assert_eq!(transport.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn generic_error_fails_without_retry() {
    let (transport, messenger) = setup(MessengerConfig::default());
    let hub = Arc::clone(&transport);
    let mut written = hub.subscribe_writes();
    tokio::spawn(async move {
        while written.recv().await.is_ok() {
            hub.notify(vec![0x03, 0x00, 0x05, 0x81, 0x06]);
        }
    });

    let result = messenger.send_port_output_command(motor_command(2, 10));
    match result.last().await {
        Err(MessengerError::Protocol(rejection)) => {
            assert_eq!(rejection.command_type, MessageType::PortOutputCommand);
            assert_eq!(rejection.code, GenericErrorCode::InvalidUse);
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(transport.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn completion_during_backoff_is_not_rewritten() {
    let (transport, messenger) = setup(MessengerConfig {
        message_send_timeout_ms: 100,
        max_message_send_attempts: 3,
        initial_message_send_retry_delay_ms: 50,
        ..MessengerConfig::default()
    });
    let mut first = messenger.send_port_output_command(motor_command(1, 30));
    first.start();

    // Timed out at 100ms, next write due at 150ms.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(transport.write_count(), 1);
    transport.notify(feedback(&[(1, 0x02)]));
    assert_eq!(first.collect().await.unwrap(), vec![Completed]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.write_count(), 1);

    let mut second = messenger.send_port_output_command(motor_command(1, 40));
    second.start();
    settle().await;
    assert_eq!(transport.write_count(), 2);
    assert_eq!(transport.writes()[1].data[7], 40);
    transport.notify(feedback(&[(1, 0x02)]));
    assert_eq!(second.collect().await.unwrap(), vec![Completed]);
}

#[tokio::test(start_paused = true)]
async fn generic_error_on_retry_fails_without_further_attempts() {
    let (transport, messenger) = setup(MessengerConfig {
        message_send_timeout_ms: 100,
        max_message_send_attempts: 3,
        initial_message_send_retry_delay_ms: 50,
        ..MessengerConfig::default()
    });
    let replies = messenger.dispatcher().replies(HubPropertyReplyParser);
    let mut result = messenger.send_with_response(vec![ResponseRequest::new(
        request_update(HubProperty::BatteryVoltage),
        replies,
    )]);
    result.start();

    tokio::time::sleep(Duration::from_millis(180)).await;
    assert_eq!(transport.write_count(), 2);
    transport.notify(vec![0x03, 0x00, 0x05, 0x01, 0x06]);

    match result.last().await {
        Err(MessengerError::Protocol(rejection)) => {
            assert_eq!(rejection.command_type, MessageType::HubProperties);
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.write_count(), 2);
}

#[tokio::test]
async fn generic_error_matches_same_type_on_every_lane() {
    let (transport, messenger) = setup(patient_config());
    let mut left = messenger.send_port_output_command(motor_command(1, 10));
    let mut right = messenger.send_port_output_command(motor_command(2, 10));
    left.start();
    right.start();
    settle().await;
    assert_eq!(transport.write_count(), 2);

    // One rejection, no task identity: both in-flight port commands fail.
    transport.notify(vec![0x03, 0x00, 0x05, 0x81, 0x06]);
    assert!(matches!(left.last().await, Err(MessengerError::Protocol(_))));
    assert!(matches!(right.last().await, Err(MessengerError::Protocol(_))));
}

#[tokio::test]
async fn dispose_completes_pending_commands_without_value() {
    let (transport, messenger) = setup(patient_config());
    transport.push_behavior(WriteBehavior::Stall);

    let mut results: Vec<_> = (0..3)
        .map(|i| messenger.send_port_output_command(motor_command(5, i)))
        .collect();
    for result in &mut results {
        result.start();
    }
    settle().await;

    messenger.dispose();
    for result in results {
        assert_eq!(result.collect().await.unwrap(), Vec::new());
    }
    assert!(messenger.port_lane(5).is_none());
    assert!(matches!(
        messenger
            .send_port_output_command(motor_command(5, 1))
            .last()
            .await,
        Err(MessengerError::Disposed)
    ));
}

#[tokio::test]
async fn nothing_is_sent_until_first_poll() {
    let (transport, messenger) = setup(patient_config());
    let untouched = messenger.send_without_response(RawMessage::new(MessageType::HubActions, vec![0x01]));
    settle().await;
    drop(untouched);
    settle().await;
    assert_eq!(transport.write_count(), 0);

    let mut polled = messenger.send_without_response(RawMessage::new(MessageType::HubActions, vec![0x02]));
    let first = std::future::poll_fn(|cx| Pin::new(&mut polled).poll_next(cx)).await;
    assert!(matches!(first, Some(Ok(()))));
    assert_eq!(transport.write_count(), 1);
}

#[tokio::test]
async fn request_sequence_returns_last_reply() {
    let (transport, messenger) = setup(patient_config());
    answer_property_requests(&transport, 0x64);

    let replies = messenger.dispatcher().replies(HubPropertyReplyParser);
    let for_property = |property: HubProperty| {
        ResponseRequest::new(
            request_update(property),
            replies.matching(move |reply: &HubPropertyReply| reply.property == property),
        )
    };
    let result = messenger.send_with_response(vec![
        for_property(HubProperty::Button),
        for_property(HubProperty::BatteryVoltage),
    ]);

    let reply = result.last().await.unwrap().expect("last reply");
    assert_eq!(reply.property, HubProperty::BatteryVoltage);
    assert_eq!(reply.value.as_ref(), &[0x64]);

    let requested: Vec<u8> = transport.writes().iter().map(|w| w.data[3]).collect();
    assert_eq!(
        requested,
        vec![HubProperty::Button as u8, HubProperty::BatteryVoltage as u8]
    );
}

#[tokio::test]
async fn disconnect_ends_waiting_request() {
    let (transport, messenger) = setup(patient_config());
    let replies = messenger.dispatcher().replies(HubPropertyReplyParser);
    let mut result =
        messenger.send_with_response(vec![ResponseRequest::new(request_update(HubProperty::Rssi), replies)]);
    result.start();
    settle().await;
    assert_eq!(transport.write_count(), 1);

    transport.disconnect();
    assert!(matches!(result.last().await, Err(MessengerError::Disconnected)));
}
