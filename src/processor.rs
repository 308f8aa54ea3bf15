//! Event Processor
//!
//! Drives a [`PluginHost`] from an embassy channel. Producers (the bus
//! adapter, the profile layer, the attribute server) push [`Event`]s into an
//! [`EventChannel`]; one task owns the host and applies them in arrival order.
//!
//! # Usage
//!
//! ```rust,ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use nestbird::{PluginHost, processor::{self, EventChannel}};
//!
//! static EVENTS: EventChannel<CriticalSectionRawMutex, Session> = EventChannel::new();
//!
//! #[embassy_executor::task]
//! async fn bluetooth(mut host: PluginHost<Session, Server>, mut bus: Bus) -> ! {
//!     processor::run(&mut host, &mut bus, EVENTS.receiver()).await
//! }
//! ```
//!
//! # Ordering
//!
//! Events are applied one at a time and never interleave. A stop request is
//! only honoured once the queue is empty, so every event sent before the stop
//! is applied.

use crate::{
    Event, PluginHost, bus::MessageBus, constants::EVENT_QUEUE_SIZE, gatt::AttributeServer,
    transport::ProfileSession,
};
use core::{future::Future, pin::pin};
use embassy_futures::select::{Either, select};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, Receiver},
};

/// Queue feeding the processor
pub type EventChannel<M, S> = Channel<M, Event<S>, EVENT_QUEUE_SIZE>;

/// Receiving end of an [`EventChannel`]
pub type EventReceiver<'a, M, S> = Receiver<'a, M, Event<S>, EVENT_QUEUE_SIZE>;

/// Apply events forever
pub async fn run<M, S, A, B>(
    host: &mut PluginHost<S, A>,
    bus: &mut B,
    events: EventReceiver<'_, M, S>,
) -> !
where
    M: RawMutex,
    S: ProfileSession,
    A: AttributeServer,
    B: MessageBus + ?Sized,
{
    info!("[PROCESSOR] started");
    loop {
        let event = events.receive().await;
        host.process_event(bus, event);
    }
}

/// Apply events until `stop` resolves and the queue is drained
pub async fn run_until<M, S, A, B, F>(
    host: &mut PluginHost<S, A>,
    bus: &mut B,
    events: EventReceiver<'_, M, S>,
    stop: F,
) where
    M: RawMutex,
    S: ProfileSession,
    A: AttributeServer,
    B: MessageBus + ?Sized,
    F: Future,
{
    info!("[PROCESSOR] started");
    let mut stop = pin!(stop);
    loop {
        match select(events.receive(), stop.as_mut()).await {
            Either::First(event) => host.process_event(bus, event),
            Either::Second(_) => {
                let drained = drain(host, bus, events);
                info!("[PROCESSOR] stopped after draining {} events", drained);
                return;
            }
        }
    }
}

/// Apply every event already queued without waiting
///
/// Returns the number of events applied.
pub fn drain<M, S, A, B>(
    host: &mut PluginHost<S, A>,
    bus: &mut B,
    events: EventReceiver<'_, M, S>,
) -> usize
where
    M: RawMutex,
    S: ProfileSession,
    A: AttributeServer,
    B: MessageBus + ?Sized,
{
    let mut applied = 0;
    while let Ok(event) = events.try_receive() {
        host.process_event(bus, event);
        applied += 1;
    }
    if applied > 0 {
        debug!("[PROCESSOR] drained {} events", applied);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BluetoothAddress, MethodCall,
        bus::{ObjectPath, Reply, ReplyToken, mock::RecordingBus},
        gatt::server::mock::MockServer,
        transport::profile::mock::MockSession,
        uuid,
    };
    use embassy_futures::block_on;
    use embassy_sync::{blocking_mutex::raw::NoopRawMutex, signal::Signal};
    use heapless::{String, Vec};

    const DEVICE_PATH: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55";
    const TRANSPORT: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55/fd0";

    fn configured() -> Event<MockSession> {
        Event::TransportConfigured {
            device: BluetoothAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            device_path: ObjectPath::try_from(DEVICE_PATH).unwrap(),
            uuid: uuid::A2DP_SOURCE,
            codec: 0,
            configuration: Vec::new(),
            session: MockSession::streaming(3, 64, 64),
        }
    }

    fn get_properties(token: u32) -> Event<MockSession> {
        Event::MethodCall {
            client: String::try_from(":1.9").unwrap(),
            token: ReplyToken(token),
            call: MethodCall::GetProperties {
                transport: ObjectPath::try_from(TRANSPORT).unwrap(),
            },
        }
    }

    #[test]
    fn test_events_applied_in_order_before_stop() {
        let channel: EventChannel<NoopRawMutex, MockSession> = Channel::new();
        let stop: Signal<NoopRawMutex, ()> = Signal::new();
        let mut host = PluginHost::new(MockServer::default());
        let mut bus = RecordingBus::default();

        assert!(channel.try_send(get_properties(1)).is_ok());
        assert!(channel.try_send(configured()).is_ok());
        assert!(channel.try_send(get_properties(2)).is_ok());
        stop.signal(());

        block_on(run_until(&mut host, &mut bus, channel.receiver(), stop.wait()));

        assert_eq!(
            bus.reply_for(ReplyToken(1)),
            Some(&Reply::Error(crate::Error::DoesNotExist))
        );
        assert!(matches!(
            bus.reply_for(ReplyToken(2)),
            Some(Reply::Properties(_))
        ));
        assert_eq!(host.transports().len(), 1);
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn test_drain_on_empty_queue() {
        let channel: EventChannel<NoopRawMutex, MockSession> = Channel::new();
        let mut host = PluginHost::new(MockServer::default());
        let mut bus = RecordingBus::default();

        assert_eq!(drain(&mut host, &mut bus, channel.receiver()), 0);

        assert!(channel.try_send(configured()).is_ok());
        assert_eq!(drain(&mut host, &mut bus, channel.receiver()), 1);
        assert_eq!(host.transports().len(), 1);
        assert!(bus.replies.is_empty());
    }
}
