//! Meter runtime: the single consumer that owns the ride machine.
//!
//! Producers (tick, location and motion tasks, and every [`MeterHandle`]) push events into one
//! bounded queue. [`Meter::run`] applies them one at a time, keeps sensor acquisition in step
//! with the ride phase and publishes each new state on a watch channel.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, watch};

use crate::clock::Clock;
use crate::config::MeterConfig;
use crate::error::{MeterError, MeterResult};
use crate::feed::{AcquisitionMode, SensorFeed};
use crate::ride::{RideEvent, RideMachine, RideState};
use crate::sensors::{LocationSource, MotionSource};
use crate::types::Visibility;

const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
enum Control {
    Visibility(Visibility),
    Shutdown,
}

pub struct Meter<L, M> {
    machine: RideMachine,
    feed: SensorFeed<L, M>,
    events: mpsc::Receiver<RideEvent>,
    control: mpsc::Receiver<Control>,
    state: watch::Sender<RideState>,
    mode: watch::Sender<AcquisitionMode>,
}

/// Command and query surface for a running [`Meter`].
#[derive(Clone)]
pub struct MeterHandle {
    events: mpsc::Sender<RideEvent>,
    control: mpsc::Sender<Control>,
    clock: Arc<dyn Clock>,
    state: watch::Receiver<RideState>,
    mode: watch::Receiver<AcquisitionMode>,
}

impl<L: LocationSource, M: MotionSource> Meter<L, M> {
    pub fn new(config: &MeterConfig, location: L, motion: M, clock: Arc<dyn Clock>) -> (Self, MeterHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(16);

        let machine = RideMachine::new(clock.time_zone(), config.ride.clone(), config.fare.clone());
        let (state_tx, state_rx) = watch::channel(machine.state().clone());
        let (mode_tx, mode_rx) = watch::channel(AcquisitionMode::Stopped);

        let feed = SensorFeed::new(
            location,
            motion,
            Arc::clone(&clock),
            event_tx.clone(),
            config.feed.clone(),
            config.motion.clone(),
        );

        let meter = Self {
            machine,
            feed,
            events: event_rx,
            control: control_rx,
            state: state_tx,
            mode: mode_tx,
        };
        let handle = MeterHandle {
            events: event_tx,
            control: control_tx,
            clock,
            state: state_rx,
            mode: mode_rx,
        };
        (meter, handle)
    }

    /// Runs until [`MeterHandle::shutdown`] or until every handle is dropped.
    /// Returns the final ride state.
    pub async fn run(mut self) -> MeterResult<RideState> {
        info!("Meter running (time zone {})", self.machine.initial_state().time_zone);
        loop {
            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(Control::Visibility(visibility)) => {
                        debug!("Visibility -> {:?}", visibility);
                        self.feed.set_visibility(visibility);
                        self.publish_mode();
                    }
                    Some(Control::Shutdown) | None => break,
                },

                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        self.feed.shutdown();
        self.publish_mode();
        info!("Meter shut down");
        Ok(self.machine.state().clone())
    }

    fn handle(&mut self, event: RideEvent) {
        let changed = self.machine.apply(&event);
        self.feed.sync_phase(self.machine.state().phase);
        self.publish_mode();
        if changed {
            self.state.send_replace(self.machine.state().clone());
        }
    }

    fn publish_mode(&self) {
        let mode = self.feed.mode();
        self.mode.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
    }
}

impl MeterHandle {
    pub async fn start(&self) -> MeterResult<()> {
        self.send(RideEvent::Start {
            now_ms: self.clock.now_millis(),
            time_zone: self.clock.time_zone(),
        })
        .await
    }

    pub async fn stop(&self) -> MeterResult<()> {
        self.send(RideEvent::Stop {
            now_ms: self.clock.now_millis(),
        })
        .await
    }

    pub async fn reset(&self) -> MeterResult<()> {
        self.send(RideEvent::Reset).await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> MeterResult<()> {
        self.control
            .send(Control::Visibility(visibility))
            .await
            .map_err(|_| MeterError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> MeterResult<()> {
        self.control
            .send(Control::Shutdown)
            .await
            .map_err(|_| MeterError::ChannelClosed)
    }

    /// Latest published ride state.
    pub fn snapshot(&self) -> RideState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RideState> {
        self.state.clone()
    }

    pub fn acquisition_mode(&self) -> AcquisitionMode {
        *self.mode.borrow()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<AcquisitionMode> {
        self.mode.clone()
    }

    async fn send(&self, event: RideEvent) -> MeterResult<()> {
        self.events.send(event).await.map_err(|_| MeterError::ChannelClosed)
    }
}
