//! Actor that owns the `DrivingMonitor`.
//!
//! API calls, permission signals and sensor samples all arrive over mpsc
//! channels and are applied one at a time by a single tokio task. Timer
//! deadlines are slept on in the same `select!`, so a firing can never race
//! a cancellation. Overdue timers are fired before any command or sample is
//! applied, so a late wakeup cannot reorder them.
//!
//! Snapshots go out on a watch channel after every command. Samples and timer
//! wakes publish only when the trip state, score, event log or speeds moved;
//! diagnostics counters catch up with the next publish.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::error::{MonitorError, MonitorResult};
use crate::events::EventKind;
use crate::monitor::DrivingMonitor;
use crate::profile::UserProfile;
use crate::samples::PermissionKind;
use crate::sensors::SensorEvent;
use crate::snapshot::MonitorSnapshot;
use crate::trip::TripState;

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    StartTrip(Reply<MonitorResult<()>>),
    PauseTrip(Reply<MonitorResult<()>>),
    ResumeTrip(Reply<MonitorResult<()>>),
    StopTrip(Reply<MonitorResult<()>>),
    ResetTrip(Reply<()>),
    SetSpeedLimit(f64, Reply<MonitorResult<()>>),
    UpdateProfile(UserProfile),
    PermissionChanged(PermissionKind, bool),
    RecordEvent {
        kind: EventKind,
        points: i32,
        magnitude: Option<f64>,
        duration: Option<f64>,
        reply: Reply<bool>,
    },
    Sample(SensorEvent),
    Shutdown,
}

/// Cloneable front end to the monitor task.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<MonitorSnapshot>,
}

impl MonitorHandle {
    pub async fn start_trip(&self) -> MonitorResult<()> {
        self.request(Command::StartTrip).await?
    }

    pub async fn pause_trip(&self) -> MonitorResult<()> {
        self.request(Command::PauseTrip).await?
    }

    pub async fn resume_trip(&self) -> MonitorResult<()> {
        self.request(Command::ResumeTrip).await?
    }

    pub async fn stop_trip(&self) -> MonitorResult<()> {
        self.request(Command::StopTrip).await?
    }

    pub async fn reset_current_trip_data_and_score(&self) -> MonitorResult<()> {
        self.request(Command::ResetTrip).await
    }

    pub async fn set_speed_limit(&self, limit: f64) -> MonitorResult<()> {
        self.request(|reply| Command::SetSpeedLimit(limit, reply))
            .await?
    }

    pub async fn update_profile(&self, profile: UserProfile) -> MonitorResult<()> {
        self.send(Command::UpdateProfile(profile)).await
    }

    pub async fn permission_changed(&self, kind: PermissionKind, granted: bool) -> MonitorResult<()> {
        self.send(Command::PermissionChanged(kind, granted)).await
    }

    pub async fn record_event(
        &self,
        kind: EventKind,
        points: i32,
        magnitude: Option<f64>,
        duration: Option<f64>,
    ) -> MonitorResult<bool> {
        self.request(|reply| Command::RecordEvent {
            kind,
            points,
            magnitude,
            duration,
            reply,
        })
        .await
    }

    /// Inject a sample next to the sensor feed.
    pub async fn push_sample(&self, event: SensorEvent) -> MonitorResult<()> {
        self.send(Command::Sample(event)).await
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.status.clone()
    }

    /// Ask the task to exit. The join handle from `spawn_monitor` yields the
    /// monitor back.
    pub async fn shutdown(&self) -> MonitorResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> MonitorResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::ShutDown)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> MonitorResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| MonitorError::ShutDown)
    }
}

/// The parts of a snapshot that samples and timers can change.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StatusKey {
    state: TripState,
    score: u8,
    events: usize,
    current_speed: f64,
    speed_limit: f64,
}

impl StatusKey {
    fn of(monitor: &DrivingMonitor) -> Self {
        Self {
            state: monitor.state(),
            score: monitor.score().value(),
            events: monitor.events().len(),
            current_speed: monitor.current_speed(),
            speed_limit: monitor.speed_limit(),
        }
    }
}

fn timer_wait(monitor: &DrivingMonitor) -> Option<Duration> {
    monitor.next_timer_deadline().map(|deadline| {
        Duration::try_from_secs_f64((deadline - monitor.now()).max(0.0)).unwrap_or(Duration::MAX)
    })
}

fn catch_up(monitor: &mut DrivingMonitor) {
    let now = monitor.now();
    let fired = monitor.fire_due_timers(now);
    if fired > 0 {
        log::debug!("Fired {} overdue timer(s) before next input", fired);
    }
}

/// Move `monitor` into its own task. `samples` is the receiving end of the
/// channel handed to the sensor hub.
pub fn spawn_monitor(
    monitor: DrivingMonitor,
    samples: mpsc::Receiver<SensorEvent>,
) -> (MonitorHandle, JoinHandle<DrivingMonitor>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(monitor.snapshot());

    let task = tokio::spawn(run(monitor, commands_rx, samples, status_tx));
    let handle = MonitorHandle {
        commands: commands_tx,
        status: status_rx,
    };
    (handle, task)
}

async fn run(
    mut monitor: DrivingMonitor,
    mut commands: mpsc::Receiver<Command>,
    mut samples: mpsc::Receiver<SensorEvent>,
    status: watch::Sender<MonitorSnapshot>,
) -> DrivingMonitor {
    let mut samples_open = true;
    let mut published = StatusKey::of(&monitor);

    loop {
        let wait = timer_wait(&monitor);

        let replied = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => {
                    catch_up(&mut monitor);
                    apply(&mut monitor, command, &status)
                }
            },
            sample = samples.recv(), if samples_open => {
                match sample {
                    Some(event) => {
                        catch_up(&mut monitor);
                        monitor.on_sensor_event(event);
                    }
                    None => {
                        log::debug!("Sensor channel closed");
                        samples_open = false;
                    }
                }
                false
            },
            _ = sleep(wait.unwrap_or_default()), if wait.is_some() => {
                catch_up(&mut monitor);
                false
            }
        };

        let key = StatusKey::of(&monitor);
        if replied {
            published = key;
        } else if key != published {
            status.send_replace(monitor.snapshot());
            published = key;
        }
    }

    log::info!("Monitor task exiting");
    monitor
}

/// Returns true once the command has already published its snapshot.
fn apply(
    monitor: &mut DrivingMonitor,
    command: Command,
    status: &watch::Sender<MonitorSnapshot>,
) -> bool {
    match command {
        Command::StartTrip(reply) => respond(monitor, status, reply, DrivingMonitor::start_trip),
        Command::PauseTrip(reply) => respond(monitor, status, reply, DrivingMonitor::pause_trip),
        Command::ResumeTrip(reply) => respond(monitor, status, reply, DrivingMonitor::resume_trip),
        Command::StopTrip(reply) => respond(monitor, status, reply, DrivingMonitor::stop_trip),
        Command::ResetTrip(reply) => respond(
            monitor,
            status,
            reply,
            DrivingMonitor::reset_current_trip_data_and_score,
        ),
        Command::SetSpeedLimit(limit, reply) => {
            respond(monitor, status, reply, |m| m.set_speed_limit(limit))
        }
        Command::UpdateProfile(profile) => {
            monitor.update_profile(profile);
            status.send_replace(monitor.snapshot());
        }
        Command::PermissionChanged(kind, granted) => {
            monitor.on_permission_changed(kind, granted);
            status.send_replace(monitor.snapshot());
        }
        Command::RecordEvent {
            kind,
            points,
            magnitude,
            duration,
            reply,
        } => respond(monitor, status, reply, |m| {
            m.record_event(kind, points, magnitude, duration)
        }),
        Command::Sample(event) => {
            monitor.on_sensor_event(event);
            return false;
        }
        Command::Shutdown => return false,
    }
    true
}

/// Publish before replying, so a caller sees its own change in the snapshot.
fn respond<T>(
    monitor: &mut DrivingMonitor,
    status: &watch::Sender<MonitorSnapshot>,
    reply: Reply<T>,
    op: impl FnOnce(&mut DrivingMonitor) -> T,
) {
    let result = op(monitor);
    status.send_replace(monitor.snapshot());
    // Receiver gone means the caller stopped waiting
    let _ = reply.send(result);
}
