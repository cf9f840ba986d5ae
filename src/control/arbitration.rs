//! Priority arbitration of channel controllers
//!
//! Every cycle starts from a fresh neutral `ChannelVector`. Controllers are
//! polled in ascending priority order under their own lock; the values of a
//! higher priority overwrite those of a lower one on shared channels.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::common::{
    ChannelController, ChannelVector, FeedbackSource, FeedbackValue, FlightLink, NavigationError,
    NavigationResult, CHANNEL_COUNT,
};

/// Shared handle to a controller; the mutex is the controller's own lock
pub type ControllerHandle = Arc<Mutex<dyn ChannelController>>;

/// How the arbiter acquires a controller's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Wait for the lock
    #[default]
    Blocking,
    /// Skip the controller for this cycle when the lock is held
    NonBlocking,
}

/// Receives faults isolated by the arbitration loop
pub trait FaultReporter: Send + Sync {
    fn report(&self, fault: &NavigationError);
}

/// Logs faults at error level
#[derive(Debug, Default)]
pub struct LogFaultReporter;

impl FaultReporter for LogFaultReporter {
    fn report(&self, fault: &NavigationError) {
        error!(%fault, "controller fault isolated");
    }
}

/// Everything the arbiter needs to poll one controller
pub struct ControllerRegistration {
    priority: i32,
    controller: ControllerHandle,
    channels: Vec<usize>,
    lock_policy: LockPolicy,
    feedback: Vec<Arc<dyn FeedbackSource>>,
}

impl ControllerRegistration {
    pub fn new(priority: i32, controller: ControllerHandle, channels: Vec<usize>) -> Self {
        ControllerRegistration {
            priority,
            controller,
            channels,
            lock_policy: LockPolicy::default(),
            feedback: Vec::new(),
        }
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Add a source read before every poll; the values reach the controller
    /// through `ChannelController::set_feedback`, in registration order
    pub fn feedback_source(mut self, source: Arc<dyn FeedbackSource>) -> Self {
        self.feedback.push(source);
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn requires_feedback(&self) -> bool {
        !self.feedback.is_empty()
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    fn validate(&self) -> NavigationResult<()> {
        if self.channels.is_empty() {
            return Err(NavigationError::InvalidParameter(format!(
                "controller at priority {} drives no channel",
                self.priority
            )));
        }
        if let Some(channel) = self.channels.iter().find(|c| **c >= CHANNEL_COUNT) {
            return Err(NavigationError::InvalidParameter(format!(
                "channel index {} outside the {} channel vector",
                channel, CHANNEL_COUNT
            )));
        }
        let mut sorted = self.channels.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.channels.len() {
            return Err(NavigationError::InvalidParameter(format!(
                "controller at priority {} lists a channel twice",
                self.priority
            )));
        }
        Ok(())
    }
}

struct Entry {
    registration: ControllerRegistration,
    last_values: Option<Vec<u16>>,
}

pub struct ControllerArbiter {
    controllers: BTreeMap<i32, Entry>,
    reporter: Arc<dyn FaultReporter>,
    last_faults: Vec<NavigationError>,
    cycle_period: Option<Duration>,
}

impl Default for ControllerArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerArbiter {
    pub fn new() -> Self {
        ControllerArbiter {
            controllers: BTreeMap::new(),
            reporter: Arc::new(LogFaultReporter),
            last_faults: Vec::new(),
            cycle_period: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Pause between two cycles of `run`
    pub fn with_cycle_period(mut self, period: Duration) -> Self {
        self.cycle_period = Some(period);
        self
    }

    /// Register a controller. A registration at an existing priority
    /// replaces the previous one.
    pub fn register(&mut self, registration: ControllerRegistration) -> NavigationResult<()> {
        registration.validate()?;
        let priority = registration.priority;
        let name = registration.controller.lock().name().to_string();

        if let Some(previous) = self.controllers.get(&priority) {
            let previous_name = previous.registration.controller.lock().name().to_string();
            warn!(priority, previous = %previous_name, replacement = %name, "controller overwritten");
        }
        debug!(priority, controller = %name, channels = ?registration.channels, "controller registered");

        self.controllers.insert(
            priority,
            Entry {
                registration,
                last_values: None,
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, priority: i32) -> Option<ControllerRegistration> {
        self.controllers.remove(&priority).map(|entry| entry.registration)
    }

    pub fn priorities(&self) -> Vec<i32> {
        self.controllers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Faults isolated during the last `compute_channels`
    pub fn last_faults(&self) -> &[NavigationError] {
        &self.last_faults
    }

    /// Feedback, then channel values, of one locked controller
    fn poll(controller: &mut dyn ChannelController, registration: &ControllerRegistration) -> NavigationResult<Vec<u16>> {
        if registration.requires_feedback() {
            let feedback = registration
                .feedback
                .iter()
                .map(|source| source.read())
                .collect::<NavigationResult<Vec<FeedbackValue>>>()?;
            controller.set_feedback(&feedback)?;
        }

        let values = controller.channels()?;
        if values.len() != registration.channels.len() {
            return Err(NavigationError::InvalidInput(format!(
                "{} returned {} values for {} channels",
                controller.name(),
                values.len(),
                registration.channels.len()
            )));
        }
        Ok(values)
    }

    /// `poll`, with a panic inside the controller turned into an error
    fn poll_isolated(
        controller: &mut dyn ChannelController,
        registration: &ControllerRegistration,
    ) -> NavigationResult<Vec<u16>> {
        panic::catch_unwind(AssertUnwindSafe(|| Self::poll(controller, registration)))
            .unwrap_or_else(|payload| Err(NavigationError::NumericalError(panic_message(payload.as_ref()))))
    }

    fn write(channels: &mut ChannelVector, indices: &[usize], values: &[u16]) {
        for (index, value) in indices.iter().zip(values.iter()) {
            channels[*index] = *value;
        }
    }

    /// Merge every available controller into one channel vector.
    ///
    /// A failing or panicking controller does not abort the cycle: its
    /// previous values are reused (if any) and the fault goes to the reporter.
    pub fn compute_channels(&mut self) -> ChannelVector {
        let mut channels = ChannelVector::default();
        let mut faults = Vec::new();

        for (&priority, entry) in self.controllers.iter_mut() {
            let handle = Arc::clone(&entry.registration.controller);
            let mut controller = match entry.registration.lock_policy {
                LockPolicy::Blocking => handle.lock(),
                LockPolicy::NonBlocking => match handle.try_lock() {
                    Some(guard) => guard,
                    None => {
                        debug!(priority, "controller busy, skipped this cycle");
                        continue;
                    }
                },
            };

            if !controller.is_available() {
                continue;
            }

            match Self::poll_isolated(&mut *controller, &entry.registration) {
                Ok(values) => {
                    Self::write(&mut channels, &entry.registration.channels, &values);
                    entry.last_values = Some(values);
                }
                Err(reason) => {
                    let fault = NavigationError::ControllerFault {
                        priority,
                        reason: reason.to_string(),
                    };
                    self.reporter.report(&fault);
                    faults.push(fault);
                    if let Some(previous) = &entry.last_values {
                        Self::write(&mut channels, &entry.registration.channels, previous);
                    }
                }
            }
        }

        self.last_faults = faults;
        channels
    }

    /// Compute and send channel vectors until the link closes or
    /// `max_cycles` is reached. Returns the number of cycles sent.
    pub fn run<L: FlightLink>(&mut self, link: &mut L, max_cycles: Option<usize>) -> NavigationResult<usize> {
        if !link.is_open() {
            return Err(NavigationError::LinkUnavailable(
                "can not establish communication with the agent".to_string(),
            ));
        }
        info!(controllers = self.len(), "arbitration loop started");

        let mut cycles = 0;
        while link.is_open() && max_cycles.map_or(true, |max| cycles < max) {
            let channels = self.compute_channels();
            link.send_channels(&channels)?;
            cycles += 1;
            if let Some(period) = self.cycle_period {
                std::thread::sleep(period);
            }
        }

        info!(cycles, "arbitration loop stopped");
        Ok(cycles)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("controller panicked: {}", detail)
}
