// Per-iteration job planner for the operational loop
//
// Jobs are planned fresh on every tick, in a fixed order: link work
// first, then the periodic publishes, then the reset check.
use core::fmt;

use heapless::Vec;

use super::clock::Interval;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Reconnect,
    ServiceBroker,
    ReadSensor,
    Heartbeat,
    CheckReset,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Reconnect => write!(f, "Reconnect"),
            Job::ServiceBroker => write!(f, "ServiceBroker"),
            Job::ReadSensor => write!(f, "ReadSensor"),
            Job::Heartbeat => write!(f, "Heartbeat"),
            Job::CheckReset => write!(f, "CheckReset"),
        }
    }
}

impl Job {
    /// Every job kind, in the order an iteration runs them.
    pub const ALL: [Job; 5] = [
        Job::Reconnect,
        Job::ServiceBroker,
        Job::ReadSensor,
        Job::Heartbeat,
        Job::CheckReset,
    ];
}

const JOB_KINDS: usize = Job::ALL.len();

/// One iteration's work: at most one job of each kind.
type Plan = Vec<Job, JOB_KINDS>;

// The job scheduler
pub struct Scheduler {
    planned: Plan,
    next: usize,
    sensor: Interval,
    heartbeat: Interval,
}

impl Scheduler {
    /// The sensor is due straight away; the heartbeat first fires one
    /// full period after `now`, since connecting already announced us.
    pub fn new(cfg: &Config, now: u64) -> Self {
        let mut heartbeat = Interval::new(cfg.heartbeat_interval_ms);
        heartbeat.reset(now);
        Self {
            planned: Vec::new(),
            next: 0,
            sensor: Interval::new(cfg.sensor_interval_ms),
            heartbeat,
        }
    }

    /// Plan this iteration's work, replacing whatever was left over.
    pub fn plan(&mut self, now: u64, connected: bool) {
        let sensor_due = self.sensor.is_due(now);
        let heartbeat_due = self.heartbeat.is_due(now);
        self.planned.clear();
        self.next = 0;
        for job in Job::ALL {
            let wanted = match job {
                Job::Reconnect => !connected,
                Job::ReadSensor => sensor_due,
                Job::Heartbeat => heartbeat_due,
                Job::ServiceBroker | Job::CheckReset => true,
            };
            if wanted {
                // one slot per job kind
                let _ = self.planned.push(job);
            }
        }
    }

    pub fn pop(&mut self) -> Option<Job> {
        let job = self.planned.get(self.next).copied()?;
        self.next += 1;
        Some(job)
    }

    pub fn pending(&self) -> usize {
        self.planned.len() - self.next
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Only successful reads restart the sensor period.
    pub fn sensor_read(&mut self, now: u64) {
        self.sensor.reset(now);
    }

    pub fn heartbeat_sent(&mut self, now: u64) {
        self.heartbeat.reset(now);
    }

    pub fn sensor(&self) -> &Interval {
        &self.sensor
    }

    pub fn heartbeat(&self) -> &Interval {
        &self.heartbeat
    }
}
