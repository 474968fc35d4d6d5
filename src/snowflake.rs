use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// 2025-01-01T00:00:00Z in milliseconds since the Unix epoch.
pub const CUSTOM_EPOCH_MS: u64 = 1_735_689_600_000;

const PARTITION_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;
const PARTITION_MASK: u64 = (1 << PARTITION_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const MACHINE_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + PARTITION_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + 2 * PARTITION_BITS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("Clock moved backwards: last issued at {last_ms}ms, clock reads {now_ms}ms")]
    ClockRegression { last_ms: u64, now_ms: u64 },
    #[error("Clock reads {now_ms}ms, earlier than the custom epoch")]
    BeforeEpoch { now_ms: u64 },
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

struct State {
    last_ms: Option<u64>,
    sequence: u64,
}

/// Twitter-style 64-bit ids: sign(1) | timestamp(41) | datacenter(5) | machine(5) | sequence(12).
///
/// State is behind a mutex so one generator can be shared across tasks.
pub struct SnowflakeGenerator<C: Clock = SystemClock> {
    clock: C,
    datacenter_id: u64,
    machine_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator<SystemClock> {
    pub fn new(datacenter_id: u8, machine_id: u8) -> Self {
        Self::with_clock(SystemClock, datacenter_id, machine_id)
    }
}

impl<C: Clock> SnowflakeGenerator<C> {
    /// Partition ids are masked to their 5-bit fields.
    pub fn with_clock(clock: C, datacenter_id: u8, machine_id: u8) -> Self {
        Self {
            clock,
            datacenter_id: u64::from(datacenter_id) & PARTITION_MASK,
            machine_id: u64::from(machine_id) & PARTITION_MASK,
            state: Mutex::new(State {
                last_ms: None,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> Result<i64, SnowflakeError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now_ms = self.clock.now_millis();

        match state.last_ms {
            Some(last_ms) if now_ms < last_ms => {
                return Err(SnowflakeError::ClockRegression { last_ms, now_ms });
            }
            Some(last_ms) if now_ms == last_ms => {
                state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
                if state.sequence == 0 {
                    // Sequence exhausted for this millisecond
                    while now_ms <= last_ms {
                        std::hint::spin_loop();
                        now_ms = self.clock.now_millis();
                    }
                }
            }
            _ => state.sequence = 0,
        }

        let elapsed = now_ms
            .checked_sub(CUSTOM_EPOCH_MS)
            .ok_or(SnowflakeError::BeforeEpoch { now_ms })?;
        state.last_ms = Some(now_ms);

        let id = (elapsed << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_SHIFT)
            | (self.machine_id << MACHINE_SHIFT)
            | state.sequence;
        Ok(id as i64)
    }
}

/// Milliseconds since the Unix epoch encoded in an id.
pub fn timestamp_of(id: i64) -> u64 {
    ((id as u64) >> TIMESTAMP_SHIFT) + CUSTOM_EPOCH_MS
}
