//! Identifier primitive: clock/node based creation and name-based derivation.

use crate::errors::*;
use crate::id::UniqueId;
use crate::state::{PersistedClock, StateStore, ThreadMode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

/// 100ns intervals between 1582-10-15 and 1970-01-01.
const GREGORIAN_OFFSET_TICKS: u64 = 0x01B2_1DD2_1381_4000;

const CLOCK_SEQ_MASK: u16 = 0x3FFF;

/// Raw identifier operations consumed by [`crate::UniqueIdGenerator`].
pub trait IdPrimitive: Send + Sync {
    /// Load (or create) clock state from `store` and keep it for `create`.
    fn init(&self, store: Box<dyn StateStore>, mode: ThreadMode) -> Result<()>;

    /// Produce a new time/node based identifier, persisting the clock first.
    fn create(&self) -> Result<UniqueId>;

    /// Deterministically derive an identifier from `base` and `name`.
    fn create_from_name(&self, base: &UniqueId, name: &[u8]) -> UniqueId;

    /// Drop the clock state and release the store.
    fn cleanup(&self);
}

struct ClockSession {
    store: Box<dyn StateStore>,
    clock: PersistedClock,
}

impl ClockSession {
    fn next_id(&mut self, now: u64) -> Result<UniqueId> {
        let ticks = if now > self.clock.last_ticks {
            now
        } else {
            self.clock.last_ticks + 1
        };

        let next = PersistedClock {
            last_ticks: ticks,
            ..self.clock.clone()
        };
        self.store.save(&next)?;
        self.clock = next;

        Ok(encode_time_id(ticks, self.clock.clock_seq, &self.clock.node))
    }
}

/// RFC 4122 primitive: version 1 ids for `create`, version 5 for names.
///
/// In multi-threaded mode `create` serializes on an internal mutex. In
/// single-threaded mode the caller promises serialized access and an
/// overlapping call fails instead of waiting.
#[derive(Default)]
pub struct UuidPrimitive {
    session: Mutex<Option<ClockSession>>,
    multi_threaded: AtomicBool,
}

impl UuidPrimitive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdPrimitive for UuidPrimitive {
    fn init(&self, store: Box<dyn StateStore>, mode: ThreadMode) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(UniqueIdError::system("primitive already initialized"));
        }

        let now = now_ticks()?;
        let clock = match store.load()? {
            Some(mut clock) => {
                if clock.last_ticks >= now {
                    // Clock went backwards since the state was written.
                    clock.clock_seq = clock.clock_seq.wrapping_add(1) & CLOCK_SEQ_MASK;
                    info!(
                        "clock regression detected for {}, advancing clock sequence",
                        store.describe()
                    );
                }
                clock
            }
            None => fresh_clock(),
        };
        store.save(&clock)?;
        debug!(
            "uniqueid clock state loaded from {} (clock_seq {:#06x})",
            store.describe(),
            clock.clock_seq
        );

        *session = Some(ClockSession { store, clock });
        self.multi_threaded
            .store(mode == ThreadMode::MultiThreaded, Ordering::Release);
        Ok(())
    }

    fn create(&self) -> Result<UniqueId> {
        let mut session = if self.multi_threaded.load(Ordering::Acquire) {
            self.session.lock()
        } else {
            self.session.try_lock().ok_or_else(|| {
                UniqueIdError::system("concurrent call on a single-threaded generator")
            })?
        };
        let session = session
            .as_mut()
            .ok_or_else(|| UniqueIdError::system("primitive not initialized"))?;
        session.next_id(now_ticks()?)
    }

    fn create_from_name(&self, base: &UniqueId, name: &[u8]) -> UniqueId {
        let namespace = Uuid::from_bytes(*base.as_bytes());
        UniqueId::from_bytes(*Uuid::new_v5(&namespace, name).as_bytes())
    }

    fn cleanup(&self) {
        self.session.lock().take();
    }
}

fn fresh_clock() -> PersistedClock {
    let mut node: [u8; 6] = rand::random();
    // Random node ids carry the multicast bit so they never collide with a MAC.
    node[0] |= 0x01;
    PersistedClock {
        last_ticks: 0,
        clock_seq: rand::random::<u16>() & CLOCK_SEQ_MASK,
        node,
    }
}

fn now_ticks() -> Result<u64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| UniqueIdError::system(format!("system clock before 1970: {e}")))?;
    Ok((since_epoch.as_nanos() / 100) as u64 + GREGORIAN_OFFSET_TICKS)
}

fn encode_time_id(ticks: u64, clock_seq: u16, node: &[u8; 6]) -> UniqueId {
    let time_low = (ticks & 0xFFFF_FFFF) as u32;
    let time_mid = ((ticks >> 32) & 0xFFFF) as u16;
    let time_hi_and_version = ((ticks >> 48) & 0x0FFF) as u16 | (1 << 12);
    let tail = [
        ((clock_seq >> 8) & 0x3F) as u8 | 0x80,
        (clock_seq & 0xFF) as u8,
        node[0],
        node[1],
        node[2],
        node[3],
        node[4],
        node[5],
    ];
    UniqueId::from_bytes(
        *Uuid::from_fields(time_low, time_mid, time_hi_and_version, &tail).as_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FileStateStore;
    use std::io;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Store whose writes can be switched off, keeping the last good state.
    #[derive(Default)]
    struct SwitchableStore {
        saved: Arc<Mutex<Option<PersistedClock>>>,
        reject_writes: Arc<AtomicBool>,
    }

    impl StateStore for SwitchableStore {
        fn load(&self) -> Result<Option<PersistedClock>> {
            Ok(self.saved.lock().clone())
        }

        fn save(&self, state: &PersistedClock) -> Result<()> {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(io::Error::other("read-only state").into());
            }
            *self.saved.lock() = Some(state.clone());
            Ok(())
        }

        fn describe(&self) -> String {
            "switchable".to_string()
        }
    }

    #[test]
    fn time_ids_carry_version_and_variant() {
        let id = encode_time_id(0x0123_4567_89AB_CDEF, 0x2345, &[1, 2, 3, 4, 5, 6]);
        let uuid = Uuid::from_bytes(*id.as_bytes());
        assert_eq!(id.version(), 1);
        assert_eq!(uuid.get_variant(), uuid::Variant::RFC4122);
        assert_eq!(&id.as_bytes()[10..], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(id.as_bytes()[8] & 0x3F, 0x23);
        assert_eq!(id.as_bytes()[9], 0x45);
    }

    #[test]
    fn ticks_never_go_backwards_within_a_session() {
        let dir = tempdir().unwrap();
        let mut session = ClockSession {
            store: Box::new(FileStateStore::open(dir.path()).unwrap()),
            clock: PersistedClock {
                last_ticks: 1_000,
                clock_seq: 7,
                node: [1; 6],
            },
        };

        let a = session.next_id(500).unwrap();
        let b = session.next_id(500).unwrap();
        assert_ne!(a, b);
        assert_eq!(session.clock.last_ticks, 1_002);

        session.next_id(5_000).unwrap();
        assert_eq!(session.clock.last_ticks, 5_000);
        assert_eq!(session.store.load().unwrap(), Some(session.clock.clone()));
    }

    #[test]
    fn init_advances_clock_sequence_on_regression() {
        let dir = tempdir().unwrap();
        let future = PersistedClock {
            last_ticks: u64::MAX / 2,
            clock_seq: CLOCK_SEQ_MASK,
            node: [3; 6],
        };
        FileStateStore::open(dir.path())
            .unwrap()
            .save(&future)
            .unwrap();

        let primitive = UuidPrimitive::new();
        primitive
            .init(
                Box::new(FileStateStore::open(dir.path()).unwrap()),
                ThreadMode::SingleThreaded,
            )
            .unwrap();
        let id = primitive.create().unwrap();
        // Sequence wrapped from 0x3FFF to 0.
        assert_eq!(id.as_bytes()[8] & 0x3F, 0);
        assert_eq!(id.as_bytes()[9], 0);
        assert_eq!(&id.as_bytes()[10..], &[3; 6]);
    }

    #[test]
    fn fresh_nodes_are_multicast() {
        for _ in 0..16 {
            assert_eq!(fresh_clock().node[0] & 0x01, 0x01);
            assert!(fresh_clock().clock_seq <= CLOCK_SEQ_MASK);
        }
    }

    #[test]
    fn name_ids_are_version_five() {
        let primitive = UuidPrimitive::new();
        let id = primitive.create_from_name(&UniqueId::NIL, b"uid=a,dc=example");
        assert_eq!(id.version(), 5);
        assert_eq!(
            id,
            primitive.create_from_name(&UniqueId::NIL, b"uid=a,dc=example")
        );
    }

    #[test]
    fn create_requires_init() {
        let primitive = UuidPrimitive::new();
        assert!(primitive.create().unwrap_err().is_system_error());
    }

    #[test]
    fn failed_persist_keeps_the_clock_where_it_was() {
        let store = SwitchableStore::default();
        let reject_writes = Arc::clone(&store.reject_writes);
        let mut session = ClockSession {
            store: Box::new(store),
            clock: PersistedClock {
                last_ticks: 1_000,
                clock_seq: 7,
                node: [1; 6],
            },
        };

        reject_writes.store(true, Ordering::SeqCst);
        let err = session.next_id(2_000).unwrap_err();
        assert!(err.is_system_error());
        assert_eq!(session.clock.last_ticks, 1_000);
        assert_eq!(session.store.load().unwrap(), None);

        reject_writes.store(false, Ordering::SeqCst);
        session.next_id(2_000).unwrap();
        assert_eq!(session.clock.last_ticks, 2_000);
    }

    #[test]
    fn create_fails_when_the_clock_cannot_be_persisted() {
        let store = SwitchableStore::default();
        let saved = Arc::clone(&store.saved);
        let reject_writes = Arc::clone(&store.reject_writes);

        let primitive = UuidPrimitive::new();
        primitive
            .init(Box::new(store), ThreadMode::MultiThreaded)
            .unwrap();
        let before = saved.lock().clone();

        reject_writes.store(true, Ordering::SeqCst);
        assert!(primitive.create().unwrap_err().is_system_error());
        assert_eq!(*saved.lock(), before);
    }

    #[test]
    fn single_threaded_mode_rejects_overlapping_calls() {
        let primitive = UuidPrimitive::new();
        primitive
            .init(
                Box::new(SwitchableStore::default()),
                ThreadMode::SingleThreaded,
            )
            .unwrap();

        let held = primitive.session.lock();
        let err = primitive.create().unwrap_err();
        assert!(err.is_system_error());
        drop(held);

        assert_eq!(primitive.create().unwrap().version(), 1);
    }

    #[test]
    fn multi_threaded_mode_waits_for_the_session() {
        let primitive = Arc::new(UuidPrimitive::new());
        primitive
            .init(
                Box::new(SwitchableStore::default()),
                ThreadMode::MultiThreaded,
            )
            .unwrap();

        let held = primitive.session.lock();
        let worker = {
            let primitive = Arc::clone(&primitive);
            std::thread::spawn(move || primitive.create())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(held);
        assert_eq!(worker.join().unwrap().unwrap().version(), 1);
    }
}
