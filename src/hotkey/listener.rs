//! Dedicated OS-thread hotkey listener using `rdev::listen`.
//!
//! # Auto-repeat
//!
//! Holding a key makes the OS emit a stream of `KeyPress` events without
//! matching releases.  [`KeyFilter`] remembers which bound keys are down and
//! forwards only the first press and the final release, so hold-to-talk
//! sees exactly one `HotkeyPressed` per physical press.  A release reports
//! the binding the key had when it went down, even if the map was swapped
//! in between.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has no graceful shutdown.  Dropping [`HotkeyListener`]
//! sets a stop flag so the callback forwards nothing more; the OS thread
//! stays blocked in rdev until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{Binding, SharedKeyMap};
use crate::orchestrator::OrchestratorEvent;

// ---------------------------------------------------------------------------
// KeyFilter
// ---------------------------------------------------------------------------

/// Maps raw key events to orchestrator events, dropping auto-repeat.
#[derive(Debug)]
pub struct KeyFilter {
    keys: SharedKeyMap,
    held: Vec<(rdev::Key, Binding)>,
}

impl KeyFilter {
    pub fn new(keys: SharedKeyMap) -> Self {
        Self {
            keys,
            held: Vec::new(),
        }
    }

    pub fn on_event(&mut self, event: &rdev::EventType) -> Option<OrchestratorEvent> {
        match *event {
            rdev::EventType::KeyPress(key) => {
                if self.held.iter().any(|(k, _)| *k == key) {
                    return None;
                }
                let binding = self.keys.binding_for(key)?;
                self.held.push((key, binding));
                Some(OrchestratorEvent::HotkeyPressed(binding))
            }
            rdev::EventType::KeyRelease(key) => {
                let i = self.held.iter().position(|(k, _)| *k == key)?;
                let (_, binding) = self.held.swap_remove(i);
                Some(OrchestratorEvent::HotkeyReleased(binding))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyListener
// ---------------------------------------------------------------------------

/// Handle to the running listener thread.  Drop it to stop forwarding.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    // Never joined: rdev::listen does not return.
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyListener {
    /// Spawn the listener thread.  Events go to `tx` via `blocking_send`,
    /// which is safe from a non-async thread.
    pub fn start(keys: SharedKeyMap, tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut filter = KeyFilter::new(keys);
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(ev) = filter.on_event(&event.event_type) {
                        log::debug!("hotkey: {ev:?}");
                        if tx.blocking_send(ev).is_err() {
                            stop_flag.store(true, Ordering::Relaxed);
                        }
                    }
                });
                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to spawn hotkey-listener thread: {e}");
                None
            }
        };

        Self {
            stop,
            _thread: thread,
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HotkeyConfig;
    use crate::hotkey::{Binding, KeyMap};
    use rdev::EventType::{KeyPress, KeyRelease};
    use rdev::Key;

    fn filter() -> KeyFilter {
        KeyFilter::new(SharedKeyMap::new(
            KeyMap::from_config(&HotkeyConfig::default()).unwrap(),
        ))
    }

    fn pressed(b: Binding) -> Option<OrchestratorEvent> {
        Some(OrchestratorEvent::HotkeyPressed(b))
    }

    #[test]
    fn held_key_yields_one_press() {
        let mut f = filter();
        assert_eq!(f.on_event(&KeyPress(Key::F3)), pressed(Binding::Dictation));
        assert_eq!(f.on_event(&KeyPress(Key::F3)), None);
        assert_eq!(f.on_event(&KeyPress(Key::F3)), None);
        assert_eq!(
            f.on_event(&KeyRelease(Key::F3)),
            Some(OrchestratorEvent::HotkeyReleased(Binding::Dictation))
        );
        assert_eq!(f.on_event(&KeyPress(Key::F3)), pressed(Binding::Dictation));
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let mut f = filter();
        assert_eq!(f.on_event(&KeyPress(Key::KeyA)), None);
        assert_eq!(f.on_event(&KeyRelease(Key::KeyA)), None);
        assert_eq!(f.on_event(&rdev::EventType::MouseMove { x: 1.0, y: 2.0 }), None);
    }

    #[test]
    fn release_without_press_is_dropped() {
        let mut f = filter();
        assert_eq!(f.on_event(&KeyRelease(Key::F4)), None);
    }

    #[test]
    fn release_keeps_the_binding_from_the_press() {
        let keys = SharedKeyMap::new(KeyMap::from_config(&HotkeyConfig::default()).unwrap());
        let mut f = KeyFilter::new(keys.clone());
        assert_eq!(f.on_event(&KeyPress(Key::F3)), pressed(Binding::Dictation));
        assert_eq!(f.on_event(&KeyPress(Key::F4)), pressed(Binding::Chat));

        let mut config = HotkeyConfig::default();
        config.dictation = "F5".into();
        config.chat = "F3".into();
        keys.replace(KeyMap::from_config(&config).unwrap());

        // F3 now means Chat and F4 means nothing; both were held before.
        assert_eq!(
            f.on_event(&KeyRelease(Key::F3)),
            Some(OrchestratorEvent::HotkeyReleased(Binding::Dictation))
        );
        assert_eq!(
            f.on_event(&KeyRelease(Key::F4)),
            Some(OrchestratorEvent::HotkeyReleased(Binding::Chat))
        );
        assert_eq!(f.on_event(&KeyPress(Key::F3)), pressed(Binding::Chat));
    }

    #[test]
    fn independent_keys_tracked_separately() {
        let mut f = filter();
        assert_eq!(f.on_event(&KeyPress(Key::F8)), pressed(Binding::Vision));
        assert_eq!(f.on_event(&KeyPress(Key::Escape)), pressed(Binding::Cancel));
        assert_eq!(f.on_event(&KeyPress(Key::F8)), None);
        assert_eq!(
            f.on_event(&KeyRelease(Key::Escape)),
            Some(OrchestratorEvent::HotkeyReleased(Binding::Cancel))
        );
    }
}
