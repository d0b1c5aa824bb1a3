//! Button events from the debounce context to the poll loop.
//!
//! The button driver calls [`ButtonInbox::post`] from its own context with
//! the pin and the detected action. Only clicks are queued; the poll loop
//! drains them with [`ButtonInbox::take`]. Posting never blocks: when the
//! queue is full the click is dropped and counted.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use crate::config::AppConfig;

/// Capacity of the button queue
const INBOX_CAPACITY: usize = 8;

/// Actions reported by the button driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Pressed,
    Released,
    Clicked,
    LongPressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    /// Start preview / take photo
    Key1,
    /// Back
    Key2,
    /// Any other pin; inert
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub key: KeyId,
    pub kind: ButtonAction,
}

fn key_for(pin: i32, key1_pin: i32, key2_pin: i32) -> KeyId {
    if pin == key1_pin {
        KeyId::Key1
    } else if pin == key2_pin {
        KeyId::Key2
    } else {
        KeyId::Other(pin)
    }
}

impl ButtonEvent {
    /// Map a pin to its key using the configured key pins.
    pub fn from_pin(pin: i32, kind: ButtonAction, config: &AppConfig) -> Self {
        Self {
            key: key_for(pin, config.key1_pin, config.key2_pin),
            kind,
        }
    }

    pub const fn clicked(key: KeyId) -> Self {
        Self {
            key,
            kind: ButtonAction::Clicked,
        }
    }
}

pub struct ButtonInbox {
    key1_pin: i32,
    key2_pin: i32,
    queue: Channel<CriticalSectionRawMutex, ButtonEvent, INBOX_CAPACITY>,
    dropped: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl ButtonInbox {
    pub const fn new(key1_pin: i32, key2_pin: i32) -> Self {
        Self {
            key1_pin,
            key2_pin,
            queue: Channel::new(),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.key1_pin, config.key2_pin)
    }

    /// Button driver callback. Returns whether the event was queued.
    pub fn post(&self, pin: i32, action: ButtonAction) -> bool {
        if action != ButtonAction::Clicked {
            return false;
        }
        debug!("Button pressed: pin={}", pin);
        self.push(ButtonEvent::clicked(key_for(pin, self.key1_pin, self.key2_pin)))
    }

    /// Queue a click for a key directly, bypassing pin mapping.
    pub fn post_key(&self, key: KeyId) -> bool {
        self.push(ButtonEvent::clicked(key))
    }

    /// Next pending event, if any. Never blocks.
    pub fn take(&self) -> Option<ButtonEvent> {
        self.queue.try_receive().ok()
    }

    /// Clicks lost because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.lock(|d| d.get())
    }

    fn push(&self, event: ButtonEvent) -> bool {
        if self.queue.try_send(event).is_ok() {
            return true;
        }
        self.dropped.lock(|d| d.set(d.get().wrapping_add(1)));
        warn!("Button queue full, dropping {:?}", event.key);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pin_maps_configured_keys() {
        let config = AppConfig::default();

        assert_eq!(
            ButtonEvent::from_pin(34, ButtonAction::Clicked, &config).key,
            KeyId::Key1
        );
        assert_eq!(
            ButtonEvent::from_pin(11, ButtonAction::Clicked, &config).key,
            KeyId::Key2
        );
        assert_eq!(
            ButtonEvent::from_pin(7, ButtonAction::Clicked, &config).key,
            KeyId::Other(7)
        );
    }

    #[test]
    fn test_only_clicks_are_queued() {
        let inbox = ButtonInbox::from_config(&AppConfig::default());

        assert!(!inbox.post(34, ButtonAction::Pressed));
        assert!(!inbox.post(34, ButtonAction::Released));
        assert!(!inbox.post(34, ButtonAction::LongPressed));
        assert!(inbox.post(34, ButtonAction::Clicked));

        assert_eq!(inbox.take(), Some(ButtonEvent::clicked(KeyId::Key1)));
        assert_eq!(inbox.take(), None);
    }

    #[test]
    fn test_events_drain_in_order() {
        let inbox = ButtonInbox::new(34, 11);
        inbox.post(11, ButtonAction::Clicked);
        inbox.post(99, ButtonAction::Clicked);
        inbox.post_key(KeyId::Key1);

        assert_eq!(inbox.take().map(|e| e.key), Some(KeyId::Key2));
        assert_eq!(inbox.take().map(|e| e.key), Some(KeyId::Other(99)));
        assert_eq!(inbox.take().map(|e| e.key), Some(KeyId::Key1));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let inbox = ButtonInbox::new(34, 11);
        for _ in 0..INBOX_CAPACITY {
            assert!(inbox.post_key(KeyId::Key1));
        }

        assert!(!inbox.post(11, ButtonAction::Clicked));
        assert_eq!(inbox.dropped(), 1);
    }
}
