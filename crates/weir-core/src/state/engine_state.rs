//! Typed facades over the raw keyed store.
//!
//! Each entity family lives under its own one-byte column tag followed by
//! big-endian key components, so related entries are adjacent and prefix
//! scans stay cheap. All values are serialized with serde_json.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EngineError;
use crate::incident::Incident;
use crate::instance::ElementInstance;
use crate::key::Key;
use crate::record::ElementRecord;
use crate::state::store::StateStore;
use crate::subscription::{CatchSubscription, MessageStartSubscription, TimerRecord};
use crate::trigger::EventTrigger;
use crate::types::Variables;

const COL_INSTANCE: u8 = 0x01;
const COL_CHILD_INDEX: u8 = 0x02;
const COL_VARIABLES: u8 = 0x03;
const COL_EVENT_TRIGGER: u8 = 0x04;
const COL_CATCH_SUBSCRIPTION: u8 = 0x05;
const COL_MESSAGE_INDEX: u8 = 0x06;
const COL_MESSAGE_START: u8 = 0x07;
const COL_TIMER: u8 = 0x08;
const COL_TIMER_SCOPE_INDEX: u8 = 0x09;
const COL_TIMER_START_INDEX: u8 = 0x0a;
const COL_DEFERRED: u8 = 0x0b;
const COL_INCIDENT: u8 = 0x0c;
const COL_INCIDENT_INDEX: u8 = 0x0d;

/// Typed access to one partition's engine state.
#[derive(Clone)]
pub struct EngineState {
    store: Arc<dyn StateStore>,
}

impl EngineState {
    /// Wrap a raw store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn put_json<T: Serialize>(&self, key: Vec<u8>, value: &T) -> Result<(), EngineError> {
        self.store.put(&key, serde_json::to_vec(value)?)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, EngineError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>, EngineError> {
        self.store
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(EngineError::from))
            .collect()
    }

    // ----- element instances -----

    /// Store an instance, maintaining the child index.
    pub fn put_instance(&self, instance: &ElementInstance) -> Result<(), EngineError> {
        if let Some(scope) = instance.flow_scope {
            self.store.put(
                &composed(COL_CHILD_INDEX, &[&scope.to_bytes(), &instance.key.to_bytes()]),
                Vec::new(),
            )?;
        }
        self.put_json(composed(COL_INSTANCE, &[&instance.key.to_bytes()]), instance)
    }

    /// Read an instance.
    pub fn instance(&self, key: Key) -> Result<Option<ElementInstance>, EngineError> {
        self.get_json(&composed(COL_INSTANCE, &[&key.to_bytes()]))
    }

    /// Read an instance that must exist.
    pub fn expect_instance(&self, key: Key) -> Result<ElementInstance, EngineError> {
        self.instance(key)?.ok_or(EngineError::InstanceNotFound(key))
    }

    /// Remove an instance, its variables, and its child index entry.
    pub fn delete_instance(&self, instance: &ElementInstance) -> Result<(), EngineError> {
        if let Some(scope) = instance.flow_scope {
            self.store.delete(&composed(
                COL_CHILD_INDEX,
                &[&scope.to_bytes(), &instance.key.to_bytes()],
            ))?;
        }
        self.store
            .delete(&composed(COL_VARIABLES, &[&instance.key.to_bytes()]))?;
        self.store
            .delete(&composed(COL_INSTANCE, &[&instance.key.to_bytes()]))
    }

    /// Keys of all children of a scope, in key order.
    pub fn children_of(&self, scope: Key) -> Result<Vec<Key>, EngineError> {
        Ok(self
            .store
            .scan_prefix(&composed(COL_CHILD_INDEX, &[&scope.to_bytes()]))?
            .into_iter()
            .filter_map(|(k, _)| key_suffix(&k))
            .collect())
    }

    // ----- variables -----

    /// Variables of an instance's local scope; empty if none were written.
    pub fn variables_of(&self, key: Key) -> Result<Variables, EngineError> {
        Ok(self
            .get_json(&composed(COL_VARIABLES, &[&key.to_bytes()]))?
            .unwrap_or_default())
    }

    /// Replace an instance's local variables.
    pub fn put_variables(&self, key: Key, variables: &Variables) -> Result<(), EngineError> {
        self.put_json(composed(COL_VARIABLES, &[&key.to_bytes()]), variables)
    }

    // ----- event triggers -----

    /// Append a pending trigger for a scope.
    pub fn push_trigger(&self, trigger: &EventTrigger) -> Result<(), EngineError> {
        self.put_json(
            composed(
                COL_EVENT_TRIGGER,
                &[&trigger.scope_key.to_bytes(), &trigger.trigger_key.to_bytes()],
            ),
            trigger,
        )
    }

    /// Oldest pending trigger for a scope, left in place.
    pub fn peek_trigger(&self, scope: Key) -> Result<Option<EventTrigger>, EngineError> {
        Ok(self
            .scan_json::<EventTrigger>(&composed(COL_EVENT_TRIGGER, &[&scope.to_bytes()]))?
            .into_iter()
            .next())
    }

    /// Consume a trigger.
    pub fn delete_trigger(&self, trigger: &EventTrigger) -> Result<(), EngineError> {
        self.store.delete(&composed(
            COL_EVENT_TRIGGER,
            &[&trigger.scope_key.to_bytes(), &trigger.trigger_key.to_bytes()],
        ))
    }

    // ----- catch subscriptions -----

    /// Open a subscription, maintaining the by-message index.
    pub fn put_catch_subscription(&self, sub: &CatchSubscription) -> Result<(), EngineError> {
        if let Some(message) = &sub.message {
            self.store.put(
                &composed(
                    COL_MESSAGE_INDEX,
                    &[
                        message.as_bytes(),
                        &[0u8],
                        &sub.scope_key.to_bytes(),
                        sub.element_id.as_bytes(),
                    ],
                ),
                Vec::new(),
            )?;
        }
        self.put_json(
            composed(
                COL_CATCH_SUBSCRIPTION,
                &[&sub.scope_key.to_bytes(), sub.element_id.as_bytes()],
            ),
            sub,
        )
    }

    /// All open subscriptions owned by a scope.
    pub fn subscriptions_for_scope(&self, scope: Key) -> Result<Vec<CatchSubscription>, EngineError> {
        self.scan_json(&composed(COL_CATCH_SUBSCRIPTION, &[&scope.to_bytes()]))
    }

    /// One open subscription, if present.
    pub fn catch_subscription(
        &self,
        scope: Key,
        element_id: &str,
    ) -> Result<Option<CatchSubscription>, EngineError> {
        self.get_json(&composed(
            COL_CATCH_SUBSCRIPTION,
            &[&scope.to_bytes(), element_id.as_bytes()],
        ))
    }

    /// Close one subscription and drop its index entry.
    pub fn delete_catch_subscription(&self, sub: &CatchSubscription) -> Result<(), EngineError> {
        if let Some(message) = &sub.message {
            self.store.delete(&composed(
                COL_MESSAGE_INDEX,
                &[
                    message.as_bytes(),
                    &[0u8],
                    &sub.scope_key.to_bytes(),
                    sub.element_id.as_bytes(),
                ],
            ))?;
        }
        self.store.delete(&composed(
            COL_CATCH_SUBSCRIPTION,
            &[&sub.scope_key.to_bytes(), sub.element_id.as_bytes()],
        ))
    }

    /// All open subscriptions waiting on a message name.
    pub fn subscriptions_for_message(
        &self,
        message: &str,
    ) -> Result<Vec<CatchSubscription>, EngineError> {
        let mut subs = Vec::new();
        let prefix = composed(COL_MESSAGE_INDEX, &[message.as_bytes(), &[0u8]]);
        for (index_key, _) in self.store.scan_prefix(&prefix)? {
            let rest = &index_key[prefix.len()..];
            if rest.len() <= 8 {
                continue;
            }
            let mut scope_bytes = [0u8; 8];
            scope_bytes.copy_from_slice(&rest[..8]);
            let scope = Key(u64::from_be_bytes(scope_bytes));
            let element_id = String::from_utf8_lossy(&rest[8..]).to_string();
            if let Some(sub) = self.catch_subscription(scope, &element_id)? {
                subs.push(sub);
            }
        }
        Ok(subs)
    }

    // ----- message start subscriptions -----

    /// Open the message start subscription for a message name.
    pub fn put_message_start(&self, sub: &MessageStartSubscription) -> Result<(), EngineError> {
        self.put_json(
            composed(COL_MESSAGE_START, &[sub.message.as_bytes()]),
            sub,
        )
    }

    /// The subscription currently owning a message name, if any.
    pub fn message_start(
        &self,
        message: &str,
    ) -> Result<Option<MessageStartSubscription>, EngineError> {
        self.get_json(&composed(COL_MESSAGE_START, &[message.as_bytes()]))
    }

    /// All message start subscriptions owned by versions of a process.
    pub fn message_starts_for_process(
        &self,
        process_id: &str,
    ) -> Result<Vec<MessageStartSubscription>, EngineError> {
        Ok(self
            .scan_json::<MessageStartSubscription>(&[COL_MESSAGE_START])?
            .into_iter()
            .filter(|s| s.process_id == process_id)
            .collect())
    }

    /// Close the message start subscription for a message name.
    pub fn delete_message_start(&self, message: &str) -> Result<(), EngineError> {
        self.store
            .delete(&composed(COL_MESSAGE_START, &[message.as_bytes()]))
    }

    // ----- timers -----

    /// Schedule a timer, maintaining the cancel indexes.
    pub fn put_timer(&self, timer: &TimerRecord) -> Result<(), EngineError> {
        match timer.scope_key {
            Some(scope) => self.store.put(
                &composed(
                    COL_TIMER_SCOPE_INDEX,
                    &[&scope.to_bytes(), timer.element_id.as_bytes()],
                ),
                due_key(timer),
            )?,
            None => self.store.put(
                &composed(COL_TIMER_START_INDEX, &[timer.process_id.as_bytes()]),
                due_key(timer),
            )?,
        }
        self.put_json(due_key(timer), timer)
    }

    /// All timers due at or before `now_ms`, in due order.
    pub fn due_timers(&self, now_ms: i64) -> Result<Vec<TimerRecord>, EngineError> {
        Ok(self
            .scan_json::<TimerRecord>(&[COL_TIMER])?
            .into_iter()
            .take_while(|t| t.due_ms <= now_ms)
            .collect())
    }

    /// Remove a timer and its cancel index entry.
    pub fn delete_timer(&self, timer: &TimerRecord) -> Result<(), EngineError> {
        match timer.scope_key {
            Some(scope) => self.store.delete(&composed(
                COL_TIMER_SCOPE_INDEX,
                &[&scope.to_bytes(), timer.element_id.as_bytes()],
            ))?,
            None => self
                .store
                .delete(&composed(COL_TIMER_START_INDEX, &[timer.process_id.as_bytes()]))?,
        }
        self.store.delete(&due_key(timer))
    }

    /// The timer waiting on `(scope, element)`, if any.
    pub fn timer_for_scope(
        &self,
        scope: Key,
        element_id: &str,
    ) -> Result<Option<TimerRecord>, EngineError> {
        let index = composed(
            COL_TIMER_SCOPE_INDEX,
            &[&scope.to_bytes(), element_id.as_bytes()],
        );
        match self.store.get(&index)? {
            Some(due) => self.get_json(&due),
            None => Ok(None),
        }
    }

    /// The start-event timer of a process, if any.
    pub fn start_timer_for_process(
        &self,
        process_id: &str,
    ) -> Result<Option<TimerRecord>, EngineError> {
        let index = composed(COL_TIMER_START_INDEX, &[process_id.as_bytes()]);
        match self.store.get(&index)? {
            Some(due) => self.get_json(&due),
            None => Ok(None),
        }
    }

    // ----- deferred records -----

    /// Park a record until its host terminates.
    pub fn put_deferred(&self, host: Key, record: &ElementRecord) -> Result<(), EngineError> {
        self.put_json(
            composed(COL_DEFERRED, &[&host.to_bytes(), &record.key.to_bytes()]),
            record,
        )
    }

    /// Remove and return every record parked under a host, in key order.
    pub fn take_deferred(&self, host: Key) -> Result<Vec<ElementRecord>, EngineError> {
        let prefix = composed(COL_DEFERRED, &[&host.to_bytes()]);
        let records: Vec<ElementRecord> = self.scan_json(&prefix)?;
        for record in &records {
            self.store
                .delete(&composed(COL_DEFERRED, &[&host.to_bytes(), &record.key.to_bytes()]))?;
        }
        Ok(records)
    }

    // ----- incidents -----

    /// Record an incident, maintaining the by-instance index.
    pub fn put_incident(&self, incident: &Incident) -> Result<(), EngineError> {
        self.store.put(
            &composed(
                COL_INCIDENT_INDEX,
                &[
                    &incident.element_instance_key.to_bytes(),
                    &incident.key.to_bytes(),
                ],
            ),
            Vec::new(),
        )?;
        self.put_json(composed(COL_INCIDENT, &[&incident.key.to_bytes()]), incident)
    }

    /// Read an incident.
    pub fn incident(&self, key: Key) -> Result<Option<Incident>, EngineError> {
        self.get_json(&composed(COL_INCIDENT, &[&key.to_bytes()]))
    }

    /// All incidents blocking an element instance.
    pub fn incidents_for_instance(&self, element_key: Key) -> Result<Vec<Incident>, EngineError> {
        let prefix = composed(COL_INCIDENT_INDEX, &[&element_key.to_bytes()]);
        let mut incidents = Vec::new();
        for (index_key, _) in self.store.scan_prefix(&prefix)? {
            if let Some(incident_key) = key_suffix(&index_key) {
                if let Some(incident) = self.incident(incident_key)? {
                    incidents.push(incident);
                }
            }
        }
        Ok(incidents)
    }

    /// Remove an incident and its index entry.
    pub fn delete_incident(&self, incident: &Incident) -> Result<(), EngineError> {
        self.store.delete(&composed(
            COL_INCIDENT_INDEX,
            &[
                &incident.element_instance_key.to_bytes(),
                &incident.key.to_bytes(),
            ],
        ))?;
        self.store
            .delete(&composed(COL_INCIDENT, &[&incident.key.to_bytes()]))
    }
}

/// Compose a column key from a tag and parts.
fn composed(column: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + parts.iter().map(|p| p.len()).sum::<usize>());
    key.push(column);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// The primary timer key, ordered by due instant.
fn due_key(timer: &TimerRecord) -> Vec<u8> {
    composed(
        COL_TIMER,
        &[
            &(timer.due_ms.max(0) as u64).to_be_bytes(),
            &timer.timer_key.to_bytes(),
        ],
    )
}

/// The trailing 8 bytes of an index key, decoded as a key.
fn key_suffix(index_key: &[u8]) -> Option<Key> {
    if index_key.len() < 8 {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&index_key[index_key.len() - 8..]);
    Some(Key(u64::from_be_bytes(bytes)))
}
