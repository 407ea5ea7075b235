// ── Scripted device ──
//
// In-memory `Connector` for unit tests. Results are queued per
// (path, command); once a queue is empty the standing response is used,
// and with neither the call succeeds with no rows.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wgfleet_api::{Connector, DeviceCommand, DeviceSession, DeviceTarget, Error, Params, Record};

type Key = (String, DeviceCommand);

pub(crate) fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub path: String,
    pub command: DeviceCommand,
    pub params: Params,
}

#[derive(Default)]
struct Script {
    queued: Mutex<HashMap<Key, VecDeque<Result<Vec<Record>, Error>>>>,
    standing: Mutex<HashMap<Key, Vec<Record>>>,
    delays: Mutex<HashMap<String, Duration>>,
    connect_failures: Mutex<VecDeque<Error>>,
    calls: Mutex<Vec<Call>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Standing response for every later call to (path, command).
    pub(crate) fn respond(&self, path: &str, command: DeviceCommand, rows: Vec<Record>) {
        self.script
            .standing
            .lock()
            .unwrap()
            .insert((path.to_owned(), command), rows);
    }

    /// One-shot result, consumed before the standing response.
    pub(crate) fn queue(&self, path: &str, command: DeviceCommand, result: Result<Vec<Record>, Error>) {
        self.script
            .queued
            .lock()
            .unwrap()
            .entry((path.to_owned(), command))
            .or_default()
            .push_back(result);
    }

    pub(crate) fn fail_connects(&self, times: usize, make: impl Fn() -> Error) {
        let mut failures = self.script.connect_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(make());
        }
    }

    /// Block every call to `path` for `delay`.
    pub(crate) fn delay(&self, path: &str, delay: Duration) {
        self.script
            .delays
            .lock()
            .unwrap()
            .insert(path.to_owned(), delay);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, path: &str, command: DeviceCommand) -> usize {
        self.script
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path && c.command == command)
            .count()
    }

    /// Session opens attempted, including failed ones.
    pub(crate) fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }

    /// Calls that started while another was still running.
    pub(crate) fn overlaps(&self) -> usize {
        self.script.overlaps.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, Error> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.connect_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Script>,
}

impl DeviceSession for ScriptedSession {
    fn execute(
        &mut self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
    ) -> Result<Vec<Record>, Error> {
        if self.script.busy.swap(true, Ordering::SeqCst) {
            self.script.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.script.calls.lock().unwrap().push(Call {
            path: path.to_owned(),
            command,
            params: params.clone(),
        });

        let delay = self.script.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let key = (path.to_owned(), command);
        let queued = self
            .script
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let result = queued.unwrap_or_else(|| {
            Ok(self
                .script
                .standing
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_default())
        });

        self.script.busy.store(false, Ordering::SeqCst);
        result
    }

    fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}
