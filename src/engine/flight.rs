//! Single-flight coordination
//!
//! At most one caller per resolved key computes at a time within this process.
//! Others wait for the leader's encoded result. A leader that fails, or whose
//! future is dropped, publishes nothing and its followers race to lead again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

/// Encoded result shared with followers; None when the leader produced nothing.
pub(crate) type Payload = Option<Arc<[u8]>>;

#[derive(Debug, Clone)]
enum FlightState {
    Pending,
    Done(Payload),
}

type FlightSender = Arc<watch::Sender<FlightState>>;

#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    flights: Mutex<HashMap<String, FlightSender>>,
}

pub(crate) enum Role<'a> {
    Leader(FlightLeader<'a>),
    Follower(FlightFollower),
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FlightSender>> {
        // Entries stay consistent even if a holder panicked
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the flight for `key`, or starts one.
    pub(crate) fn join_or_lead(&self, key: &str) -> Role<'_> {
        let mut flights = self.lock();
        if let Some(tx) = flights.get(key) {
            return Role::Follower(FlightFollower { rx: tx.subscribe() });
        }

        let (tx, _) = watch::channel(FlightState::Pending);
        let tx = Arc::new(tx);
        flights.insert(key.to_string(), Arc::clone(&tx));
        Role::Leader(FlightLeader {
            flights: self,
            key: key.to_string(),
            tx,
            finished: false,
        })
    }

    /// Number of keys currently being computed.
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

// == Leader ==
pub(crate) struct FlightLeader<'a> {
    flights: &'a SingleFlight,
    key: String,
    tx: FlightSender,
    finished: bool,
}

impl FlightLeader<'_> {
    /// Publishes the result and closes the flight.
    pub(crate) fn complete(mut self, payload: Payload) {
        self.finish(payload);
    }

    fn finish(&mut self, payload: Payload) {
        if self.finished {
            return;
        }
        self.finished = true;

        // Unregister before waking followers so that a woken follower never
        // rejoins this flight.
        {
            let mut flights = self.flights.lock();
            if flights
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.tx))
            {
                flights.remove(&self.key);
            }
        }
        self.tx.send_replace(FlightState::Done(payload));
    }
}

impl Drop for FlightLeader<'_> {
    fn drop(&mut self) {
        self.finish(None);
    }
}

// == Follower ==
pub(crate) struct FlightFollower {
    rx: watch::Receiver<FlightState>,
}

/// What a follower saw.
pub(crate) enum Outcome {
    /// Leader finished with a payload
    Shared(Arc<[u8]>),
    /// Leader finished without one
    Abandoned,
    /// Wait bound exceeded
    TimedOut,
}

impl FlightFollower {
    pub(crate) async fn wait(mut self, bound: Duration) -> Outcome {
        let waited = tokio::time::timeout(
            bound,
            self.rx.wait_for(|state| matches!(state, FlightState::Done(_))),
        )
        .await;

        match waited {
            Err(_) => Outcome::TimedOut,
            Ok(Err(_)) => Outcome::Abandoned,
            Ok(Ok(state)) => match &*state {
                FlightState::Done(Some(bytes)) => Outcome::Shared(Arc::clone(bytes)),
                _ => Outcome::Abandoned,
            },
        }
    }
}
