//! Callback delivery: hands processed results to result sinks.
//!
//! Two modes, selected through [`DeliveryMode`]:
//!
//! - **Inline**: the scheduling worker delivers right after processing, racing
//!   the hand-off against the event's cancellation, the scheduler's stop signal
//!   and the delivery timeout.
//! - **Async**: the scheduling worker enqueues onto a bounded dispatch queue
//!   drained by one dispatch thread. When a sink is full, or the dispatch
//!   queue itself is full, the request goes to a single retry worker that
//!   waits on every parked sink at once. Neither case blocks the scheduling
//!   worker or the dispatcher.
//!
//! The retry worker holds at most [`RETRY_CAPACITY`] requests plus as many
//! again in its inbox; anything beyond that is discarded. A zero timeout is
//! retried for at most [`MAX_RETRY_WINDOW`].
//!
//! Every request ends in exactly one [`Outcome`]; anything other than
//! `Delivered` is logged and counted.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, at, bounded, never, select, Receiver, Select, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::DeliveryMode;

use super::cancel::{signalled, CancelToken};
use super::error::SchedulerError;
use super::event::{EventId, EventResult, Priority, ResultSink};
use super::hooks::Hooks;
use super::metrics::Counter;

/// Requests parked on the retry worker at once.
pub(crate) const RETRY_CAPACITY: usize = 1024;

/// How long an async request with a zero timeout is retried.
pub(crate) const MAX_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// A result waiting to be handed to its sink.
pub(crate) struct DeliveryRequest<R> {
    pub id: EventId,
    pub priority: Priority,
    pub sink: ResultSink<R>,
    pub result: EventResult<R>,
    pub cancel: Option<CancelToken>,
    pub timeout: Duration,
}

/// Terminal outcome of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Delivered,
    TimedOut,
    Cancelled,
    Stopped,
    ReceiverGone,
    /// The retry backlog was full.
    Overflow,
}

/// Which path produced an outcome; decides how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Inline,
    Async,
    Flush,
}

/// Try to put `result` into `sink`, waiting for space until the event's
/// cancellation fires, `stop` disconnects or `timeout` elapses.
/// A zero timeout waits without a timer.
pub(crate) fn send_until<R>(
    sink: &ResultSink<R>,
    result: EventResult<R>,
    cancel: Option<&CancelToken>,
    timeout: Duration,
    stop: &Receiver<()>,
) -> Outcome {
    let result = match sink.try_send(result) {
        Ok(()) => return Outcome::Delivered,
        Err(TrySendError::Disconnected(_)) => return Outcome::ReceiverGone,
        Err(TrySendError::Full(result)) => result,
    };

    let idle = never::<()>();
    let cancelled = cancel.map_or(&idle, CancelToken::done);
    let deadline = cancel.map_or_else(never, CancelToken::deadline_signal);
    let timer = if timeout.is_zero() { never() } else { after(timeout) };

    select! {
        send(sink, result) -> res => {
            if res.is_ok() { Outcome::Delivered } else { Outcome::ReceiverGone }
        },
        recv(cancelled) -> _ => Outcome::Cancelled,
        recv(deadline) -> _ => Outcome::Cancelled,
        recv(stop) -> _ => Outcome::Stopped,
        recv(timer) -> _ => Outcome::TimedOut,
    }
}

fn record(hooks: &Hooks, route: Route, outcome: Outcome, id: EventId, priority: Priority, timeout: Duration) {
    match (route, outcome) {
        (_, Outcome::Delivered) => {}
        (Route::Inline, Outcome::TimedOut) => {
            hooks.logger().warn(&format!(
                "inline delivery of event {id} ({priority}) abandoned after {timeout:?}"
            ));
            hooks.metrics().increment(Counter::InlineTimeout);
        }
        (Route::Async, Outcome::TimedOut) => {
            hooks.logger().warn(&format!(
                "async delivery of event {id} ({priority}) discarded after {timeout:?}"
            ));
            hooks.metrics().increment(Counter::CallbackDiscarded);
        }
        (_, Outcome::Overflow) => {
            hooks.logger().warn(&format!(
                "delivery retry backlog full; event {id} ({priority}) discarded"
            ));
            hooks.metrics().increment(Counter::CallbackDiscarded);
        }
        (route, outcome) => {
            debug!(event_id = id, %priority, ?route, ?outcome, "result discarded");
            hooks.metrics().increment(Counter::CallbackDiscarded);
        }
    }
}

/// Delivery state owned by the scheduling worker.
pub(crate) struct Delivery<R> {
    hooks: Arc<Hooks>,
    stop: Receiver<()>,
    callback_capacity: usize,
    dispatcher: Option<Dispatcher<R>>,
}

impl<R: Send + 'static> Delivery<R> {
    pub(crate) fn new(hooks: Arc<Hooks>, stop: Receiver<()>, callback_capacity: usize) -> Self {
        Self {
            hooks,
            stop,
            callback_capacity,
            dispatcher: None,
        }
    }

    /// Spawn the dispatch worker now rather than on first async delivery.
    pub(crate) fn start_dispatcher(&mut self) -> Result<(), SchedulerError> {
        self.dispatcher_senders().map(drop)
    }

    /// Hand a result to its sink according to the current delivery mode.
    pub(crate) fn deliver(
        &mut self,
        id: EventId,
        priority: Priority,
        sink: ResultSink<R>,
        result: EventResult<R>,
        cancel: Option<CancelToken>,
    ) {
        let settings = self.hooks.delivery();
        let request = DeliveryRequest {
            id,
            priority,
            sink,
            result,
            cancel,
            timeout: settings.timeout(),
        };
        match settings.mode {
            DeliveryMode::Inline => self.deliver_inline(request),
            DeliveryMode::Async => self.deliver_async(request),
        }
    }

    /// Non-blocking hand-off used when flushing on stop.
    pub(crate) fn deliver_now(&self, id: EventId, priority: Priority, sink: &ResultSink<R>, result: EventResult<R>) {
        let outcome = match sink.try_send(result) {
            Ok(()) => Outcome::Delivered,
            Err(TrySendError::Full(_)) => Outcome::Stopped,
            Err(TrySendError::Disconnected(_)) => Outcome::ReceiverGone,
        };
        record(&self.hooks, Route::Flush, outcome, id, priority, Duration::ZERO);
    }

    fn deliver_inline(&self, request: DeliveryRequest<R>) {
        let DeliveryRequest {
            id,
            priority,
            sink,
            result,
            cancel,
            timeout,
        } = request;
        let outcome = send_until(&sink, result, cancel.as_ref(), timeout, &self.stop);
        record(&self.hooks, Route::Inline, outcome, id, priority, timeout);
    }

    fn deliver_async(&mut self, request: DeliveryRequest<R>) {
        let (id, priority, timeout) = (request.id, request.priority, request.timeout);
        let (tx, retry) = match self.dispatcher_senders() {
            Ok(senders) => senders,
            Err(err) => {
                self.hooks
                    .logger()
                    .error(&format!("callback dispatcher unavailable: {err}"));
                record(&self.hooks, Route::Async, Outcome::Stopped, id, priority, timeout);
                return;
            }
        };
        match tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                debug!(event_id = id, %priority, "callback queue full; handing to retry worker");
                park(&retry, request, &self.hooks);
            }
            Err(TrySendError::Disconnected(_)) => {
                record(&self.hooks, Route::Async, Outcome::Stopped, id, priority, timeout);
            }
        }
    }

    fn dispatcher_senders(&mut self) -> Result<(Sender<DeliveryRequest<R>>, Sender<DeliveryRequest<R>>), SchedulerError> {
        let dispatcher = match self.dispatcher.take() {
            Some(dispatcher) => dispatcher,
            None => Dispatcher::spawn(self.callback_capacity, Arc::clone(&self.hooks), self.stop.clone())?,
        };
        let dispatcher = self.dispatcher.insert(dispatcher);
        Ok((dispatcher.tx.clone(), dispatcher.retry.clone()))
    }

    /// Close the dispatch queue and wait for the dispatcher and retry worker
    /// to drain.
    pub(crate) fn shutdown(self) {
        if let Some(Dispatcher { tx, retry, handle }) = self.dispatcher {
            drop(tx);
            drop(retry);
            if handle.join().is_err() {
                warn!("callback dispatcher panicked");
            }
        }
    }
}

struct Dispatcher<R> {
    tx: Sender<DeliveryRequest<R>>,
    retry: Sender<DeliveryRequest<R>>,
    handle: JoinHandle<()>,
}

impl<R: Send + 'static> Dispatcher<R> {
    /// Spawn the retry worker, then the dispatcher that owns it.
    fn spawn(capacity: usize, hooks: Arc<Hooks>, stop: Receiver<()>) -> Result<Self, SchedulerError> {
        let (retry, inbox) = bounded(RETRY_CAPACITY);
        let retry_hooks = Arc::clone(&hooks);
        let retry_stop = stop.clone();
        let retry_handle = thread::Builder::new()
            .name("pel-callback-retry".into())
            .spawn(move || run_retries(&inbox, &retry_hooks, &retry_stop, MAX_RETRY_WINDOW))
            .map_err(|e| SchedulerError::Runtime(format!("failed to spawn delivery retry worker: {e}")))?;

        let (tx, rx) = bounded(capacity);
        let forward = retry.clone();
        let handle = thread::Builder::new()
            .name("pel-callback".into())
            .spawn(move || {
                run_dispatcher(&rx, &forward, &hooks, &stop);
                drop(forward);
                if retry_handle.join().is_err() {
                    warn!("delivery retry worker panicked");
                }
            })
            .map_err(|e| SchedulerError::Runtime(format!("failed to spawn callback dispatcher: {e}")))?;
        debug!(capacity, "callback dispatcher started");
        Ok(Self { tx, retry, handle })
    }
}

/// Hand a request to the retry worker without blocking.
fn park<R>(retry: &Sender<DeliveryRequest<R>>, request: DeliveryRequest<R>, hooks: &Hooks) {
    let (id, priority, timeout) = (request.id, request.priority, request.timeout);
    match retry.try_send(request) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => record(hooks, Route::Async, Outcome::Overflow, id, priority, timeout),
        Err(TrySendError::Disconnected(_)) => record(hooks, Route::Async, Outcome::Stopped, id, priority, timeout),
    }
}

/// Drain the dispatch queue until every sender is gone.
fn run_dispatcher<R: Send + 'static>(
    rx: &Receiver<DeliveryRequest<R>>,
    retry: &Sender<DeliveryRequest<R>>,
    hooks: &Hooks,
    stop: &Receiver<()>,
) {
    for request in rx {
        let DeliveryRequest {
            id,
            priority,
            sink,
            result,
            cancel,
            timeout,
        } = request;
        match sink.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => {
                record(hooks, Route::Async, Outcome::ReceiverGone, id, priority, timeout);
            }
            Err(TrySendError::Full(_)) if signalled(stop) => {
                record(hooks, Route::Async, Outcome::Stopped, id, priority, timeout);
            }
            Err(TrySendError::Full(result)) => {
                let request = DeliveryRequest {
                    id,
                    priority,
                    sink,
                    result,
                    cancel,
                    timeout,
                };
                park(retry, request, hooks);
            }
        }
    }
    debug!("callback dispatcher exiting");
}

/// A request parked on the retry worker.
struct Parked<R> {
    request: DeliveryRequest<R>,
    window: Duration,
    expires: Instant,
}

impl<R> Parked<R> {
    fn new(request: DeliveryRequest<R>, max_window: Duration) -> Self {
        let window = if request.timeout.is_zero() {
            max_window
        } else {
            request.timeout.min(max_window)
        };
        Self {
            request,
            window,
            expires: Instant::now() + window,
        }
    }

    /// Earliest instant at which this request must be re-examined.
    fn wake_at(&self) -> Instant {
        match self.request.cancel.as_ref().and_then(CancelToken::deadline) {
            Some(deadline) => deadline.min(self.expires),
            None => self.expires,
        }
    }

    fn expired(&self, now: Instant) -> Option<Outcome> {
        if self.request.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            Some(Outcome::Cancelled)
        } else if now >= self.expires {
            Some(Outcome::TimedOut)
        } else {
            None
        }
    }

    fn finish(self, hooks: &Hooks, outcome: Outcome) {
        let DeliveryRequest { id, priority, .. } = self.request;
        record(hooks, Route::Async, outcome, id, priority, self.window);
    }
}

/// Retire every parked request whose window closed or whose event was cancelled.
fn sweep<R>(parked: &mut Vec<Parked<R>>, hooks: &Hooks) {
    let now = Instant::now();
    let mut slot = 0;
    while slot < parked.len() {
        match parked[slot].expired(now) {
            Some(outcome) => parked.swap_remove(slot).finish(hooks, outcome),
            None => slot += 1,
        }
    }
}

/// Wait on every parked sink at once until each request reaches an outcome.
///
/// Exits on stop, answering everything still parked, or once the inbox
/// disconnects with nothing left parked.
fn run_retries<R: Send + 'static>(
    inbox: &Receiver<DeliveryRequest<R>>,
    hooks: &Hooks,
    stop: &Receiver<()>,
    max_window: Duration,
) {
    let mut parked: Vec<Parked<R>> = Vec::new();
    let mut open = true;

    loop {
        sweep(&mut parked, hooks);
        if !open && parked.is_empty() {
            break;
        }

        let sinks: Vec<ResultSink<R>> = parked.iter().map(|p| p.request.sink.clone()).collect();
        let cancels: Vec<(usize, Receiver<()>)> = parked
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.request.cancel.as_ref().map(|c| (slot, c.done().clone())))
            .collect();
        let timer = parked.iter().map(Parked::wake_at).min().map_or_else(never, at);

        let mut sel = Select::new();
        let stop_op = sel.recv(stop);
        let timer_op = sel.recv(&timer);
        let inbox_op = (open && parked.len() < RETRY_CAPACITY).then(|| sel.recv(inbox));
        let send_ops: Vec<usize> = sinks.iter().map(|sink| sel.send(sink)).collect();
        let cancel_ops: Vec<usize> = cancels.iter().map(|(_, done)| sel.recv(done)).collect();

        let oper = sel.select();
        let index = oper.index();
        if index == stop_op {
            let _ = oper.recv(stop);
            break;
        } else if index == timer_op {
            let _ = oper.recv(&timer);
        } else if Some(index) == inbox_op {
            match oper.recv(inbox) {
                Ok(request) => parked.push(Parked::new(request, max_window)),
                Err(_) => open = false,
            }
        } else if let Some(slot) = send_ops.iter().position(|&op| op == index) {
            let entry = parked.swap_remove(slot);
            let Parked { request, window, .. } = entry;
            let DeliveryRequest { id, priority, result, .. } = request;
            let outcome = match oper.send(&sinks[slot], result) {
                Ok(()) => Outcome::Delivered,
                Err(_) => Outcome::ReceiverGone,
            };
            record(hooks, Route::Async, outcome, id, priority, window);
        } else if let Some(pos) = cancel_ops.iter().position(|&op| op == index) {
            let (slot, done) = &cancels[pos];
            let _ = oper.recv(done);
            parked.swap_remove(*slot).finish(hooks, Outcome::Cancelled);
        }
    }

    for entry in parked {
        entry.finish(hooks, Outcome::Stopped);
    }
    if open {
        for request in inbox {
            record(hooks, Route::Async, Outcome::Stopped, request.id, request.priority, request.timeout);
        }
    }
    debug!("delivery retry worker exiting");
}
