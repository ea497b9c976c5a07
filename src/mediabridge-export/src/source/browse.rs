//! Streaming of browse results as batched signals.
//!
//! A browse call is answered with the native handle right away. Results are
//! then accumulated per session and flushed as one `browse_result` signal to
//! the requesting peer when the batch reaches its quota, when the flush
//! timer fires, or when the terminal record arrives. Each quota flush widens
//! the quota and the timer so large listings travel in fewer messages.

use crate::context::Context;
use crate::interface::source::{BROWSE_RESULT, INTERFACE};
use crate::mainloop::TimerId;
use crate::source::metadata_blob;
use mediabridge_bus::{OutgoingMessage, ReplyAddress, Value};
use mediabridge_core::models::{codes, SOURCE_ERROR_DOMAIN};
use mediabridge_core::{BrowseConfig, BrowseEvent, BrowseId, BrowseRequest, ExtError, Source};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Quota and timeout of one session's flushes.
#[derive(Debug, Clone)]
pub(crate) struct FlushPolicy {
    quota: usize,
    timeout: Duration,
    config: BrowseConfig,
}

impl FlushPolicy {
    pub fn new(config: BrowseConfig) -> Self {
        Self {
            quota: config.initial_quota.max(1),
            timeout: config.initial_timeout(),
            config,
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applied after every flush caused by a full batch. The timeout only
    /// grows while the quota has not reached its cap.
    pub fn escalate(&mut self) {
        self.quota = self
            .quota
            .saturating_mul(self.config.quota_growth)
            .min(self.config.max_quota)
            .max(1);
        if self.quota < self.config.max_quota {
            self.timeout = (self.timeout + self.config.timeout_step()).min(self.config.max_timeout());
        }
    }
}

struct SessionState {
    /// The handle reply has gone out; batches may be sent.
    replied: bool,
    /// Terminal record seen or session cancelled.
    finished: bool,
    batch: Vec<Value>,
    /// Batches flushed before the handle reply.
    held: Vec<Vec<Value>>,
    policy: FlushPolicy,
    timer: Option<TimerId>,
}

struct BrowseSession {
    requester: ReplyAddress,
    handle: Cell<BrowseId>,
    state: RefCell<SessionState>,
}

impl BrowseSession {
    fn new(requester: ReplyAddress, config: BrowseConfig) -> Self {
        Self {
            requester,
            handle: Cell::new(BrowseId::INVALID),
            state: RefCell::new(SessionState {
                replied: false,
                finished: false,
                batch: Vec::new(),
                held: Vec::new(),
                policy: FlushPolicy::new(config),
                timer: None,
            }),
        }
    }
}

enum Flush {
    Quota,
    Terminal,
}

/// Browse sessions of one exported source, keyed by native handle.
pub(crate) struct BrowseStreamer {
    ctx: Context,
    path: String,
    sessions: RefCell<HashMap<BrowseId, Rc<BrowseSession>>>,
}

impl BrowseStreamer {
    pub fn new(ctx: Context, path: String) -> Rc<Self> {
        Rc::new(Self {
            ctx,
            path,
            sessions: RefCell::new(HashMap::new()),
        })
    }

    /// Number of sessions still streaming.
    pub fn active(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn start(self: &Rc<Self>, source: &dyn Source, request: BrowseRequest, to: ReplyAddress) {
        let session = Rc::new(BrowseSession::new(to.clone(), self.ctx.settings.browse));

        let streamer = Rc::downgrade(self);
        let results = Rc::clone(&session);
        let outcome = source.browse(
            request,
            Box::new(move |event| {
                if let Some(streamer) = Weak::upgrade(&streamer) {
                    streamer.on_result(&results, event);
                }
            }),
        );

        match outcome {
            Ok(handle) if handle.is_valid() => self.accept(session, handle),
            Ok(_) => {
                session.state.borrow_mut().finished = true;
                self.ctx.reply_error(
                    to,
                    ExtError::new(SOURCE_ERROR_DOMAIN, codes::FAILED, "browse was not started"),
                );
            }
            Err(err) => {
                session.state.borrow_mut().finished = true;
                self.ctx.reply_error(to, err);
            }
        }
    }

    fn accept(self: &Rc<Self>, session: Rc<BrowseSession>, handle: BrowseId) {
        session.handle.set(handle);
        self.ctx
            .reply(session.requester.clone(), vec![Value::U32(handle.0)]);

        let (held, finished) = {
            let mut state = session.state.borrow_mut();
            state.replied = true;
            (mem::take(&mut state.held), state.finished)
        };
        for batch in held {
            self.send_batch(&session, batch);
        }
        if finished {
            tracing::debug!(path = %self.path, handle = handle.0, "browse finished before reply");
            return;
        }

        tracing::debug!(
            path = %self.path,
            handle = handle.0,
            peer = %session.requester.sender,
            "browse started"
        );
        self.sessions
            .borrow_mut()
            .insert(handle, Rc::clone(&session));
        self.arm_timer(&session);
    }

    fn on_result(self: &Rc<Self>, session: &Rc<BrowseSession>, event: BrowseEvent) {
        if !event.browse_id.is_valid() {
            tracing::trace!(path = %self.path, "ignoring result without a browse handle");
            return;
        }
        let record = browse_record(&event);
        let flushed = {
            let mut state = session.state.borrow_mut();
            if state.finished {
                tracing::trace!(handle = event.browse_id.0, "dropping result of finished browse");
                return;
            }
            state.batch.push(record);
            if event.is_terminal() {
                state.finished = true;
                Some((mem::take(&mut state.batch), state.timer.take(), Flush::Terminal))
            } else if state.batch.len() >= state.policy.quota() {
                state.policy.escalate();
                Some((mem::take(&mut state.batch), state.timer.take(), Flush::Quota))
            } else {
                None
            }
        };
        let Some((batch, timer, trigger)) = flushed else {
            return;
        };

        if let Some(timer) = timer {
            self.ctx.scheduler.cancel(timer);
        }
        self.flush(session, batch);

        match trigger {
            Flush::Terminal => {
                if let Some(error) = &event.error {
                    tracing::debug!(handle = event.browse_id.0, error = %error, "browse failed");
                }
                self.schedule_removal(session);
            }
            Flush::Quota => {
                if session.state.borrow().replied {
                    self.arm_timer(session);
                }
            }
        }
    }

    fn on_timeout(self: &Rc<Self>, session: &Rc<BrowseSession>) {
        let batch = {
            let mut state = session.state.borrow_mut();
            state.timer = None;
            if state.finished {
                return;
            }
            mem::take(&mut state.batch)
        };
        if !batch.is_empty() {
            tracing::trace!(handle = session.handle.get().0, size = batch.len(), "timed flush");
            self.flush(session, batch);
        }
        self.arm_timer(session);
    }

    fn arm_timer(self: &Rc<Self>, session: &Rc<BrowseSession>) {
        let delay = session.state.borrow().policy.timeout();
        let streamer = Rc::downgrade(self);
        let target = Rc::clone(session);
        let timer = self.ctx.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(streamer) = Weak::upgrade(&streamer) {
                    streamer.on_timeout(&target);
                }
            }),
        );
        let previous = session.state.borrow_mut().timer.replace(timer);
        if let Some(previous) = previous {
            self.ctx.scheduler.cancel(previous);
        }
    }

    fn flush(&self, session: &BrowseSession, batch: Vec<Value>) {
        {
            let mut state = session.state.borrow_mut();
            if !state.replied {
                state.held.push(batch);
                return;
            }
        }
        self.send_batch(session, batch);
    }

    fn send_batch(&self, session: &BrowseSession, batch: Vec<Value>) {
        if batch.is_empty() {
            return;
        }
        self.ctx.send(OutgoingMessage::Signal {
            destination: Some(session.requester.sender.clone()),
            path: self.path.clone(),
            interface: INTERFACE.to_owned(),
            member: BROWSE_RESULT.to_owned(),
            args: vec![Value::U32(session.handle.get().0), Value::Array(batch)],
        });
    }

    /// Drops the session on the next loop iteration, after the native side
    /// has returned from delivering the terminal record.
    fn schedule_removal(self: &Rc<Self>, session: &Rc<BrowseSession>) {
        let streamer = Rc::downgrade(self);
        let target = Rc::clone(session);
        self.ctx.scheduler.idle(Box::new(move || {
            if let Some(streamer) = Weak::upgrade(&streamer) {
                streamer.remove(&target);
            }
        }));
    }

    fn remove(&self, session: &Rc<BrowseSession>) {
        let handle = session.handle.get();
        let mut sessions = self.sessions.borrow_mut();
        if sessions
            .get(&handle)
            .map_or(false, |current| Rc::ptr_eq(current, session))
        {
            sessions.remove(&handle);
            tracing::debug!(path = %self.path, handle = handle.0, "browse completed");
        }
    }

    /// Stops delivery for `handle`, then forwards the cancellation to the
    /// source. The caller is answered with the source's verdict.
    pub fn cancel(&self, source: &dyn Source, handle: BrowseId, to: ReplyAddress) {
        let session = self.sessions.borrow_mut().remove(&handle);
        match session {
            Some(session) => {
                self.stop(&session);
                tracing::debug!(path = %self.path, handle = handle.0, "browse cancelled");
            }
            None => tracing::debug!(path = %self.path, handle = handle.0, "cancel of unknown browse"),
        }
        self.ctx
            .reply_result(to, source.cancel_browse(handle), |()| Vec::new());
    }

    /// Cancels every session, used when the source is unexported.
    pub fn shutdown(&self, source: &dyn Source) {
        let sessions: Vec<_> = self.sessions.borrow_mut().drain().collect();
        for (handle, session) in sessions {
            self.stop(&session);
            if let Err(err) = source.cancel_browse(handle) {
                tracing::debug!(handle = handle.0, error = %err, "cancel on shutdown failed");
            }
        }
    }

    fn stop(&self, session: &BrowseSession) {
        let timer = {
            let mut state = session.state.borrow_mut();
            state.finished = true;
            state.batch.clear();
            state.held.clear();
            state.timer.take()
        };
        if let Some(timer) = timer {
            self.ctx.scheduler.cancel(timer);
        }
    }
}

/// `(remaining, index, object id, metadata blob, error domain, code, message)`
fn browse_record(event: &BrowseEvent) -> Value {
    let (domain, code, message) = match &event.error {
        Some(err) => (err.domain.clone(), err.code, err.message.clone()),
        None => (String::new(), 0, String::new()),
    };
    let blob = match &event.metadata {
        Some(metadata) => metadata_blob(metadata),
        None => Value::Bytes(Vec::new()),
    };
    Value::Struct(vec![
        Value::I32(event.remaining),
        Value::U32(event.index),
        Value::Str(event.object_id.clone().unwrap_or_default()),
        blob,
        Value::Str(domain),
        Value::I32(code),
        Value::Str(message),
    ])
}
