use crate::context::Context;
use crate::interface::renderer::{BUFFERING_INFO, INTERFACE};
use crate::mainloop::TimerId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

#[derive(Debug, Default)]
struct ThrottleState {
    timer: Option<TimerId>,
    latest: f32,
}

/// Rate limits `buffering_info` signals of one renderer.
///
/// The first update of a burst goes out at once and opens a window; updates
/// inside the window only replace the pending value, which is emitted when
/// the window closes. Completion (`>= 1.0`) is never delayed.
pub(crate) struct BufferingThrottle {
    ctx: Context,
    path: String,
    interval: Duration,
    state: RefCell<ThrottleState>,
}

impl BufferingThrottle {
    pub fn new(ctx: Context, path: String) -> Rc<Self> {
        let interval = ctx.settings.renderer.buffering_interval();
        Rc::new(Self {
            ctx,
            path,
            interval,
            state: RefCell::new(ThrottleState::default()),
        })
    }

    pub fn update(self: &Rc<Self>, fraction: f32) {
        if fraction >= 1.0 {
            self.reset();
            self.emit(fraction);
            return;
        }

        let window_open = {
            let mut state = self.state.borrow_mut();
            state.latest = fraction;
            state.timer.is_some()
        };
        if window_open {
            tracing::trace!(path = %self.path, fraction, "coalescing buffering update");
            return;
        }
        self.emit(fraction);
        self.arm();
    }

    /// Closes the window without emitting the pending value.
    pub fn reset(&self) {
        let timer = self.state.borrow_mut().timer.take();
        if let Some(timer) = timer {
            self.ctx.scheduler.cancel(timer);
        }
    }

    fn arm(self: &Rc<Self>) {
        let throttle = Rc::downgrade(self);
        let timer = self.ctx.scheduler.schedule(
            self.interval,
            Box::new(move || {
                if let Some(throttle) = Weak::upgrade(&throttle) {
                    throttle.tick();
                }
            }),
        );
        self.state.borrow_mut().timer = Some(timer);
    }

    fn tick(self: &Rc<Self>) {
        let latest = {
            let mut state = self.state.borrow_mut();
            state.timer = None;
            state.latest
        };
        self.emit(latest);
        self.arm();
    }

    fn emit(&self, fraction: f32) {
        self.ctx.emit(
            &self.path,
            INTERFACE,
            BUFFERING_INFO,
            vec![mediabridge_bus::Value::F64(f64::from(fraction))],
        );
    }
}
