//! Bus export of local media extensions.
//!
//! A [`Gateway`] publishes sources and renderers under per-uuid object
//! paths, translates bus calls into native extension calls and forwards
//! native events as signals. Browse results are streamed in growing
//! batches, buffering progress is rate limited and activation is reference
//! counted per bus peer.

mod activation;
mod base;
mod context;
mod error;
mod gateway;
pub mod interface;
pub mod mainloop;
mod registry;
mod renderer;
mod source;

pub use error::{ExportError, ExportResult};
pub use gateway::{Dispatch, Gateway};
pub use mainloop::{LocalScheduler, ManualScheduler, Scheduler, Task, TimerId};
pub use registry::ExportId;
