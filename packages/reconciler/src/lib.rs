//! # Tessera Reconciler
//!
//! Applies committed document states to a presentation surface.
//!
//! ```text
//! (prev state, next state, dirty set)
//!          │
//!          ▼
//!   Reconciler ── create / update / move / destroy ──▶ PresentationHost
//!          │
//!          └──── decorator delta (fire-and-forget) ──▶ rendering collaborator
//! ```

mod error;
mod host;
mod keyed;
mod reconciler;
mod recording;

pub use error::{HostError, ReconcileError, ReconcileResult};
pub use host::{
    DecoratorDelta, DecoratorSlot, PresentationHandle, PresentationHost, RenderConfig,
    ResolvedPoint, ResolvedSelection,
};
pub use keyed::longest_increasing_subsequence;
pub use reconciler::{ReconcileInput, ReconcileSummary, Reconciler};
pub use recording::{HostNode, HostOp, RecordingHost};
