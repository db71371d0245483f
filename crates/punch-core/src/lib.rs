//! Core decision logic for the punchd attendance daemon.
//!
//! Everything here is synchronous and side-effect free apart from the
//! gallery's encoding-file persistence. Camera capture, face detection,
//! inference, and the attendance database live outside this crate; the
//! core consumes their outputs frame by frame and decides whether to
//! recognize an identity, whether the presentation is live, and whether
//! to toggle attendance.

pub mod debounce;
pub mod detect;
pub mod enroll;
pub mod gallery;
pub mod liveness;
pub mod recognize;
pub mod session;
pub mod timefmt;
pub mod toggle;
pub mod types;

pub use debounce::{DebounceState, Debouncer};
pub use gallery::{Gallery, GalleryError, Identity, MatchResult};
pub use liveness::{LivenessChecks, LivenessConfig, LivenessEvaluator, LivenessVerdict};
pub use recognize::RecognizedFace;
pub use session::{FrameStatus, Session, SessionConfig};
pub use toggle::{plan_toggle, LastEvent, ToggleOutcome};
pub use types::{Action, EyeLandmarks, FrameObservation, Point, Region, EMBEDDING_DIM};
