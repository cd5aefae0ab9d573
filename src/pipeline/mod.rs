pub mod heart_rate;
pub mod ingest_loop;
pub mod pairing;
pub mod session;

pub use heart_rate::{Clock, FixedClock, SystemClock};
pub use ingest_loop::{Collaborators, IngestLoop, LoopExit, LoopReport, LoopSettings};
pub use session::{SessionEffect, SessionPhase, SessionTracker};
