//! runwatch - observe a CI run until it finishes
//!
//! Polls the GitHub Actions API for one run, feeds every response to the
//! domain model in `runwatch-domain`, and maps the terminal state to an
//! [`Outcome`]. Live responses can be recorded into capture files and replayed
//! later through the exact same poll loop, which makes wait behavior testable
//! without a network.
//!
//! ```ignore
//! let transport = GithubTransport::new(ProviderConfig::from_env())?;
//! let mut waiter = Waiter::new(transport, WaitConfig::new(RunId::from(19217851608u64)));
//! let outcome = waiter.wait().await?;
//! std::process::exit(outcome.exit_code());
//! ```

pub mod cancel;
pub mod capture;
pub mod config;
pub mod error;
pub mod fakes;
pub mod git;
pub mod inspect;
pub mod obs;
pub mod recorder;
pub mod replay;
pub mod telemetry;
pub mod transport;
pub mod waiter;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use capture::{capture_path, run_id_from_filename, CaptureFile, CaptureRecord};
pub use config::{ProviderConfig, WaitConfig};
pub use error::{Result, WatchError};
pub use inspect::{CaptureEntry, CaptureSummary};
pub use recorder::CaptureRecorder;
pub use replay::{ReplayDriver, ReplayPacing};
pub use transport::{GithubTransport, StatusSource};
pub use waiter::{WaitStats, Waiter};

pub use runwatch_domain::{Outcome, RunId, RunState, StatusSnapshot};
