//! Shelf client core
//!
//! Session-aware access to the Shelf e-library backend: credential storage,
//! the auth state container, single-flight token refresh, the request wrapper
//! every API call goes through, and a background refresh scheduler.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use cache::{LibraryCache, PatchGuard};
pub use client::auth::{GoogleSignInRequest, LoginRequest, RegisterRequest};
pub use client::library::{DonateBookRequest, ProgressRequest, RatingRequest};
pub use client::users::{OnboardingRequest, UpdateProfileRequest};
pub use client::{ApiRequest, ClientError, HttpTokenEndpoint, ShelfClient, ShelfClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use refresh::{RefreshGate, RefreshGuard, RefreshOutcome, Refresher, TokenEndpoint};
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use session::{Session, SessionState};
pub use storage::{CredentialStore, StorageArea, StorageKey, Tier};
